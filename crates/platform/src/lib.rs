//! Collaborator interfaces for the panel command engine
//!
//! This crate holds everything the engine consumes but does not own: the
//! wire-level command descriptor, the bus transport it hands descriptors
//! to, the configuration property store it loads tables and command sets
//! from, and the hardware revision index those keys are suffixed with.
//!
//! # Architecture Layers
//!
//! ```text
//! Panel flows (power on/off, brightness change, image upload)
//!         ↓
//! panel-engine (tables, fragments, interpreter, assembler, dispatcher)
//!         ↓
//! panel-platform (this crate - descriptors and collaborator traits)
//!         ↓
//! Host DSI controller driver / property store
//! ```
//!
//! # Features
//!
//! - `std`: Standard library support and the [`mocks`] module
//! - `serde`: (De)serialisation of [`PropertyMap`]
//! - `defmt`: `defmt::Format` derives on wire types
//!
//! # Example
//!
//! ```
//! use panel_platform::{BusTransport, DataType, Descriptor, TransmissionSpeed};
//!
//! fn display_on<B: BusTransport>(bus: &mut B) -> bool {
//!     let mut cmd = Descriptor::write(DataType::DcsShortWrite, vec![0x29]);
//!     cmd.last = true;
//!     bus.send(&[cmd], TransmissionSpeed::LowPower).is_ok()
//! }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![allow(clippy::doc_markdown)] // register names and hex bytes in doc comments
#![allow(clippy::must_use_candidate)] // accessors: callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

extern crate alloc;

pub mod dsi;
pub mod mocks;
pub mod property;
pub mod revision;
pub mod transport;

pub use dsi::{CommandClass, DataType, Descriptor, TransmissionSpeed};
pub use property::{PropertyMap, PropertySource, PropertyValue};
pub use revision::{OutOfRangeError, Revision};
pub use transport::{BusTransport, TransportError};
