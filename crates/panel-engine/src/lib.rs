//! Panel command and brightness composition engine
//!
//! Loads a display panel's lookup tables and command sets from a property
//! store, resolves brightness levels to register values, patches command
//! payloads against live panel state, and hands framed transactions to a
//! bus transport under one transmission lock.
//!
//! # Architecture
//!
//! ```text
//! PropertySource ──▶ table ──▶ lookup ──▶ brightness ─┐
//!        │                                            ├─▶ compose ──▶ assembler ──▶ dispatch ──▶ BusTransport
//!        └──────▶ dcs / script ──▶ fragment ──────────┘       ▲
//!                         ▲                                   │
//!                       symbol ◀── interp ◀── PanelRuntimeState
//! ```
//!
//! - [`table`]: text and binary table parsing, revision fallback
//! - [`lookup`]: candela maps and per-level command maps
//! - [`brightness`]: level and mode to candela, register index and table values
//! - [`fragment`], [`dcs`], [`script`]: the command-set registry and its two source formats
//! - [`symbol`], [`interp`]: conditional payload patching
//! - [`assembler`], [`compose`]: unlock wrapping, capacity checks, last-packet framing
//! - [`dispatch`]: transmission lock, guard checks, exclusive mode
//! - [`panel`]: the facade tying it together
//!
//! Configuration faults surface as [`EngineError`] at load or assembly time.
//! Hardware absence and link failures are never errors; they come back as
//! an [`Outcome`].

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::print_stdout)] // prefer tracing over println! in lib code
#![allow(clippy::doc_markdown)] // register names and hex bytes in doc comments
#![allow(clippy::must_use_candidate)] // accessors: callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod assembler;
pub mod brightness;
pub mod compose;
pub mod config;
pub mod dcs;
pub mod dispatch;
pub mod error;
pub mod fragment;
pub mod interp;
pub mod lookup;
pub mod panel;
pub mod script;
pub mod state;
pub mod symbol;
pub mod table;

pub use assembler::{Framing, Transaction};
pub use brightness::{BrightnessMode, BrightnessResolver, CommandTable};
pub use compose::BrightnessPass;
pub use config::{EngineConfig, SafeDefault};
pub use dispatch::{Channel, Dispatcher, ExclusiveGuard, Outcome, PanelChannel, SkipCause};
pub use error::{EngineError, ScriptError, SymbolError, TableError};
pub use fragment::{CommandDescriptor, CommandFragment, FragmentId, FragmentRegistry};
pub use lookup::{CandelaEntry, CandelaMap, CommandMap};
pub use panel::{ExclusiveSession, Panel};
pub use state::PanelRuntimeState;
pub use symbol::{MatchSymbol, SymbolTable, UpdateSymbol};
pub use table::RawTable;
