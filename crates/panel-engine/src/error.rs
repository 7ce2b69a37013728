//! Engine error types.
//!
//! Everything here is a configuration fault: it can only be fixed by
//! correcting the shipped property data, never by retrying. Transient link
//! failures and policy no-ops are reported through
//! [`Outcome`](crate::dispatch::Outcome) instead.

use std::string::String;

use thiserror_no_std::Error;

/// Table parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// Key absent from the property store.
    #[error("no data for `{key}`")]
    NoData {
        /// Property key that was looked up.
        key: String,
    },
    /// A row has a different token count than the first row.
    #[error("`{key}` line {line}: expected {expected} columns, found {found}")]
    ColumnMismatch {
        /// Property key.
        key: String,
        /// One-based line number within the table text.
        line: usize,
        /// Column count fixed by the first row.
        expected: usize,
        /// Column count of the offending row.
        found: usize,
    },
    /// A token is neither decimal nor `0x` hexadecimal.
    #[error("`{key}` line {line}: bad token `{token}`")]
    BadToken {
        /// Property key.
        key: String,
        /// One-based line number.
        line: usize,
        /// Offending token.
        token: String,
    },
    /// Binary cell data does not divide into whole rows.
    #[error("`{key}`: {len} bytes is not a multiple of {row_bytes}")]
    Misaligned {
        /// Property key.
        key: String,
        /// Byte length of the property.
        len: usize,
        /// Bytes per logical row.
        row_bytes: usize,
    },
    /// `$NAME` placeholder is undefined or recursion is too deep.
    #[error("`{key}`: cannot substitute `{name}`")]
    Substitution {
        /// Property key.
        key: String,
        /// Placeholder name.
        name: String,
    },
    /// Table has no rows, or a row shape the consumer cannot use.
    #[error("`{key}`: {reason}")]
    Shape {
        /// Property key.
        key: String,
        /// What the consumer expected.
        reason: &'static str,
    },
    /// Cell storage could not be reserved.
    #[error("`{key}`: allocation failed")]
    AllocationFailure {
        /// Property key.
        key: String,
    },
}

/// Command-set parsing failures, binary and text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// Binary header or payload runs past the end of the property.
    #[error("`{key}`: command at byte {offset} overruns data")]
    Overrun {
        /// Property key.
        key: String,
        /// Byte offset of the command header.
        offset: usize,
    },
    /// Unknown MIPI-DSI data type byte.
    #[error("`{key}`: unknown data type 0x{data_type:02X}")]
    UnknownDataType {
        /// Property key.
        key: String,
        /// Raw data type.
        data_type: u8,
    },
    /// Malformed line in a text command script.
    #[error("`{key}` line {line}: {reason}")]
    Syntax {
        /// Property key.
        key: String,
        /// One-based line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },
    /// Symbol name is not known or has no registered callback.
    #[error("`{key}` line {line}: unknown symbol `{name}`")]
    UnknownSymbol {
        /// Property key.
        key: String,
        /// One-based line number.
        line: usize,
        /// Symbol name as written.
        name: String,
    },
}

/// Runtime symbol evaluation failures. The affected command is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    /// The comparison value is not valid for this symbol.
    #[error("invalid value `{value}` for {symbol}")]
    InvalidValue {
        /// Symbol name.
        symbol: &'static str,
        /// Value as written in the script.
        value: String,
    },
    /// The command has no room for the bytes the symbol writes.
    #[error("{symbol}: no room for {needed} bytes")]
    NoRoom {
        /// Symbol name.
        symbol: &'static str,
        /// Bytes the symbol needed to write.
        needed: usize,
    },
    /// A value the symbol reads has not been resolved yet.
    #[error("{symbol}: no value available")]
    Unavailable {
        /// Symbol name.
        symbol: &'static str,
    },
}

/// Configuration errors surfaced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A lookup table failed to parse or is missing.
    #[error(transparent)]
    Table(#[from] TableError),
    /// A command set failed to parse.
    #[error(transparent)]
    Script(#[from] ScriptError),
    /// Engine configuration is invalid.
    #[error("invalid config: {0}")]
    Config(String),
    /// An assembled transaction would exceed packet capacity.
    #[error("packet overflow: {needed} descriptors exceed capacity {capacity}")]
    PacketOverflow {
        /// Descriptors the transaction would contain.
        needed: usize,
        /// Configured maximum.
        capacity: usize,
    },
}
