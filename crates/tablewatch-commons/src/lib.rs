//! # tablewatch-commons
//!
//! Shared models and wire format for the tablewatch notification engine.
//!
//! This crate provides the types every other tablewatch crate speaks:
//! - Server-side column types ([`SqlDataType`]) and the excluded-type rules
//! - Scalar values ([`SqlValue`]) with lossless text round-trip
//! - [`Row`] — a column-name keyed value map that serializes to clean JSON
//! - Change metadata ([`ChangeType`], [`TableRef`])
//! - The per-message payload document format ([`wire`])
//!
//! It deliberately has no async, no I/O and no engine logic; those live in
//! `tablewatch-core`.

pub mod errors;
pub mod models;
pub mod wire;

pub use errors::CommonError;
pub use models::{ChangeType, DecimalValue, Row, SqlDataType, SqlValue, TableRef};
