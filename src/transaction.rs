//! Transaction module split into types, amounts and validation

pub mod amount;
pub mod types;
pub mod validation;

pub use amount::{format_amount, parse_amount, UNITS_PER_WHOLE};
pub use types::*;

/// Maximum decoded envelope size in bytes, checked before deserializing.
pub const MAX_ENVELOPE_SIZE: usize = 100_000;
