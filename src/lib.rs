//! Friendbot - funds new ledger accounts through a pool of channel-account minions
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Ledger Primitives
//! - [`crypto`] - Account identities, key pairs and signatures (secp256k1)
//! - [`transaction`] - Transaction model, amounts and the signed envelope
//! - [`ledger`] - The ledger client capability (HTTP and in-memory)
//!
//! ## Dispatch
//! - [`account`] - Lazily refreshed sequence number cache
//! - [`minion`] - Channel accounts that build and sign create-account transactions
//! - [`dispatcher`] - Submission, rejection classification and self-healing
//! - [`pool`] - Fixed worker set draining a shared request queue
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Ledger Primitives
// ============================================================================
pub mod crypto;
pub mod ledger;
pub mod transaction;

// ============================================================================
// Dispatch
// ============================================================================
pub mod account;
pub mod dispatcher;
pub mod minion;
pub mod pool;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

pub use error::{ErrorCategory, FriendbotError, Result};
