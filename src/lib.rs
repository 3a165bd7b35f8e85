//! Certledger Library
//!
//! Ledger-backed credential registry: certificate lifecycle on an
//! append-only ledger, an audit indexer that projects confirmed events
//! into a query-optimized read model, and wallet-signature login.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (addresses, certificates, events)
//! - [`crypto`] - Hashing and Ed25519 wallet signatures
//! - [`ledger`] - Ledger client contract and pre-validation state machine
//! - [`indexer`] - Ledger-to-read-model projection loop
//! - [`store`] - Read model stores (in-memory, PostgreSQL)
//! - [`query`] - Paginated read-side queries
//! - [`auth`] - Challenge-response login and session tokens
//! - [`api`] - REST API routes
//! - [`render`] - Human-readable certificate rendering

pub mod api;
pub mod auth;
pub mod crypto;
pub mod domain;
pub mod indexer;
pub mod ledger;
pub mod migrations;
pub mod query;
pub mod render;
pub mod server;
pub mod store;
