//! Domain models for the certificate registry.
//!
//! Accounts, certificates, ledger events, and audit entries. The ledger is
//! the source of truth; everything here is the vocabulary both the write
//! path (pre-validation) and the read model (projection) share.

mod account;
mod audit;
mod certificate;
mod event;
mod types;

pub use account::*;
pub use audit::*;
pub use certificate::*;
pub use event::*;
pub use types::*;
