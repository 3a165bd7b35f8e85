//! Issuer and admin accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Address;

/// A registered account on the ledger.
///
/// Accounts are created once by an admin registration event and are never
/// deleted; `is_authorized` is toggled by admin events so the authorization
/// history remains auditable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Ledger-native identity, unique.
    pub address: Address,

    pub display_name: String,

    pub email: String,

    /// Admins may register accounts and toggle authorization.
    pub is_admin: bool,

    /// Whether this account may currently issue/revoke/reactivate.
    pub is_authorized: bool,

    pub registered_at: DateTime<Utc>,
}

impl Account {
    /// A freshly registered account is authorized by default.
    pub fn new(
        address: Address,
        display_name: impl Into<String>,
        email: impl Into<String>,
        is_admin: bool,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            address,
            display_name: display_name.into(),
            email: email.into(),
            is_admin,
            is_authorized: true,
            registered_at,
        }
    }
}
