//! Credential identity derivation
//!
//! One persistent platform connection exists per credential identity. The
//! identity is derived from the account/client id alone so that two
//! registrations with the same bot account converge on one connection even
//! when other credential fields differ.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Credentials;

/// Stable key identifying one bot account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialIdentity(String);

impl CredentialIdentity {
    /// Derive the identity for a set of credentials.
    pub fn derive(credentials: &Credentials) -> Self {
        Self(format!("bot-{}", credentials.client_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_client_id_same_identity() {
        let a = Credentials {
            client_id: "123".into(),
            token: "t1".into(),
        };
        let b = Credentials {
            client_id: "123".into(),
            token: "t2".into(),
        };
        assert_eq!(CredentialIdentity::derive(&a), CredentialIdentity::derive(&b));
    }

    #[test]
    fn distinct_client_ids_distinct_identities() {
        let a = Credentials {
            client_id: "123".into(),
            token: "t".into(),
        };
        let b = Credentials {
            client_id: "456".into(),
            token: "t".into(),
        };
        assert_ne!(CredentialIdentity::derive(&a), CredentialIdentity::derive(&b));
    }
}
