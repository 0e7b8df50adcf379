use std::sync::Arc;
use zeroize::Zeroizing;

use crate::error::{AppError, Result};
use crate::models::session::Role;
use crate::validation::auth::AdminCredential;

/// The configured admin logins.
#[derive(Clone, Default)]
pub struct CredentialStore {
    credentials: Arc<Vec<AdminCredential>>,
}

impl CredentialStore {
    pub fn new(credentials: Vec<AdminCredential>) -> Self {
        for credential in &credentials {
            if credential.credential.needs_upgrade() {
                tracing::warn!(
                    "⚠️ Credential for '{}' is stored as plaintext; replace it with a hash from `hash-password`",
                    credential.username
                );
            }
        }
        Self {
            credentials: Arc::new(credentials),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Checks a username/password pair and returns the matching role.
    ///
    /// Hash verification runs on the blocking pool.
    pub async fn authenticate(&self, username: &str, password: Zeroizing<String>) -> Result<Option<Role>> {
        let Some(account) = self
            .credentials
            .iter()
            .find(|c| c.username == username)
            .cloned()
        else {
            tracing::debug!("🔐 Unknown username in login attempt");
            return Ok(None);
        };

        let role = account.role;
        let matches = tokio::task::spawn_blocking(move || account.credential.verify(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Credential check panicked: {}", e)))?;

        Ok(matches.then_some(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::password::{hash_password, StoredCredential};

    fn credential(username: &str, stored: &str, role: Role) -> AdminCredential {
        AdminCredential {
            username: username.to_string(),
            role,
            credential: StoredCredential::parse(stored).unwrap(),
        }
    }

    #[tokio::test]
    async fn authenticates_hashed_and_plaintext_credentials() {
        let hash = hash_password("correct horse").unwrap();
        let store = CredentialStore::new(vec![
            credential("alice", &hash, Role::Editor),
            credential("bob", "legacy-password", Role::Viewer),
        ]);

        let role = store
            .authenticate("alice", Zeroizing::new("correct horse".to_string()))
            .await
            .unwrap();
        assert_eq!(role, Some(Role::Editor));

        let role = store
            .authenticate("bob", Zeroizing::new("legacy-password".to_string()))
            .await
            .unwrap();
        assert_eq!(role, Some(Role::Viewer));
    }

    #[tokio::test]
    async fn rejects_wrong_password_and_unknown_user() {
        let store = CredentialStore::new(vec![credential("alice", "secret-pass", Role::Admin)]);
        assert_eq!(
            store
                .authenticate("alice", Zeroizing::new("nope".to_string()))
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            store
                .authenticate("mallory", Zeroizing::new("secret-pass".to_string()))
                .await
                .unwrap(),
            None
        );
        assert!(CredentialStore::default().is_empty());
    }
}
