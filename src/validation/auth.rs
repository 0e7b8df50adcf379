use garde::Validate;
use serde::Deserialize;
use serde_json::Value;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::password::StoredCredential;
use crate::models::session::Role;

/// Usernames end up inside the session payload, which is colon separated.
fn no_colon(value: &str, _ctx: &()) -> garde::Result {
    if value.contains(':') {
        return Err(garde::Error::new("must not contain ':'"));
    }
    Ok(())
}

/// A credential as written in `ADMIN_CREDENTIALS`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CredentialConfig {
    #[garde(length(min = 1, max = 128), custom(no_colon))]
    pub username: String,
    #[garde(length(min = 8))]
    pub password: String,
    #[garde(skip)]
    #[serde(default)]
    pub role: Option<String>,
}

/// A usable login: who, with which role, checked against what.
#[derive(Debug, Clone)]
pub struct AdminCredential {
    pub username: String,
    pub role: Role,
    pub credential: StoredCredential,
}

/// Trims and checks one configured credential.
pub fn normalize_credential(mut raw: CredentialConfig) -> Result<AdminCredential, String> {
    raw.username = raw.username.trim().to_string();
    raw.validate().map_err(|report| report.to_string())?;

    let role = match raw.role.as_deref().map(str::trim) {
        None | Some("") => Role::Admin,
        Some(role) => role
            .parse::<Role>()
            .map_err(|_| format!("unknown role '{}'", role))?,
    };
    let password = Zeroizing::new(raw.password);
    let credential = StoredCredential::parse(&password).map_err(|e| e.to_string())?;

    Ok(AdminCredential {
        username: raw.username,
        role,
        credential,
    })
}

/// Parses a JSON array of credentials, skipping (and logging) bad ones.
pub fn parse_credentials_json(json: &str) -> Result<Vec<AdminCredential>, serde_json::Error> {
    let raw: Vec<CredentialConfig> = serde_json::from_str(json)?;
    let mut credentials: Vec<AdminCredential> = Vec::with_capacity(raw.len());

    for (index, entry) in raw.into_iter().enumerate() {
        match normalize_credential(entry) {
            Ok(credential) => {
                if credentials.iter().any(|c| c.username == credential.username) {
                    tracing::warn!("Duplicate admin credential #{} ignored", index);
                    continue;
                }
                credentials.push(credential);
            }
            Err(reason) => tracing::warn!("Admin credential #{} skipped: {}", index, reason),
        }
    }

    Ok(credentials)
}

/// A login attempt pulled from an arbitrary JSON object.
#[derive(Debug, Validate)]
pub struct LoginRequest {
    #[garde(length(min = 1, max = 128))]
    pub username: String,
    #[garde(length(min = 1, max = 1024))]
    pub password: String,
}

impl Drop for LoginRequest {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl LoginRequest {
    /// Returns `None` when the body is not a JSON object. Missing or
    /// non-string fields become empty strings.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text = |key: &str| object.get(key).and_then(Value::as_str).unwrap_or_default();
        Some(Self {
            username: text("username").trim().to_string(),
            password: text("password").to_string(),
        })
    }
}
