use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::models::session::{Role, Session};

type HmacSha256 = Hmac<Sha256>;

/// Lifetime of a freshly signed session: 12 hours.
pub const SESSION_TTL_SECONDS: i64 = 60 * 60 * 12;

/// The payload layouts a session cookie may carry.
///
/// `Legacy` cookies predate roles (`username:expiresAt`) and are read as
/// admin sessions; the session endpoint re-signs them as `Current`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPayload {
    Current {
        username: String,
        role: Role,
        expires_at: i64,
    },
    Legacy {
        username: String,
        expires_at: i64,
    },
}

impl TokenPayload {
    /// Splits a verified payload into its fields. Returns `None` for any
    /// shape other than two or three non-empty fields with a numeric expiry.
    fn decode(payload: &str) -> Option<Self> {
        let parts: Vec<&str> = payload.split(':').collect();
        match parts.as_slice() {
            [username, expires_at] => Some(TokenPayload::Legacy {
                username: non_empty(username)?,
                expires_at: expires_at.parse().ok()?,
            }),
            [username, role, expires_at] => Some(TokenPayload::Current {
                username: non_empty(username)?,
                role: role.parse().ok()?,
                expires_at: expires_at.parse().ok()?,
            }),
            _ => None,
        }
    }

    fn expires_at(&self) -> i64 {
        match self {
            TokenPayload::Current { expires_at, .. } | TokenPayload::Legacy { expires_at, .. } => {
                *expires_at
            }
        }
    }

    fn into_session(self) -> Session {
        match self {
            TokenPayload::Current {
                username,
                role,
                expires_at,
            } => Session {
                username,
                role,
                expires_at,
                legacy: false,
            },
            TokenPayload::Legacy {
                username,
                expires_at,
            } => Session {
                username,
                role: Role::Admin,
                expires_at,
                legacy: true,
            },
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Signs and verifies `username:role:expiresAt:hexSignature` cookie values.
#[derive(Clone)]
pub struct SessionCodec {
    secret: Zeroizing<Vec<u8>>,
    ttl_seconds: i64,
}

impl SessionCodec {
    /// Creates a codec with the default 12 hour lifetime.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_ttl(secret, SESSION_TTL_SECONDS)
    }

    pub fn with_ttl(secret: &[u8], ttl_seconds: i64) -> Self {
        Self {
            secret: Zeroizing::new(secret.to_vec()),
            ttl_seconds,
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Lowercase hex HMAC-SHA256 of `payload`.
    fn signature(&self, payload: &str) -> String {
        // HMAC accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Signs a token that expires `ttl_seconds` after `now_ms`.
    pub fn sign_at(&self, username: &str, role: Role, ttl_seconds: i64, now_ms: i64) -> String {
        let expires_at = now_ms.saturating_add(ttl_seconds.saturating_mul(1000));
        let payload = format!("{}:{}:{}", username, role.as_str(), expires_at);
        let signature = self.signature(&payload);
        format!("{}:{}", payload, signature)
    }

    /// Signs a token with the codec's configured lifetime.
    pub fn sign(&self, username: &str, role: Role) -> String {
        self.sign_at(username, role, self.ttl_seconds, now_ms())
    }

    /// Verifies and decodes a cookie value as of `now_ms`.
    ///
    /// Tampered, malformed and expired tokens all yield `None`.
    pub fn parse_at(&self, token: &str, now_ms: i64) -> Option<Session> {
        let (payload, signature) = token.rsplit_once(':')?;
        if payload.is_empty() || signature.is_empty() {
            return None;
        }

        let expected = self.signature(payload);
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return None;
        }

        let decoded = TokenPayload::decode(payload)?;
        if decoded.expires_at() <= now_ms {
            return None;
        }
        Some(decoded.into_session())
    }

    pub fn parse(&self, token: &str) -> Option<Session> {
        self.parse_at(token, now_ms())
    }

    /// True when the session should be re-issued: legacy payloads always,
    /// current ones once less than half of the lifetime remains.
    pub fn needs_rotation(&self, session: &Session, now_ms: i64) -> bool {
        if session.legacy {
            return true;
        }
        let remaining = session.expires_at - now_ms;
        remaining * 2 < self.ttl_seconds * 1000
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-1234567890-abcdefghij";
    const NOW: i64 = 1_750_000_000_000;

    fn codec() -> SessionCodec {
        SessionCodec::new(SECRET)
    }

    fn legacy_token(username: &str, expires_at: i64) -> String {
        let payload = format!("{}:{}", username, expires_at);
        let mut mac = HmacSha256::new_from_slice(SECRET).unwrap();
        mac.update(payload.as_bytes());
        format!("{}:{}", payload, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn sign_then_parse_returns_original_triple() {
        let codec = codec();
        for role in [Role::Admin, Role::Editor, Role::Viewer] {
            let token = codec.sign_at("trader", role, 3600, NOW);
            let session = codec.parse_at(&token, NOW + 1).unwrap();
            assert_eq!(session.username, "trader");
            assert_eq!(session.role, role);
            assert_eq!(session.expires_at, NOW + 3_600_000);
            assert!(!session.legacy);
        }
    }

    #[test]
    fn token_has_four_parts_and_lowercase_hex_signature() {
        let token = codec().sign_at("trader", Role::Admin, 60, NOW);
        let parts: Vec<&str> = token.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "trader");
        assert_eq!(parts[1], "admin");
        assert_eq!(parts[2], (NOW + 60_000).to_string());
        assert_eq!(parts[3].len(), 64);
        assert!(parts[3].chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn signing_is_deterministic() {
        let codec = codec();
        assert_eq!(
            codec.sign_at("trader", Role::Admin, 60, NOW),
            codec.sign_at("trader", Role::Admin, 60, NOW)
        );
    }

    #[test]
    fn any_signature_change_is_rejected() {
        let codec = codec();
        let token = codec.sign_at("trader", Role::Editor, 3600, NOW);
        let sig_start = token.rfind(':').unwrap() + 1;

        for index in sig_start..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[index] = if bytes[index] == b'0' { b'1' } else { b'0' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert!(codec.parse_at(&tampered, NOW).is_none(), "index {index}");
        }
    }

    #[test]
    fn payload_change_is_rejected() {
        let codec = codec();
        let token = codec.sign_at("trader", Role::Viewer, 3600, NOW);
        let escalated = token.replacen(":viewer:", ":admin:", 1);
        assert!(codec.parse_at(&escalated, NOW).is_none());
    }

    #[test]
    fn non_positive_ttl_is_already_expired() {
        let codec = codec();
        for ttl in [0, -1, -3600] {
            let token = codec.sign_at("trader", Role::Admin, ttl, NOW);
            assert!(codec.parse_at(&token, NOW).is_none(), "ttl {ttl}");
        }
    }

    #[test]
    fn expired_token_is_rejected() {
        let codec = codec();
        let token = codec.sign_at("trader", Role::Admin, 60, NOW);
        assert!(codec.parse_at(&token, NOW + 60_001).is_none());
    }

    #[test]
    fn other_secret_is_rejected() {
        let token = codec().sign_at("trader", Role::Admin, 60, NOW);
        let other = SessionCodec::new(b"another-secret-0987654321-zyxwvut");
        assert!(other.parse_at(&token, NOW).is_none());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let codec = codec();
        for token in ["", "no-colons", "only:one", "::", "username::signature"] {
            assert!(codec.parse_at(token, NOW).is_none(), "{token:?}");
        }
    }

    #[test]
    fn signed_but_non_numeric_expiry_is_rejected() {
        let codec = codec();
        for payload in ["trader:admin:notanumber", "trader:admin:", "trader:root:99999999999999"] {
            let token = format!("{}:{}", payload, codec.signature(payload));
            assert!(codec.parse_at(&token, NOW).is_none(), "{payload}");
        }
    }

    #[test]
    fn too_many_fields_are_rejected() {
        let codec = codec();
        let payload = format!("a:b:admin:{}", NOW + 1000);
        let token = format!("{}:{}", payload, codec.signature(&payload));
        assert!(codec.parse_at(&token, NOW).is_none());
    }

    #[test]
    fn legacy_two_field_token_is_admin_and_rotates() {
        let codec = codec();
        let token = legacy_token("owner", NOW + 10 * 3_600_000);
        let session = codec.parse_at(&token, NOW).unwrap();
        assert_eq!(session.username, "owner");
        assert_eq!(session.role, Role::Admin);
        assert!(session.legacy);
        assert!(codec.needs_rotation(&session, NOW));
    }

    #[test]
    fn rotation_starts_after_half_the_lifetime() {
        let codec = codec();
        let token = codec.sign_at("trader", Role::Admin, SESSION_TTL_SECONDS, NOW);
        let session = codec.parse_at(&token, NOW).unwrap();

        let half = SESSION_TTL_SECONDS * 1000 / 2;
        assert!(!codec.needs_rotation(&session, NOW));
        assert!(!codec.needs_rotation(&session, NOW + half));
        assert!(codec.needs_rotation(&session, NOW + half + 1));
    }
}
