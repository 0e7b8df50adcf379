use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use rand::{rngs::OsRng, RngCore};
use scrypt::Params;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{AppError, Result};

/// scrypt cost parameters: N = 2^14, r = 8, p = 1.
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
/// The derived key length in bytes.
const KEY_LENGTH: usize = 64;
/// The random salt length in bytes, before hex encoding.
const SALT_LENGTH: usize = 16;

/// A stored admin password in one of the accepted formats.
#[derive(Clone)]
pub enum StoredCredential {
    /// `scrypt:<saltHex>:<keyHex>`. The hex salt text itself is the salt.
    Scrypt {
        salt: String,
        key: Zeroizing<Vec<u8>>,
    },
    /// A PHC string produced by Argon2.
    Argon2(String),
    /// A bare password from older deployments.
    Plaintext(Zeroizing<String>),
}

impl std::fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StoredCredential::Scrypt { .. } => "StoredCredential::Scrypt",
            StoredCredential::Argon2(_) => "StoredCredential::Argon2",
            StoredCredential::Plaintext(_) => "StoredCredential::Plaintext",
        })
    }
}

impl StoredCredential {
    /// Classifies a configured password value.
    ///
    /// Values with the `scrypt:` prefix must be well formed; anything that is
    /// neither scrypt nor Argon2 is taken as a legacy plaintext password.
    pub fn parse(stored: &str) -> Result<Self> {
        if let Some(rest) = stored.strip_prefix("scrypt:") {
            let (salt, key_hex) = rest
                .split_once(':')
                .filter(|(salt, key)| !salt.is_empty() && !key.contains(':'))
                .ok_or_else(|| AppError::Validation("Malformed scrypt hash".to_string()))?;
            let key = hex::decode(key_hex)
                .map_err(|_| AppError::Validation("Malformed scrypt key".to_string()))?;
            if key.len() != KEY_LENGTH {
                return Err(AppError::Validation("Malformed scrypt key".to_string()));
            }
            return Ok(StoredCredential::Scrypt {
                salt: salt.to_string(),
                key: Zeroizing::new(key),
            });
        }

        if stored.starts_with("$argon2") {
            PasswordHash::new(stored)
                .map_err(|e| AppError::Validation(format!("Malformed Argon2 hash: {}", e)))?;
            return Ok(StoredCredential::Argon2(stored.to_string()));
        }

        Ok(StoredCredential::Plaintext(Zeroizing::new(stored.to_string())))
    }

    /// Checks `password` against the stored value in constant time.
    pub fn verify(&self, password: &str) -> bool {
        match self {
            StoredCredential::Scrypt { salt, key } => match derive_scrypt(password, salt) {
                Ok(derived) => bool::from(derived.as_slice().ct_eq(key.as_slice())),
                Err(e) => {
                    tracing::error!("scrypt derivation failed: {}", e);
                    false
                }
            },
            StoredCredential::Argon2(phc) => match PasswordHash::new(phc) {
                Ok(parsed) => Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok(),
                Err(_) => false,
            },
            StoredCredential::Plaintext(expected) => {
                let expected_digest = Sha256::digest(expected.as_bytes());
                let given_digest = Sha256::digest(password.as_bytes());
                bool::from(expected_digest.ct_eq(&given_digest))
            }
        }
    }

    /// True for formats that should be replaced with a fresh hash.
    pub fn needs_upgrade(&self) -> bool {
        matches!(self, StoredCredential::Plaintext(_))
    }
}

fn derive_scrypt(password: &str, salt: &str) -> Result<Zeroizing<Vec<u8>>> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LENGTH)
        .map_err(|e| AppError::Internal(format!("scrypt params: {}", e)))?;
    let mut output = Zeroizing::new(vec![0u8; KEY_LENGTH]);
    scrypt::scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut output)
        .map_err(|e| AppError::Internal(format!("scrypt output: {}", e)))?;
    Ok(output)
}

/// Hashes a password into the `scrypt:<saltHex>:<keyHex>` format.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; SALT_LENGTH];
    OsRng
        .try_fill_bytes(&mut salt_bytes)
        .map_err(|e| AppError::Internal(format!("Failed to generate salt: {}", e)))?;
    let salt = hex::encode(salt_bytes);
    salt_bytes.zeroize();

    let derived = derive_scrypt(password, &salt)?;
    tracing::debug!("Password hashed with scrypt");
    Ok(format!("scrypt:{}:{}", salt, hex::encode(derived.as_slice())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHasher, SaltString};

    #[test]
    fn scrypt_hash_verifies_and_rejects_wrong_password() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("scrypt:"));
        let parts: Vec<&str> = hash.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), SALT_LENGTH * 2);
        assert_eq!(parts[2].len(), KEY_LENGTH * 2);

        let credential = StoredCredential::parse(&hash).unwrap();
        assert!(credential.verify("correct horse battery"));
        assert!(!credential.verify("correct horse battery "));
        assert!(!credential.needs_upgrade());
    }

    #[test]
    fn hashes_use_fresh_salts() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn malformed_scrypt_values_are_rejected() {
        for stored in ["scrypt:", "scrypt:abc", "scrypt::00", "scrypt:abc:zz", "scrypt:abc:00"] {
            assert!(StoredCredential::parse(stored).is_err(), "{stored}");
        }
    }

    #[test]
    fn argon2_phc_strings_verify() {
        let salt = SaltString::encode_b64(b"0123456789abcdef").unwrap();
        let phc = Argon2::default()
            .hash_password(b"hunter22", &salt)
            .unwrap()
            .to_string();

        let credential = StoredCredential::parse(&phc).unwrap();
        assert!(matches!(credential, StoredCredential::Argon2(_)));
        assert!(credential.verify("hunter22"));
        assert!(!credential.verify("hunter23"));
    }

    #[test]
    fn plaintext_is_legacy_and_flagged_for_upgrade() {
        let credential = StoredCredential::parse("legacy-password").unwrap();
        assert!(credential.needs_upgrade());
        assert!(credential.verify("legacy-password"));
        assert!(!credential.verify("legacy-passwor"));
        assert!(!credential.verify(""));
    }
}
