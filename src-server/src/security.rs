use crate::host::TokenIssuer;
use chrono::Utc;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("Key derivation failed")]
    KeyDerivationError,
    #[error("Invalid salt: {0}")]
    InvalidSalt(#[from] hex::FromHexError),
    #[error("security.salt is required when security.secret is set")]
    MissingSalt,
}

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;
const PBKDF2_ROUNDS: u32 = 100_000;
/// Tolerated clock skew for tokens issued "in the future".
const MAX_SKEW_SECS: i64 = 60;

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

pub fn derive_key(secret: &str, salt: &[u8]) -> Result<[u8; KEY_LEN], SecurityError> {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::<HmacSha256>(secret.as_bytes(), salt, PBKDF2_ROUNDS, &mut key)
        .map_err(|_| SecurityError::KeyDerivationError)?;
    Ok(key)
}

/// Anti-forgery tokens: `{issued_at}.{nonce}.{hmac}` where the MAC covers the
/// scope, the issue time and a fresh random nonce. Every mint yields a new
/// token; any unexpired token for the scope verifies.
#[derive(Clone)]
pub struct NonceIssuer {
    mac: HmacSha256,
    lifetime_secs: i64,
}

impl NonceIssuer {
    pub fn new(key: &[u8], lifetime_secs: i64) -> Result<Self, SecurityError> {
        let mac =
            HmacSha256::new_from_slice(key).map_err(|_| SecurityError::KeyDerivationError)?;
        Ok(NonceIssuer { mac, lifetime_secs })
    }

    /// Derives the MAC key from a configured secret. Without a secret a
    /// random per-process key is used, so tokens die with the process.
    pub fn from_secret(
        secret: Option<&str>,
        salt_hex: Option<&str>,
        lifetime_secs: i64,
    ) -> Result<Self, SecurityError> {
        match secret {
            Some(secret) => {
                let salt = hex::decode(salt_hex.ok_or(SecurityError::MissingSalt)?)?;
                let key = derive_key(secret, &salt)?;
                Self::new(&key, lifetime_secs)
            }
            None => {
                warn!("No token secret configured; using a random key for this process");
                let mut key = [0u8; KEY_LEN];
                rand::thread_rng().fill_bytes(&mut key);
                Self::new(&key, lifetime_secs)
            }
        }
    }

    pub fn mint_at(&self, scope: &str, issued_at: i64) -> String {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let tag = self.sign(scope, issued_at, &nonce).finalize().into_bytes();
        format!("{}.{}.{}", issued_at, hex::encode(nonce), hex::encode(tag))
    }

    pub fn verify_at(&self, token: &str, scope: &str, now: i64) -> bool {
        let mut parts = token.split('.');
        let (Some(issued), Some(nonce), Some(tag), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        let Ok(issued_at) = issued.parse::<i64>() else {
            return false;
        };
        if issued_at > now.saturating_add(MAX_SKEW_SECS) {
            return false;
        }
        match now.checked_sub(issued_at) {
            Some(age) if age <= self.lifetime_secs => {}
            _ => return false,
        }
        let (Ok(nonce), Ok(tag)) = (hex::decode(nonce), hex::decode(tag)) else {
            return false;
        };
        if nonce.len() != NONCE_LEN {
            return false;
        }
        self.sign(scope, issued_at, &nonce)
            .verify_slice(&tag)
            .is_ok()
    }

    fn sign(&self, scope: &str, issued_at: i64, nonce: &[u8]) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(scope.as_bytes());
        mac.update(b"|");
        mac.update(issued_at.to_string().as_bytes());
        mac.update(b"|");
        mac.update(nonce);
        mac
    }
}

impl TokenIssuer for NonceIssuer {
    fn mint(&self, scope: &str) -> String {
        self.mint_at(scope, Utc::now().timestamp())
    }

    fn verify(&self, token: &str, scope: &str) -> bool {
        self.verify_at(token, scope, Utc::now().timestamp())
    }
}
