//! Protection for Spotify credentials at rest and for the OAuth `state`
//! round trip.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

/// AES-256-GCM sealing for tokens stored in the users table.
/// Output is base64(nonce || ciphertext).
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// `key` is 64 hex characters; any other non-empty string is treated as a
    /// passphrase and hashed down to 32 bytes.
    pub fn new(key: &str) -> Self {
        let mut bytes = [0u8; 32];
        match hex::decode(key) {
            Ok(raw) if raw.len() == 32 => bytes.copy_from_slice(&raw),
            _ => bytes.copy_from_slice(&Sha256::digest(key.as_bytes())),
        }
        Self {
            cipher: Aes256Gcm::new(&bytes.into()),
        }
    }

    /// Key that only lives as long as this process. Tokens sealed with it
    /// cannot be read after a restart.
    pub fn ephemeral() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self {
            cipher: Aes256Gcm::new(&bytes.into()),
        }
    }

    pub fn from_config(key: Option<&str>) -> Self {
        match key {
            Some(key) => Self::new(key),
            None => {
                tracing::warn!(
                    "TOKEN_ENCRYPTION_KEY not set; stored Spotify tokens will not survive a restart"
                );
                Self::ephemeral()
            }
        }
    }

    pub fn seal(&self, plaintext: &str) -> anyhow::Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| anyhow::anyhow!("Failed to encrypt token"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn open(&self, sealed: &str) -> anyhow::Result<String> {
        let raw = STANDARD.decode(sealed)?;
        if raw.len() <= NONCE_LEN {
            anyhow::bail!("Sealed token is truncated");
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow::anyhow!("Failed to decrypt token"))?;
        Ok(String::from_utf8(plaintext)?)
    }
}

/// Signs the OAuth `state` parameter so the callback can trust which user
/// started the flow.
#[derive(Clone)]
pub struct OAuthStateSigner {
    secret: Vec<u8>,
    max_age: Duration,
}

impl OAuthStateSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
            max_age: Duration::minutes(10),
        }
    }

    pub fn from_config(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) => Self::new(secret.as_bytes()),
            None => {
                let random: [u8; 32] = rand::random();
                Self::new(&random)
            }
        }
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        // HMAC accepts keys of any length.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"));
        mac.update(payload.as_bytes());
        mac
    }

    pub fn sign(&self, user_id: Uuid, issued_at: DateTime<Utc>) -> String {
        let payload = format!("{}.{}", user_id, issued_at.timestamp());
        let signature = hex::encode(self.mac(&payload).finalize().into_bytes());
        format!("{}.{}", payload, signature)
    }

    /// Returns the user id if the state is authentic and not stale.
    pub fn verify(&self, state: &str, now: DateTime<Utc>) -> Option<Uuid> {
        let mut parts = state.split('.');
        let user_part = parts.next()?;
        let issued_part = parts.next()?;
        let signature_part = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let signature = hex::decode(signature_part).ok()?;
        let payload = format!("{}.{}", user_part, issued_part);
        self.mac(&payload).verify_slice(&signature).ok()?;

        let issued_at = DateTime::<Utc>::from_timestamp(issued_part.parse().ok()?, 0)?;
        if now - issued_at > self.max_age || issued_at - now > Duration::minutes(1) {
            return None;
        }

        user_part.parse().ok()
    }
}
