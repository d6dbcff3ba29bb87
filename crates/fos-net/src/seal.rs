//! Callback name sealing
//!
//! Server callback names leave the page encrypted when a key is
//! configured. The sealed form is `base64(nonce):base64(ciphertext)`.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{NetError, NetResult};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Seals callback names for the wire
#[derive(Clone, Default)]
pub enum CallbackSealer {
    /// Names are sent in clear
    #[default]
    Plain,
    Aes(Box<Aes256Gcm>),
}

impl CallbackSealer {
    /// Build from an optional base64 key
    pub fn from_key(key: Option<&str>) -> NetResult<Self> {
        let Some(key) = key else {
            return Ok(CallbackSealer::Plain);
        };
        let bytes = STANDARD
            .decode(key.trim())
            .map_err(|e| NetError::Seal(format!("bad key encoding: {e}")))?;
        if bytes.len() != KEY_LEN {
            return Err(NetError::Seal(format!(
                "key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(CallbackSealer::Aes(Box::new(Aes256Gcm::new(key))))
    }

    pub fn is_plain(&self) -> bool {
        matches!(self, CallbackSealer::Plain)
    }

    pub fn seal(&self, name: &str) -> NetResult<String> {
        match self {
            CallbackSealer::Plain => Ok(name.to_string()),
            CallbackSealer::Aes(cipher) => {
                let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                let sealed = cipher
                    .encrypt(&nonce, name.as_bytes())
                    .map_err(|e| NetError::Seal(e.to_string()))?;
                Ok(format!("{}:{}", STANDARD.encode(nonce), STANDARD.encode(sealed)))
            }
        }
    }

    /// Reverse of [`seal`](Self::seal)
    pub fn open(&self, sealed: &str) -> NetResult<String> {
        let CallbackSealer::Aes(cipher) = self else {
            return Ok(sealed.to_string());
        };
        let (nonce, body) = sealed
            .split_once(':')
            .ok_or_else(|| NetError::Seal("missing nonce separator".into()))?;
        let nonce = STANDARD
            .decode(nonce)
            .map_err(|e| NetError::Seal(e.to_string()))?;
        if nonce.len() != NONCE_LEN {
            return Err(NetError::Seal("bad nonce length".into()));
        }
        let body = STANDARD
            .decode(body)
            .map_err(|e| NetError::Seal(e.to_string()))?;
        let plain = cipher
            .decrypt(Nonce::from_slice(&nonce), body.as_ref())
            .map_err(|e| NetError::Seal(e.to_string()))?;
        String::from_utf8(plain).map_err(|e| NetError::Seal(e.to_string()))
    }
}

impl fmt::Debug for CallbackSealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackSealer::Plain => write!(f, "Plain"),
            CallbackSealer::Aes(_) => write!(f, "Aes(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> String {
        STANDARD.encode([7u8; KEY_LEN])
    }

    #[test]
    fn test_plain_passthrough() {
        let sealer = CallbackSealer::from_key(None).unwrap();
        assert!(sealer.is_plain());
        assert_eq!(sealer.seal("Todo->add").unwrap(), "Todo->add");
    }

    #[test]
    fn test_sealed_name_opens() {
        let sealer = CallbackSealer::from_key(Some(&key())).unwrap();
        let sealed = sealer.seal("Todo->add").unwrap();
        assert_ne!(sealed, "Todo->add");
        assert!(sealed.contains(':'));
        assert_eq!(sealer.open(&sealed).unwrap(), "Todo->add");
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let sealer = CallbackSealer::from_key(Some(&key())).unwrap();
        assert_ne!(sealer.seal("save").unwrap(), sealer.seal("save").unwrap());
    }

    #[test]
    fn test_bad_key_rejected() {
        let short = STANDARD.encode([1u8; 8]);
        assert!(matches!(
            CallbackSealer::from_key(Some(&short)),
            Err(NetError::Seal(_))
        ));
        assert!(CallbackSealer::from_key(Some("not base64!")).is_err());
    }
}
