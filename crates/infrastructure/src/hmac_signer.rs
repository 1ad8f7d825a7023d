use hmac::{Hmac, Mac};
use sha2::Sha256;
use tessera_application::MessageSigner;
use tessera_core::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer producing lowercase hex signatures.
#[derive(Clone)]
pub struct HmacSha256Signer {
    key: Vec<u8>,
}

impl HmacSha256Signer {
    /// Creates a signer; the key must not be empty.
    pub fn new(key: &[u8]) -> AppResult<Self> {
        if key.is_empty() {
            return Err(AppError::Validation(
                "signing key must not be empty".to_owned(),
            ));
        }

        Ok(Self { key: key.to_vec() })
    }

    fn mac(&self, message: &[u8]) -> AppResult<HmacSha256> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
            .map_err(|error| AppError::Internal(format!("invalid signing key: {error}")))?;
        mac.update(message);
        Ok(mac)
    }
}

impl MessageSigner for HmacSha256Signer {
    fn sign(&self, message: &[u8]) -> AppResult<String> {
        Ok(hex::encode(self.mac(message)?.finalize().into_bytes()))
    }

    fn verify(&self, message: &[u8], signature: &str) -> AppResult<bool> {
        let Ok(signature) = hex::decode(signature) else {
            return Ok(false);
        };

        Ok(self.mac(message)?.verify_slice(&signature).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_rfc_4231_vector() -> AppResult<()> {
        let signer = HmacSha256Signer::new(b"Jefe")?;

        assert_eq!(
            signer.sign(b"what do ya want for nothing?")?,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        Ok(())
    }

    #[test]
    fn tampered_message_or_signature_fails() -> AppResult<()> {
        let signer = HmacSha256Signer::new(b"session-key")?;
        let signature = signer.sign(b"user=42")?;

        assert!(signer.verify(b"user=42", &signature)?);
        assert!(!signer.verify(b"user=43", &signature)?);
        assert!(!signer.verify(b"user=42", "zz")?);
        assert!(!signer.verify(b"user=42", &signature[..10])?);
        Ok(())
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(HmacSha256Signer::new(b"").is_err());
    }
}
