//! RSA key pair generation

use async_trait::async_trait;
use rand::rngs::OsRng;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::{BigUint, RsaPrivateKey};
use ssh_key::public::{KeyData, RsaPublicKey};

use crate::error::CryptoError;
use crate::traits::{GeneratedKeyPair, KeyPairGenerator};

/// Modulus size of generated keys
pub const RSA_KEY_BITS: usize = 2048;

/// Comment appended to the authorized_keys line
pub const KEY_COMMENT: &str = "tunnel-watchdog";

const PUBLIC_EXPONENT: u32 = 65537;

/// Generates RSA keys off the async runtime's worker threads
#[derive(Debug, Clone)]
pub struct RsaKeyPairGenerator {
    bits: usize,
}

impl RsaKeyPairGenerator {
    pub fn new() -> Self {
        Self { bits: RSA_KEY_BITS }
    }

    /// Generate synchronously; CPU bound
    pub fn generate_blocking(&self) -> Result<GeneratedKeyPair, CryptoError> {
        let exponent = BigUint::from(PUBLIC_EXPONENT);
        let private = RsaPrivateKey::new_with_exp(&mut OsRng, self.bits, &exponent)
            .map_err(|e| CryptoError(format!("RSA generation failed: {}", e)))?;

        let private_pem = private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| CryptoError(format!("PEM encoding failed: {}", e)))?;

        let public = RsaPublicKey::try_from(private.to_public_key())
            .map_err(|e| CryptoError(format!("Public key conversion failed: {}", e)))?;
        let public_openssh = ssh_key::PublicKey::new(KeyData::Rsa(public), KEY_COMMENT)
            .to_openssh()
            .map_err(|e| CryptoError(format!("OpenSSH encoding failed: {}", e)))?;

        Ok(GeneratedKeyPair {
            private_pem: private_pem.as_str().to_owned(),
            public_openssh,
        })
    }
}

impl Default for RsaKeyPairGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyPairGenerator for RsaKeyPairGenerator {
    async fn generate(&self) -> Result<GeneratedKeyPair, CryptoError> {
        let generator = self.clone();
        tokio::task::spawn_blocking(move || generator.generate_blocking())
            .await
            .map_err(|e| CryptoError(format!("Key generation task failed: {}", e)))?
    }
}
