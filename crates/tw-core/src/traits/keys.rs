//! Key pair generation trait

use async_trait::async_trait;
use std::fmt;

use crate::error::CryptoError;

/// A freshly minted key pair in its textual encodings
#[derive(Clone)]
pub struct GeneratedKeyPair {
    /// Unencrypted PKCS#1 PEM
    pub private_pem: String,
    /// Single authorized_keys line
    pub public_openssh: String,
}

impl fmt::Debug for GeneratedKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedKeyPair")
            .field("private_pem", &"<redacted>")
            .field("public_openssh", &self.public_openssh)
            .finish()
    }
}

/// Produces a new key pair on every call
#[async_trait]
pub trait KeyPairGenerator: Send + Sync {
    async fn generate(&self) -> Result<GeneratedKeyPair, CryptoError>;
}
