//! Key material for tunnel authentication
//!
//! A fresh RSA key pair is minted on every establishment. The private half is
//! kept locally as a single file per cluster and pushed to the remote node;
//! the public half is authorized for login there.

mod rsa_gen;
mod store;

pub use rsa_gen::{RsaKeyPairGenerator, KEY_COMMENT, RSA_KEY_BITS};
pub use store::KeyStore;
