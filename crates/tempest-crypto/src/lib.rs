//! # Overview
//!
//! `tempest-crypto` is spec.md §4.H's capability interface: an asymmetric
//! keypair abstraction ([`asymmetric::PublicKeyCrypto`], defaulted to
//! RSA-4096 via [`asymmetric::RsaKeypair`]) used for the handshake, and the
//! per-session symmetric pair ([`symmetric::SessionCrypto`]: AES-256-CBC
//! with a fresh random IV per message, HMAC-SHA256 for authentication)
//! used for every frame once the handshake completes.
//!
//! Neither half knows anything about the wire format or connection
//! lifecycle — `tempest-frame` and `tempest-session` are the callers.

mod asymmetric;
mod error;
mod symmetric;

pub use asymmetric::{
    HashAlgorithm, PublicKeyCrypto, RsaKeypair, RsaPublicOnly, DEFAULT_KEY_BITS, SUPPORTED_HASHES,
};
pub use error::{CryptoError, CryptoResult};
pub use symmetric::{SessionCrypto, AES_KEY_LEN, HMAC_TAG_LEN, IV_LEN};
