use thiserror::Error;

/// Failures raised by the crypto capability layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// RSA encryption or decryption failed (wrong key, corrupt ciphertext).
    #[error("RSA operation failed: {0}")]
    Rsa(#[from] rsa::Error),
    /// Signature creation or verification failed.
    #[error("signature operation failed: {0}")]
    Signature(#[from] signature::Error),
    /// A hash algorithm name was not one of [`crate::SUPPORTED_HASHES`].
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHash(String),
    /// A key failed to parse from its wire encoding.
    #[error("malformed key material: {0}")]
    MalformedKey(String),
    /// AES-CBC decryption failed (bad padding or tampered ciphertext).
    #[error("symmetric decryption failed")]
    SymmetricDecrypt,
}

/// Result alias used throughout the crypto capability layer.
pub type CryptoResult<T> = Result<T, CryptoError>;
