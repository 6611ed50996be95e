use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};

/// Hash algorithm names this build can sign/verify with, in the
/// preference order a server should consult when intersecting with a
/// client's advertised list (spec.md §4.E #2's tie-break picks the first
/// client-offered name present here).
pub const SUPPORTED_HASHES: &[&str] = &["SHA256", "SHA1"];

/// Default RSA modulus size for generated keypairs (spec.md §4.H).
pub const DEFAULT_KEY_BITS: usize = 4096;

/// A signing/verification hash algorithm negotiated during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256, the preferred default.
    Sha256,
    /// SHA-1, kept for interoperability with older peers.
    Sha1,
}

impl HashAlgorithm {
    /// Parses a name from [`SUPPORTED_HASHES`].
    pub fn from_name(name: &str) -> CryptoResult<Self> {
        match name {
            "SHA256" => Ok(Self::Sha256),
            "SHA1" => Ok(Self::Sha1),
            other => Err(CryptoError::UnsupportedHash(other.to_string())),
        }
    }

    /// The wire name for this algorithm.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "SHA256",
            Self::Sha1 => "SHA1",
        }
    }
}

/// Capability interface an asymmetric keypair provider exposes to the
/// handshake and frame codec (spec.md §4.H). The default implementation,
/// [`RsaKeypair`], wraps RSA-4096 with OAEP encryption and PKCS#1 v1.5
/// signatures, matching spec.md's defaults.
pub trait PublicKeyCrypto {
    /// Encrypts `plaintext` under this key's public half.
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Decrypts `ciphertext` using this key's private half.
    fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Signs the hash of `data` under `alg` using the private half.
    fn hash_and_sign(&self, alg: HashAlgorithm, data: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Verifies a signature produced by [`PublicKeyCrypto::hash_and_sign`]
    /// against this key's public half.
    fn verify_signed_hash(
        &self,
        alg: HashAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> CryptoResult<bool>;

    /// Exports the public key in SPKI DER form.
    fn export_public_key(&self) -> CryptoResult<Vec<u8>>;
}

/// An RSA-4096 keypair: the default [`PublicKeyCrypto`] implementation.
#[derive(Clone)]
pub struct RsaKeypair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl RsaKeypair {
    /// Generates a fresh keypair with [`DEFAULT_KEY_BITS`] modulus bits.
    pub fn generate<R: rsa::rand_core::CryptoRngCore>(rng: &mut R) -> CryptoResult<Self> {
        let private = RsaPrivateKey::new(rng, DEFAULT_KEY_BITS)?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Imports a keypair from a PKCS#8 DER-encoded private key.
    pub fn import_private_der(der: &[u8]) -> CryptoResult<Self> {
        let private = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Imports only a public key (for the peer's half of the handshake,
    /// where no private key is available locally).
    pub fn import_public_der(der: &[u8]) -> CryptoResult<RsaPublicOnly> {
        let public = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Ok(RsaPublicOnly { public })
    }

    /// Exports the private key in PKCS#8 DER form.
    pub fn export_private_der(&self) -> CryptoResult<Vec<u8>> {
        self.private
            .to_pkcs8_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))
    }
}

impl PublicKeyCrypto for RsaKeypair {
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut rng = rand::rngs::OsRng;
        Ok(self
            .public
            .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)?)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(self.private.decrypt(Oaep::new::<Sha256>(), ciphertext)?)
    }

    fn hash_and_sign(&self, alg: HashAlgorithm, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut rng = rand::rngs::OsRng;
        let signature = match alg {
            HashAlgorithm::Sha256 => {
                let signing_key = SigningKey::<Sha256>::new(self.private.clone());
                signing_key.sign_with_rng(&mut rng, data)
            }
            HashAlgorithm::Sha1 => {
                let signing_key = SigningKey::<Sha1>::new(self.private.clone());
                signing_key.sign_with_rng(&mut rng, data)
            }
        };
        Ok(signature.to_string().into_bytes())
    }

    fn verify_signed_hash(
        &self,
        alg: HashAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> CryptoResult<bool> {
        RsaPublicOnly {
            public: self.public.clone(),
        }
        .verify_signed_hash(alg, data, signature)
    }

    fn export_public_key(&self) -> CryptoResult<Vec<u8>> {
        self.public
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))
    }
}

/// The peer's half of a keypair, as learned during the handshake: a public
/// key with no matching private key available locally, sufficient for
/// encrypting messages to the peer and verifying its signatures.
#[derive(Clone)]
pub struct RsaPublicOnly {
    public: RsaPublicKey,
}

impl RsaPublicOnly {
    /// Encrypts `plaintext` so only the holder of the matching private key
    /// can decrypt it.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut rng = rand::rngs::OsRng;
        Ok(self
            .public
            .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)?)
    }

    /// Verifies a signature produced by the matching private key.
    pub fn verify_signed_hash(
        &self,
        alg: HashAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> CryptoResult<bool> {
        let sig_text = std::str::from_utf8(signature)
            .map_err(|_| CryptoError::MalformedKey("signature is not valid text".into()))?;
        let sig: Signature = sig_text
            .parse()
            .map_err(|_| CryptoError::MalformedKey("signature is not valid PKCS#1".into()))?;
        let verified = match alg {
            HashAlgorithm::Sha256 => {
                VerifyingKey::<Sha256>::new(self.public.clone()).verify(data, &sig)
            }
            HashAlgorithm::Sha1 => {
                VerifyingKey::<Sha1>::new(self.public.clone()).verify(data, &sig)
            }
        };
        Ok(verified.is_ok())
    }

    /// Exports this public key in SPKI DER form.
    pub fn export_der(&self) -> CryptoResult<Vec<u8>> {
        self.public
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trips() {
        let mut rng = rand::rngs::OsRng;
        let keypair = RsaKeypair::generate(&mut rng).unwrap();
        let ciphertext = keypair.encrypt(b"session key bytes").unwrap();
        let plaintext = keypair.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"session key bytes");
    }

    #[test]
    fn sign_and_verify_round_trips() {
        let mut rng = rand::rngs::OsRng;
        let keypair = RsaKeypair::generate(&mut rng).unwrap();
        let signature = keypair
            .hash_and_sign(HashAlgorithm::Sha256, b"hello handshake")
            .unwrap();
        assert!(keypair
            .verify_signed_hash(HashAlgorithm::Sha256, b"hello handshake", &signature)
            .unwrap());
        assert!(!keypair
            .verify_signed_hash(HashAlgorithm::Sha256, b"tampered", &signature)
            .unwrap());
    }
}
