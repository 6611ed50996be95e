//! Per-session symmetric crypto: AES-256-CBC with a fresh random IV per
//! message, HMAC-SHA256 over header+payload for authentication (spec.md
//! §4.E #4, §4.H). The handshake derives the 256-bit AES key and hands it
//! here; `tempest-frame` calls [`SessionCrypto::encrypt`]/[`decrypt`] and
//! [`SessionCrypto::sign`]/[`verify`] per frame.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::{CryptoError, CryptoResult};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// AES-256 key length in bytes.
pub const AES_KEY_LEN: usize = 32;
/// CBC IV length in bytes (one AES block).
pub const IV_LEN: usize = 16;
/// HMAC-SHA256 tag length in bytes.
pub const HMAC_TAG_LEN: usize = 32;

/// The session key pair derived at the end of the handshake (spec.md
/// §4.E #4): one 256-bit AES key, used both to encrypt payloads (with a
/// fresh IV per message) and to key the HMAC that authenticates frames.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SessionCrypto {
    aes_key: [u8; AES_KEY_LEN],
}

impl SessionCrypto {
    /// Wraps a 256-bit AES key exchanged during `FinalConnect`.
    #[must_use]
    pub const fn new(aes_key: [u8; AES_KEY_LEN]) -> Self {
        Self { aes_key }
    }

    /// Generates a fresh random session key (used by the server before
    /// encrypting it under the client's public key in `FinalConnect`... in
    /// practice the client generates the key; this helper exists for tests
    /// and for any future server-initiated rekey).
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0u8; AES_KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// The raw key bytes, as exchanged (encrypted) during `FinalConnect`.
    #[must_use]
    pub const fn key_bytes(&self) -> &[u8; AES_KEY_LEN] {
        &self.aes_key
    }

    /// Encrypts `plaintext` in place under a freshly generated random IV,
    /// returning `(iv, ciphertext)`. PKCS#7-padded CBC, matching spec.md
    /// §4.D step 2.
    pub fn encrypt(&self, plaintext: &[u8]) -> ([u8; IV_LEN], Vec<u8>) {
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        let ciphertext = Aes256CbcEnc::new(&self.aes_key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        (iv, ciphertext)
    }

    /// Decrypts a ciphertext produced by [`SessionCrypto::encrypt`] given
    /// its IV. Fails with [`CryptoError::SymmetricDecrypt`] on bad padding
    /// or a tampered ciphertext.
    pub fn decrypt(&self, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        Aes256CbcDec::new(&self.aes_key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::SymmetricDecrypt)
    }

    /// Computes the HMAC-SHA256 tag over `data` (header + payload,
    /// excluding the signature-length field itself, per spec.md §4.D
    /// step 4).
    #[must_use]
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.aes_key).expect("HMAC accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    /// Verifies a tag produced by [`SessionCrypto::sign`] in constant time.
    #[must_use]
    pub fn verify(&self, data: &[u8], tag: &[u8]) -> bool {
        let mut mac = HmacSha256::new_from_slice(&self.aes_key).expect("HMAC accepts any key length");
        mac.update(data);
        mac.verify_slice(tag).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trips() {
        let crypto = SessionCrypto::generate();
        let (iv, ciphertext) = crypto.encrypt(b"hello session");
        let plaintext = crypto.decrypt(&iv, &ciphertext).unwrap();
        assert_eq!(plaintext, b"hello session");
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let crypto = SessionCrypto::generate();
        let (iv, mut ciphertext) = crypto.encrypt(b"hello session");
        ciphertext[0] ^= 0xff;
        assert!(crypto.decrypt(&iv, &ciphertext).is_err());
    }

    #[test]
    fn hmac_round_trips_and_rejects_tampering() {
        let crypto = SessionCrypto::generate();
        let tag = crypto.sign(b"header+payload bytes");
        assert!(crypto.verify(b"header+payload bytes", &tag));
        assert!(!crypto.verify(b"tampered bytes", &tag));
    }
}
