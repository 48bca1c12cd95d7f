//! AES-128-CBC encryption of application payloads with a per-frame random
//! IV, plus the base64 framing used to carry a raw 16-byte key inside a
//! `KEY_EXCHANGE` message.
//!
//! Wire layout of an encrypted payload: `iv(16 bytes) ∥ ciphertext`. The key
//! itself travels in cleartext inside `KEY_EXCHANGE` — see the crate's
//! top-level docs for why this is a known, accepted limitation rather than
//! an oversight.

use aes::Aes128;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::{Error, Result};

/// AES-128 key size in bytes.
pub const KEY_SIZE: usize = 16;

/// AES block / CBC IV size in bytes.
pub const IV_SIZE: usize = 16;

type CbcEncryptor = cbc::Encryptor<Aes128>;
type CbcDecryptor = cbc::Decryptor<Aes128>;

/// A 16-byte AES-128 key.
pub type Key = [u8; KEY_SIZE];

/// Draws `n` cryptographically-random bytes.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Generates a fresh random AES-128 key. Called by the server at session
/// start when the negotiated mode is `secure` or `secure_obfs`.
pub fn generate_key() -> Key {
    let mut key = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Encrypts `plaintext` under `key` with a freshly drawn random IV,
/// returning `iv ∥ ciphertext`.
pub fn encrypt(key: &Key, plaintext: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = CbcEncryptor::new(key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypts a `iv ∥ ciphertext` buffer produced by [`encrypt`]. Returns
/// [`Error::DecryptError`] if the buffer is too short to contain an IV, and
/// [`Error::PaddingError`] if the PKCS#7 padding does not unpad cleanly
/// (corruption, or the wrong key).
pub fn decrypt(key: &Key, framed: &[u8]) -> Result<Vec<u8>> {
    if framed.len() < IV_SIZE {
        return Err(Error::DecryptError);
    }
    let (iv, ciphertext) = framed.split_at(IV_SIZE);

    CbcDecryptor::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::PaddingError)
}

/// Encodes a key for transmission inside a `KEY_EXCHANGE` message payload.
pub fn encode_key(key: &Key) -> String {
    BASE64.encode(key)
}

/// Decodes a key received inside a `KEY_EXCHANGE` message payload.
pub fn decode_key(encoded: &str) -> Result<Key> {
    let bytes = BASE64.decode(encoded).map_err(|_| Error::MessageInvalid)?;
    bytes.try_into().map_err(|_| Error::MessageInvalid)
}
