//! Chapter payload cipher: base64 text holding a 16-byte IV followed by AES-128-CBC ciphertext
//! with PKCS#7 padding.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use thiserror::Error;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

pub const KEY_LEN: usize = 16;
pub const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Key shipped with the public API. Override with the `aes_key` config key or `--key`.
pub const DEFAULT_KEY_HEX: &str = "32343263636238323330643730396531";

#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload too short: {len} bytes, need an IV and at least one block")]
    TooShort { len: usize },

    #[error("ciphertext length {len} is not a multiple of the block size")]
    Length { len: usize },

    #[error("bad padding (wrong key or corrupted data)")]
    Padding,

    #[error("decrypted text is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("key must be {expected} bytes, got {len}")]
    Length { expected: usize, len: usize },
}

/// AES-128-CBC cipher for chapter payloads. The key is injected at construction.
#[derive(Clone)]
pub struct ChapterCipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for ChapterCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChapterCipher").finish_non_exhaustive()
    }
}

impl Default for ChapterCipher {
    fn default() -> Self {
        // Compile-time constant, always 16 bytes of valid hex.
        Self::from_hex(DEFAULT_KEY_HEX).unwrap_or(Self { key: [0; KEY_LEN] })
    }
}

impl ChapterCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Parse a 32-character hex key.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim())?;
        let key: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| KeyError::Length {
            expected: KEY_LEN,
            len: bytes.len(),
        })?;
        Ok(Self { key })
    }

    /// Decrypt raw ciphertext with the given IV and strip PKCS#7 padding.
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8; IV_LEN]) -> Result<Vec<u8>, DecryptError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(DecryptError::Length {
                len: ciphertext.len(),
            });
        }
        Aes128CbcDec::new(&self.key.into(), &(*iv).into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| DecryptError::Padding)
    }

    /// Decode a base64 payload (ASCII whitespace ignored), split off the IV, decrypt and decode
    /// the result as UTF-8.
    pub fn decrypt_payload(&self, payload: &str) -> Result<String, DecryptError> {
        let compact: String = payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let raw = base64::engine::general_purpose::STANDARD.decode(compact)?;
        if raw.len() < IV_LEN + BLOCK_LEN {
            return Err(DecryptError::TooShort { len: raw.len() });
        }
        let (iv, ciphertext) = raw.split_at(IV_LEN);
        let mut iv_block = [0u8; IV_LEN];
        iv_block.copy_from_slice(iv);
        let plain = self.decrypt(ciphertext, &iv_block)?;
        Ok(String::from_utf8(plain)?)
    }

    /// Inverse of [decrypt_payload](Self::decrypt_payload): IV plus ciphertext, base64 encoded.
    pub fn encrypt_payload(&self, plaintext: &str, iv: &[u8; IV_LEN]) -> String {
        let ciphertext = Aes128CbcEnc::new(&self.key.into(), &(*iv).into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
        out.extend_from_slice(iv);
        out.extend_from_slice(&ciphertext);
        base64::engine::general_purpose::STANDARD.encode(out)
    }
}
