//! AES-256-CBC with HMAC-SHA256, encrypt-then-MAC
//!
//! Segment layout:
//! - mac: 32 bytes, HMAC-SHA256 over iv || ciphertext || aad
//! - iv: 16 bytes
//! - ciphertext: AES-256-CBC with PKCS#7 padding
//!
//! Separate encryption and MAC subkeys are derived from the message key with
//! HMAC-SHA256 under fixed labels.

use aes::Aes256;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::CipherProvider;
use crate::error::{CompatError, ErrorCategory, ErrorKind, Result};
use crate::key::{KEY_LEN, SecretKey};

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Length of the HMAC-SHA256 tag in bytes
const MAC_LEN: usize = 32;

/// CBC IV is the AES block size
const IV_LEN: usize = 16;

const ENC_LABEL: &[u8] = b"encryption-compat cbc-hmac enc";
const MAC_LABEL: &[u8] = b"encryption-compat cbc-hmac mac";

#[derive(Debug, Default)]
pub struct CbcHmacCipher;

impl CbcHmacCipher {
    pub fn new() -> Self {
        Self
    }
}

fn new_mac(key: &[u8]) -> Result<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| {
        CompatError::new(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "failed to initialize HMAC",
        )
    })
}

fn subkey(key: &SecretKey, label: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let mut mac = new_mac(key.as_bytes())?;
    mac.update(label);
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn compute_mac(mac_key: &[u8], iv: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<[u8; MAC_LEN]> {
    let mut mac = new_mac(mac_key)?;
    mac.update(iv);
    mac.update(ciphertext);
    mac.update(aad);
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn invalid_length<E>(_: E) -> CompatError {
    CompatError::new(
        ErrorCategory::Internal,
        ErrorKind::InternalInvariant,
        "invalid AES-CBC key or IV length",
    )
}

impl CipherProvider for CbcHmacCipher {
    fn encrypt(&self, key: &SecretKey, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let enc_key = subkey(key, ENC_LABEL)?;
        let mac_key = subkey(key, MAC_LABEL)?;

        let mut iv = Zeroizing::new([0u8; IV_LEN]);
        OsRng.fill_bytes(&mut iv[..]);

        let ciphertext = Aes256CbcEnc::new_from_slices(&enc_key[..], &iv[..])
            .map_err(invalid_length)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        let mac = Zeroizing::new(compute_mac(&mac_key[..], &iv[..], &ciphertext, aad)?);

        let mut output = Vec::with_capacity(MAC_LEN + IV_LEN + ciphertext.len());
        output.extend_from_slice(&mac[..]);
        output.extend_from_slice(&iv[..]);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decrypt(&self, key: &SecretKey, segment: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if segment.len() < MAC_LEN + IV_LEN {
            return Err(CompatError::malformed_input(
                "segment likely truncated while reading MAC and IV",
            ));
        }
        let (mac, rest) = segment.split_at(MAC_LEN);
        let (iv, ciphertext) = rest.split_at(IV_LEN);

        let enc_key = subkey(key, ENC_LABEL)?;
        let mac_key = subkey(key, MAC_LABEL)?;

        // Reject before touching the ciphertext.
        let expected = Zeroizing::new(compute_mac(&mac_key[..], iv, ciphertext, aad)?);
        if !bool::from(expected[..].ct_eq(mac)) {
            return Err(CompatError::authentication_failed());
        }

        let plaintext = Aes256CbcDec::new_from_slices(&enc_key[..], iv)
            .map_err(invalid_length)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CompatError::authentication_failed())?;
        Ok(Zeroizing::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretKey {
        SecretKey::from_bytes([0x11u8; KEY_LEN])
    }

    #[test]
    fn test_encrypt_decrypt_matches() {
        let cipher = CbcHmacCipher::new();
        let segment = cipher.encrypt(&key(), b"foo", b"").unwrap();
        let plaintext = cipher.decrypt(&key(), &segment, b"").unwrap();
        assert_eq!(&plaintext[..], b"foo");
    }

    #[test]
    fn test_layout() {
        let cipher = CbcHmacCipher::new();
        // 5 bytes of plaintext pad to one block; 16 bytes pad to two.
        let short = cipher.encrypt(&key(), b"hello", b"").unwrap();
        assert_eq!(short.len(), MAC_LEN + IV_LEN + 16);
        let full = cipher.encrypt(&key(), &[0u8; 16], b"").unwrap();
        assert_eq!(full.len(), MAC_LEN + IV_LEN + 32);
    }

    #[test]
    fn test_random_iv() {
        let cipher = CbcHmacCipher::new();
        let a = cipher.encrypt(&key(), b"same", b"").unwrap();
        let b = cipher.encrypt(&key(), b"same", b"").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key() {
        let cipher = CbcHmacCipher::new();
        let segment = cipher.encrypt(&key(), b"secret", b"").unwrap();
        let other = SecretKey::from_bytes([0x22u8; KEY_LEN]);
        let err = cipher
            .decrypt(&other, &segment, b"")
            .expect_err("expected authentication failure");
        assert_eq!(err.kind, ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn test_aad_mismatch() {
        let cipher = CbcHmacCipher::new();
        let segment = cipher.encrypt(&key(), b"secret", b"header-a").unwrap();
        let err = cipher
            .decrypt(&key(), &segment, b"header-b")
            .expect_err("expected authentication failure");
        assert_eq!(err.kind, ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn test_every_bit_flip_rejected() {
        let cipher = CbcHmacCipher::new();
        let segment = cipher.encrypt(&key(), b"attack at dawn", b"aad").unwrap();
        for byte in 0..segment.len() {
            for bit in 0..8 {
                let mut tampered = segment.clone();
                tampered[byte] ^= 1 << bit;
                let err = cipher
                    .decrypt(&key(), &tampered, b"aad")
                    .expect_err("tampered segment must not decrypt");
                assert_eq!(err.kind, ErrorKind::AuthenticationFailed);
            }
        }
    }

    #[test]
    fn test_truncated_segment() {
        let cipher = CbcHmacCipher::new();
        let err = cipher
            .decrypt(&key(), &[0u8; MAC_LEN + IV_LEN - 1], b"")
            .expect_err("expected malformed input");
        assert_eq!(err.kind, ErrorKind::MalformedInput);
    }

    #[test]
    fn test_truncated_ciphertext_fails_authentication() {
        let cipher = CbcHmacCipher::new();
        let segment = cipher.encrypt(&key(), b"hello world", b"").unwrap();
        let err = cipher
            .decrypt(&key(), &segment[..segment.len() - 1], b"")
            .expect_err("expected authentication failure");
        assert_eq!(err.kind, ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn test_empty_plaintext() {
        let cipher = CbcHmacCipher::new();
        let segment = cipher.encrypt(&key(), b"", b"").unwrap();
        assert_eq!(segment.len(), MAC_LEN + IV_LEN + 16);
        assert!(cipher.decrypt(&key(), &segment, b"").unwrap().is_empty());
    }
}
