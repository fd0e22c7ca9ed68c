//! AES-256-GCM
//!
//! Segment layout:
//! - iv length: 1 byte, 12 through 16 inclusive
//! - iv: iv length bytes
//! - ciphertext + 16-byte tag
//!
//! New segments always use a 12-byte IV; longer IVs are accepted on decrypt.

use aes_gcm::aead::consts::{U12, U13, U14, U15, U16};
use aes_gcm::aead::generic_array::{ArrayLength, GenericArray};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Aes256Gcm, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use super::CipherProvider;
use crate::error::{CompatError, ErrorCategory, ErrorKind, Result};
use crate::key::SecretKey;

/// IV length used for new encryptions
const IV_LEN: usize = 12;

/// Smallest IV length accepted on decrypt
const MIN_IV_LEN: usize = 12;

/// Largest IV length accepted on decrypt
const MAX_IV_LEN: usize = 16;

#[derive(Debug, Default)]
pub struct GcmCipher;

impl GcmCipher {
    pub fn new() -> Self {
        Self
    }
}

/// Opens `sealed` with an IV of `N` bytes. `iv.len()` must equal `N`.
fn open<N: ArrayLength<u8>>(
    key: &SecretKey,
    iv: &[u8],
    sealed: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = AesGcm::<Aes256, N>::new(GenericArray::from_slice(key.as_bytes()));
    cipher
        .decrypt(GenericArray::from_slice(iv), Payload { msg: sealed, aad })
        .map(Zeroizing::new)
        .map_err(|_| CompatError::authentication_failed())
}

impl CipherProvider for GcmCipher {
    fn encrypt(&self, key: &SecretKey, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let mut iv = Zeroizing::new([0u8; IV_LEN]);
        OsRng.fill_bytes(&mut iv[..]);

        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        let sealed = cipher
            .encrypt(Nonce::from_slice(&iv[..]), Payload { msg: plaintext, aad })
            .map_err(|_| {
                CompatError::new(
                    ErrorCategory::Internal,
                    ErrorKind::InternalInvariant,
                    "AES-GCM encryption failed",
                )
            })?;

        let mut output = Vec::with_capacity(1 + IV_LEN + sealed.len());
        output.push(IV_LEN as u8);
        output.extend_from_slice(&iv[..]);
        output.extend_from_slice(&sealed);
        Ok(output)
    }

    fn decrypt(&self, key: &SecretKey, segment: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let Some((&iv_len, rest)) = segment.split_first() else {
            return Err(CompatError::malformed_input("empty ciphertext segment"));
        };
        let iv_len = usize::from(iv_len);

        // A corrupted length byte must never be used to index the segment.
        if !(MIN_IV_LEN..=MAX_IV_LEN).contains(&iv_len) {
            return Err(CompatError::malformed_input(format!(
                "IV length {} outside [{}, {}]",
                iv_len, MIN_IV_LEN, MAX_IV_LEN
            )));
        }
        if rest.len() < iv_len {
            return Err(CompatError::malformed_input(
                "segment likely truncated while reading IV",
            ));
        }
        let (iv, sealed) = rest.split_at(iv_len);

        match iv_len {
            12 => open::<U12>(key, iv, sealed, aad),
            13 => open::<U13>(key, iv, sealed, aad),
            14 => open::<U14>(key, iv, sealed, aad),
            15 => open::<U15>(key, iv, sealed, aad),
            16 => open::<U16>(key, iv, sealed, aad),
            _ => Err(CompatError::malformed_input("unsupported IV length")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KEY_LEN;

    fn key() -> SecretKey {
        SecretKey::from_bytes([0x33u8; KEY_LEN])
    }

    #[test]
    fn test_encrypt_decrypt_matches() {
        let cipher = GcmCipher::new();
        let segment = cipher.encrypt(&key(), b"foo", b"").unwrap();
        let plaintext = cipher.decrypt(&key(), &segment, b"").unwrap();
        assert_eq!(&plaintext[..], b"foo");
    }

    #[test]
    fn test_layout() {
        let cipher = GcmCipher::new();
        let segment = cipher.encrypt(&key(), b"hello", b"").unwrap();
        assert_eq!(segment[0] as usize, IV_LEN);
        assert_eq!(segment.len(), 1 + IV_LEN + 5 + 16);
    }

    #[test]
    fn test_sixteen_byte_iv_accepted() {
        let iv = [0x05u8; 16];
        let cipher = AesGcm::<Aes256, U16>::new(GenericArray::from_slice(key().as_bytes()));
        let sealed = cipher
            .encrypt(GenericArray::from_slice(&iv), Payload { msg: b"long iv", aad: b"" })
            .unwrap();

        let mut segment = vec![16u8];
        segment.extend_from_slice(&iv);
        segment.extend_from_slice(&sealed);

        let plaintext = GcmCipher::new().decrypt(&key(), &segment, b"").unwrap();
        assert_eq!(&plaintext[..], b"long iv");
    }

    #[test]
    fn test_iv_length_out_of_range() {
        let cipher = GcmCipher::new();
        let mut segment = cipher.encrypt(&key(), b"hello", b"").unwrap();
        for bad in [0u8, 11, 17, 255] {
            segment[0] = bad;
            let err = cipher
                .decrypt(&key(), &segment, b"")
                .expect_err("expected malformed input");
            assert_eq!(err.kind, ErrorKind::MalformedInput, "iv length {}", bad);
        }
    }

    #[test]
    fn test_iv_length_in_range_but_wrong() {
        let cipher = GcmCipher::new();
        let mut segment = cipher.encrypt(&key(), b"hello", b"").unwrap();
        segment[0] = 13;
        let err = cipher
            .decrypt(&key(), &segment, b"")
            .expect_err("expected authentication failure");
        assert_eq!(err.kind, ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn test_empty_and_short_segments() {
        let cipher = GcmCipher::new();
        let err = cipher.decrypt(&key(), &[], b"").expect_err("expected malformed input");
        assert_eq!(err.kind, ErrorKind::MalformedInput);

        let err = cipher
            .decrypt(&key(), &[12, 1, 2, 3], b"")
            .expect_err("expected malformed input");
        assert_eq!(err.kind, ErrorKind::MalformedInput);
    }

    #[test]
    fn test_missing_tag_fails_authentication() {
        let cipher = GcmCipher::new();
        let mut segment = vec![12u8];
        segment.extend_from_slice(&[0u8; 12]);
        let err = cipher
            .decrypt(&key(), &segment, b"")
            .expect_err("expected authentication failure");
        assert_eq!(err.kind, ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn test_every_bit_flip_after_length_rejected() {
        let cipher = GcmCipher::new();
        let segment = cipher.encrypt(&key(), b"attack at dawn", b"aad").unwrap();
        for byte in 1..segment.len() {
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
    fn test_wrong_key_and_aad() {
        let cipher = GcmCipher::new();
        let segment = cipher.encrypt(&key(), b"secret", b"a").unwrap();

        let other = SecretKey::from_bytes([0x44u8; KEY_LEN]);
        let err = cipher.decrypt(&other, &segment, b"a").expect_err("wrong key");
        assert_eq!(err.kind, ErrorKind::AuthenticationFailed);

        let err = cipher.decrypt(&key(), &segment, b"b").expect_err("wrong aad");
        assert_eq!(err.kind, ErrorKind::AuthenticationFailed);
    }
}
