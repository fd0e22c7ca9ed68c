//! Cipher provider contract
//!
//! A cipher provider turns plaintext into a self-contained ciphertext
//! segment (IV and authentication data included) and back. Associated data
//! is authenticated but not stored in the segment.

mod cbc_hmac;
mod gcm;

pub use cbc_hmac::CbcHmacCipher;
pub use gcm::GcmCipher;

use zeroize::Zeroizing;

use crate::error::Result;
use crate::key::SecretKey;

pub trait CipherProvider: Send {
    /// Encrypts `plaintext` under `key`. Failure here is fatal for the call;
    /// it does not trigger key tier fallback.
    fn encrypt(&self, key: &SecretKey, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    /// Authenticates and decrypts a segment produced by [`CipherProvider::encrypt`].
    ///
    /// Fails with `MalformedInput` if the segment violates the layout and
    /// with `AuthenticationFailed` if integrity verification fails.
    fn decrypt(&self, key: &SecretKey, segment: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}
