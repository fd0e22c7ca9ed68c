//! File encryption/decryption operations
//!
//! Output files are created with mode 0o600 on Unix systems. Replacing an
//! existing file goes through a tempfile in the same directory followed by
//! fsync and rename, so readers see either the old or the new contents.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use zeroize::Zeroizing;

use crate::engine::Engine;
use crate::error::{CompatError, ErrorCategory, ErrorKind, Result};

/// Encrypt a file
///
/// Reads plaintext from `input_path` and writes the envelope to `output_path`.
pub fn encrypt_file(engine: &mut Engine, input_path: &Path, output_path: &Path) -> Result<()> {
    let plaintext = Zeroizing::new(fs::read(input_path).map_err(|e| read_error(input_path, e))?);
    let encoded = engine
        .encrypt(&plaintext)
        .map_err(|e| e.with_context("encryption failed"))?;
    write_file_secure(output_path, encoded.as_bytes())
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    Ok(())
}

/// Decrypt a file
///
/// Reads an envelope from `input_path` and writes the plaintext to `output_path`.
pub fn decrypt_file(engine: &mut Engine, input_path: &Path, output_path: &Path) -> Result<()> {
    let encoded = read_envelope(input_path)?;
    let plaintext = engine
        .decrypt(&encoded)
        .map_err(|e| e.with_context("failed to decrypt"))?;
    write_file_secure(output_path, &plaintext)
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    Ok(())
}

/// Replace an encrypted file with an encryption of new plaintext
///
/// The existing envelope at `crypt_path` must decrypt first, which guards
/// against overwriting data this engine cannot read. The new envelope uses
/// the engine's current strongest tiers.
pub fn update_file(engine: &mut Engine, plain_path: &Path, crypt_path: &Path) -> Result<()> {
    let encoded = read_envelope(crypt_path)?;
    engine
        .decrypt(&encoded)
        .map_err(|e| e.with_context("failed to decrypt"))?;

    let new_plaintext = Zeroizing::new(
        fs::read(plain_path).map_err(|e| read_error(plain_path, e))?,
    );
    let new_encoded = engine
        .encrypt(&new_plaintext)
        .map_err(|e| e.with_context("failed to encrypt"))?;
    write_file_atomic(crypt_path, new_encoded.as_bytes())
}

fn read_envelope(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
    let text = String::from_utf8(bytes).map_err(|e| {
        CompatError::with_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("{} is not valid UTF-8", path.display()),
            e,
        )
    })?;
    // Tolerate a trailing newline added by editors or `echo`.
    Ok(text.trim_end().to_string())
}

fn io_error(msg: impl Into<String>, err: io::Error) -> CompatError {
    CompatError::with_source(ErrorCategory::Internal, ErrorKind::Io, msg, err)
}

/// Write `contents` to `path` atomically (tempfile + fsync + rename, 0o600)
pub(crate) fn write_file_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| io_error("failed to create tempfile", e))?;

    temp_file
        .write_all(contents)
        .map_err(|e| io_error("failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| io_error("failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| io_error("failed to sync file prior to rename", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| io_error("failed to get tempfile metadata", e))?
            .permissions();
        perms.set_mode(0o600);
        temp_file
            .as_file()
            .set_permissions(perms)
            .map_err(|e| io_error("failed to set tempfile permissions", e))?;
    }

    temp_file.persist(path).map_err(|e| {
        io_error(
            format!("failed to rename to target file {}", path.display()),
            e.error,
        )
    })?;
    Ok(())
}

/// Write file with secure permissions (0o600 on Unix)
pub fn write_file_secure(path: &Path, contents: &[u8]) -> Result<()> {
    #[cfg(unix)]
    let file = {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
    };

    #[cfg(not(unix))]
    let file = fs::File::create(path);

    let mut file = file.map_err(|e| {
        CompatError::with_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to open {}", path.display()),
            e,
        )
    })?;
    file.write_all(contents)
        .map_err(|e| io_error(format!("failed to write {}", path.display()), e))?;
    Ok(())
}

fn read_error(path: &Path, err: io::Error) -> CompatError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    CompatError::with_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
