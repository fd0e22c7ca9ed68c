//! Asynchronous handle to a serialized engine
//!
//! One dedicated thread owns the [`Engine`] and works through a command queue
//! in FIFO order, so the provider table is never shared. Handles are cheap to
//! clone; the worker exits once every handle is gone and the queue is drained.

use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::EngineConfig;
use crate::engine::{self, Engine};
use crate::error::{CompatError, ErrorCategory, ErrorKind, Result};
use crate::store::HostServices;
use crate::tier::{CipherTier, KeyTier};

/// Work accepted by the engine thread.
enum Command {
    Encrypt {
        plaintext: Zeroizing<Vec<u8>>,
        reply: oneshot::Sender<Result<String>>,
    },
    Decrypt {
        encoded: String,
        reply: oneshot::Sender<Result<Zeroizing<Vec<u8>>>>,
    },
    Tiers {
        reply: oneshot::Sender<(Vec<KeyTier>, Vec<CipherTier>)>,
    },
}

#[derive(Clone)]
pub struct EncryptionCompat {
    command_tx: mpsc::UnboundedSender<Command>,
}

impl EncryptionCompat {
    /// Builds an engine for `config` and starts its worker thread.
    pub fn new(config: &EngineConfig, services: &HostServices) -> Result<Self> {
        Self::with_engine(Engine::new(config, services)?)
    }

    /// Starts a worker thread that owns `engine`.
    pub fn with_engine(engine: Engine) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("encryption-compat".to_string())
            .spawn(move || run(engine, command_rx))
            .map_err(|e| {
                CompatError::with_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to start engine thread",
                    e,
                )
            })?;
        Ok(Self { command_tx })
    }

    pub async fn encrypt(&self, plaintext: &str) -> Result<String> {
        self.encrypt_bytes(plaintext.as_bytes()).await
    }

    pub async fn decrypt(&self, encoded: &str) -> Result<String> {
        engine::into_utf8(self.decrypt_bytes(encoded).await?)
    }

    pub async fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<String> {
        self.submit(encrypt_command(plaintext))?.await.map_err(|_| closed())?
    }

    pub async fn decrypt_bytes(&self, encoded: &str) -> Result<Zeroizing<Vec<u8>>> {
        self.submit(decrypt_command(encoded))?.await.map_err(|_| closed())?
    }

    /// Key and cipher tiers currently in the engine's table, strongest first.
    pub async fn tiers(&self) -> Result<(Vec<KeyTier>, Vec<CipherTier>)> {
        self.submit(|reply| Command::Tiers { reply })?
            .await
            .map_err(|_| closed())
    }

    /// Blocking form of [`EncryptionCompat::encrypt`]. Must not be called
    /// from within an async runtime.
    pub fn encrypt_blocking(&self, plaintext: &str) -> Result<String> {
        self.submit(encrypt_command(plaintext.as_bytes()))?
            .blocking_recv()
            .map_err(|_| closed())?
    }

    /// Blocking form of [`EncryptionCompat::decrypt`]. Must not be called
    /// from within an async runtime.
    pub fn decrypt_blocking(&self, encoded: &str) -> Result<String> {
        let plaintext = self
            .submit(decrypt_command(encoded))?
            .blocking_recv()
            .map_err(|_| closed())??;
        engine::into_utf8(plaintext)
    }

    /// Queues a command and returns the receiver for its reply.
    fn submit<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<oneshot::Receiver<T>> {
        let (reply, rx) = oneshot::channel();
        self.command_tx.send(command(reply)).map_err(|_| closed())?;
        Ok(rx)
    }
}

fn encrypt_command(plaintext: &[u8]) -> impl FnOnce(oneshot::Sender<Result<String>>) -> Command {
    let plaintext = Zeroizing::new(plaintext.to_vec());
    move |reply| Command::Encrypt { plaintext, reply }
}

fn decrypt_command(
    encoded: &str,
) -> impl FnOnce(oneshot::Sender<Result<Zeroizing<Vec<u8>>>>) -> Command {
    let encoded = encoded.to_string();
    move |reply| Command::Decrypt { encoded, reply }
}

fn closed() -> CompatError {
    CompatError::new(
        ErrorCategory::Internal,
        ErrorKind::EngineClosed,
        "encryption engine is no longer running",
    )
}

/// Worker loop. Replies to callers that went away are dropped.
fn run(mut engine: Engine, mut command_rx: mpsc::UnboundedReceiver<Command>) {
    debug!("engine thread started");
    while let Some(command) = command_rx.blocking_recv() {
        match command {
            Command::Encrypt { plaintext, reply } => {
                let _ = reply.send(engine.encrypt(&plaintext));
            }
            Command::Decrypt { encoded, reply } => {
                let _ = reply.send(engine.decrypt(&encoded));
            }
            Command::Tiers { reply } => {
                let _ = reply.send((engine.key_tiers(), engine.cipher_tiers()));
            }
        }
    }
    debug!("engine thread exiting");
}
