use std::error::Error as _;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use encryption_compat::store::{FilePreferences, PreferenceStore, SoftwareKeyStore};
use encryption_compat::{
    CompatError, Engine, EngineConfig, ErrorCategory, ErrorKind, HostServices, PlatformRange,
    Result, file_ops,
};

#[derive(Parser, Debug)]
#[command(name = "encryption-compat", version, about = "tiered text encryption")]
struct Cli {
    /// Directory holding preferences.json and keystore.json
    #[arg(long = "state-dir", global = true)]
    state_dir: Option<PathBuf>,

    /// Namespace for stored passwords and key aliases
    #[arg(long = "app-id", default_value = "encryption-compat", global = true)]
    app_id: String,

    /// Oldest platform version envelopes must stay decryptable on
    #[arg(long = "min-platform", default_value_t = 14, global = true)]
    min_platform: u32,

    /// Platform version of this device
    #[arg(long = "platform", default_value_t = 28, global = true)]
    platform: u32,

    /// Allow hardware-backed key storage
    #[arg(long = "hardware-backed", global = true)]
    hardware_backed: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file or stdin
    Encrypt {
        /// Path to the file whose contents is to be encrypted (default: stdin)
        #[arg(short = 'i', long = "input")]
        input: Option<PathBuf>,
        /// Path to the file to write the envelope to (default: stdout)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Decrypt a file or stdin
    Decrypt {
        /// Path to the file holding the envelope (default: stdin)
        #[arg(short = 'i', long = "input")]
        input: Option<PathBuf>,
        /// Path to the file to write the plaintext to (default: stdout)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Replace an encrypted file with an encryption of new content
    Update {
        /// Path to the file whose contents is to be encrypted
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        /// Path to the existing encrypted file to replace
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// List the key and cipher tiers available for the configured platform
    Tiers,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("Error: {}", err);
        let mut source = err.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        return Err(usage_error("command is required; use --help to see list of commands"));
    };
    let Some(state_dir) = cli.state_dir else {
        return Err(usage_error("--state-dir is required"));
    };

    let config = EngineConfig::new(cli.app_id, PlatformRange::new(cli.min_platform, cli.platform))
        .with_hardware_backed(cli.hardware_backed);
    let services = host_services(&state_dir, cli.hardware_backed)?;
    let mut engine = Engine::new(&config, &services)?;

    match command {
        Commands::Encrypt { input, output } => match (input, output) {
            (Some(input), Some(output)) => file_ops::encrypt_file(&mut engine, &input, &output),
            (input, output) => {
                let plaintext = read_input(input.as_deref())?;
                let encoded = engine.encrypt(&plaintext)?;
                write_output(output.as_deref(), format!("{}\n", encoded).as_bytes())
            }
        },
        Commands::Decrypt { input, output } => match (input, output) {
            (Some(input), Some(output)) => file_ops::decrypt_file(&mut engine, &input, &output),
            (input, output) => {
                let encoded = read_input(input.as_deref())?;
                let encoded = String::from_utf8(encoded.to_vec()).map_err(|e| {
                    CompatError::with_source(
                        ErrorCategory::User,
                        ErrorKind::Io,
                        "input is not valid UTF-8",
                        e,
                    )
                })?;
                let plaintext = engine.decrypt(encoded.trim_end())?;
                write_output(output.as_deref(), &plaintext)
            }
        },
        Commands::Update { input, output } => file_ops::update_file(&mut engine, &input, &output),
        Commands::Tiers => {
            let keys: Vec<String> = engine.key_tiers().iter().map(|t| t.to_string()).collect();
            let ciphers: Vec<String> =
                engine.cipher_tiers().iter().map(|t| t.to_string()).collect();
            let report = format!(
                "platform: {}\nkey tiers: {}\ncipher tiers: {}\n",
                config.platform,
                keys.join(", "),
                ciphers.join(", ")
            );
            write_output(None, report.as_bytes())
        }
    }
}

fn host_services(state_dir: &Path, hardware_backed: bool) -> Result<HostServices> {
    std::fs::create_dir_all(state_dir).map_err(|e| {
        CompatError::with_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to create state directory {}", state_dir.display()),
            e,
        )
    })?;
    let preferences: Arc<dyn PreferenceStore> =
        Arc::new(FilePreferences::new(state_dir.join("preferences.json")));
    let key_entries: Arc<dyn PreferenceStore> =
        Arc::new(FilePreferences::new(state_dir.join("keystore.json")));
    let key_store = Arc::new(SoftwareKeyStore::new(key_entries).with_hardware(hardware_backed));
    Ok(HostServices::new(preferences, key_store))
}

fn usage_error(msg: &str) -> CompatError {
    CompatError::new(ErrorCategory::User, ErrorKind::InvalidConfig, msg)
}

fn read_input(path: Option<&Path>) -> Result<Zeroizing<Vec<u8>>> {
    let mut data = Zeroizing::new(Vec::new());
    let result = match path {
        Some(path) => std::fs::File::open(path).and_then(|mut f| f.read_to_end(&mut data)),
        None => io::stdin().read_to_end(&mut data),
    };
    result.map_err(|e| {
        CompatError::with_source(ErrorCategory::User, ErrorKind::Io, "failed to read input", e)
    })?;
    Ok(data)
}

fn write_output(path: Option<&Path>, data: &[u8]) -> Result<()> {
    if let Some(path) = path {
        return file_ops::write_file_secure(path, data);
    }
    let mut stdout = io::stdout().lock();
    stdout.write_all(data).and_then(|_| stdout.flush()).map_err(|e| {
        CompatError::with_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write output",
            e,
        )
    })
}
