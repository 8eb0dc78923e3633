// ABOUTME: CLI entry point for signing Triton API requests.
// ABOUTME: Dispatches to header, sign-raw, fingerprint and agent-keys subcommands.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::Level;
use triton_auth::{
    rfc1123_date, AgentClient, AuthConfig, AuthError, AuthSettings, KeyMaterial, KeySource,
    PrivateKeySigner, RawSigner,
};

#[derive(Parser)]
#[command(name = "triton-sign")]
#[command(about = "Sign Triton cloud API requests with an SSH key")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    auth: AuthArgs,

    /// Log signer activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for values otherwise taken from the environment or auth.toml.
#[derive(Args)]
struct AuthArgs {
    /// Account login name
    #[arg(long, global = true)]
    account: Option<String>,

    /// Sub-user login name
    #[arg(long, global = true)]
    user: Option<String>,

    /// MD5 fingerprint of the signing key
    #[arg(long, global = true)]
    key_id: Option<String>,

    /// Private key file (when unset the SSH agent signs)
    #[arg(long, global = true)]
    key_file: Option<PathBuf>,

    /// SSH agent socket path
    #[arg(long, global = true)]
    agent_socket: Option<PathBuf>,
}

impl AuthArgs {
    fn into_settings(self) -> AuthSettings {
        AuthSettings {
            account: self.account,
            user: self.user,
            key_id: self.key_id,
            key_material: self.key_file,
            agent_socket: self.agent_socket,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the date and Authorization headers for a request
    Header {
        /// Date header value to sign (defaults to now, RFC 1123)
        #[arg(long)]
        date: Option<String>,
    },

    /// Sign an arbitrary string with a private key file
    SignRaw {
        /// Data to sign
        data: String,
    },

    /// Print the MD5 fingerprint of a private key file
    Fingerprint {
        /// Private key file
        file: PathBuf,
    },

    /// List keys held by the SSH agent
    AgentKeys,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        triton_log::init_for("triton_auth", Level::DEBUG);
    } else {
        triton_log::init(Level::WARN);
    }

    let overrides = cli.auth.into_settings();
    match cli.command {
        Commands::Header { date } => run_header(overrides, date),
        Commands::SignRaw { data } => run_sign_raw(overrides, &data),
        Commands::Fingerprint { file } => run_fingerprint(&file),
        Commands::AgentKeys => run_agent_keys(overrides),
    }
}

fn run_header(overrides: AuthSettings, date: Option<String>) -> Result<()> {
    let config = AuthConfig::load(overrides).context("failed to load credentials")?;
    let signer = config.build_signer().context("failed to create signer")?;

    let date = date.unwrap_or_else(|| rfc1123_date(Utc::now()));
    let authorization = signer.sign(&date).context("failed to sign date header")?;

    println!("date: {date}");
    println!("authorization: {authorization}");
    Ok(())
}

fn run_sign_raw(overrides: AuthSettings, data: &str) -> Result<()> {
    let config = AuthConfig::load(overrides).context("failed to load credentials")?;
    let KeySource::File(path) = &config.key_source else {
        bail!("sign-raw needs a private key file (--key-file or TRITON_KEY_MATERIAL)");
    };

    let key = KeyMaterial::from_file(path)?;
    let signer = PrivateKeySigner::from_key_material(
        &config.key_id,
        key,
        &config.account,
        config.user.as_deref(),
    )
    .context("failed to create signer")?;

    let raw = signer.sign_raw(data).context("failed to sign data")?;
    println!("algorithm: {}", raw.algorithm);
    println!("signature: {}", raw.signature);
    Ok(())
}

fn run_fingerprint(file: &Path) -> Result<()> {
    let key = KeyMaterial::from_file(file)?;
    let fingerprint = key.fingerprint();

    println!("{} {}", key.kind(), fingerprint.display());
    println!("compact: {}", fingerprint.compact());
    Ok(())
}

fn run_agent_keys(overrides: AuthSettings) -> Result<()> {
    let settings = overrides.or(AuthSettings::from_env());
    let socket = settings.agent_socket.ok_or(AuthError::AgentUnavailable)?;

    let mut client = AgentClient::connect(&socket)?;
    let identities = client
        .list_identities()
        .context("failed to list agent keys")?;

    if identities.is_empty() {
        println!("The agent has no keys.");
        return Ok(());
    }

    for identity in identities {
        println!(
            "{} {} {}",
            identity.fingerprint().display(),
            identity.key_type().as_deref().unwrap_or("unknown"),
            identity.comment
        );
    }
    Ok(())
}
