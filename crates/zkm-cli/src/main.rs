//! zkm: zkmart client CLI
//!
//! Session commands:
//!   session new --epoch N    - start an ephemeral session, print nonce + login URL
//!   session show             - show the stored session (public parts only)
//!   session destroy          - log out: clear the stored session
//!   attach --redirect URL    - bind the provider's id_token, print the address
//!   prove --redirect URL     - bind the token and fetch a proof from the prover
//!   address --sub S --aud A  - derive the account address for an identity
//!   salt reset               - forget the per-user salt
//!
//! Content commands:
//!   keygen                   - generate a content key pair
//!   seal --to PUB <in> <out> - encrypt a file for a buyer's public key
//!   open --key-file F <in> <out>
//!
//!   config show              - display the active configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zkm_auth::{oidc, AuthError, CredentialManager, HttpProver};
use zkm_core::config::ZkmConfig;
use zkm_crypto::{ContentKeyPair, ContentPublicKey, ContentSecretKey, EncryptedPayload};
use zkm_secrets::SecretStore;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "zkm",
    version,
    about = "zkmart marketplace client",
    long_about = "zkm: ephemeral-key login sessions, account addresses, and purchased-content encryption"
)]
struct Cli {
    /// Path to zkm.toml configuration file
    #[arg(long, short = 'c', env = "ZKM_CONFIG", default_value = "~/.config/zkm/zkm.toml")]
    config: PathBuf,

    /// Log level or filter directive (overrides [logging].level)
    #[arg(long, env = "ZKM_LOG")]
    log: Option<String>,

    /// Log output format (overrides [logging].format)
    #[arg(long, env = "ZKM_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ephemeral session lifecycle
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Bind the identity token from the provider redirect to the stored session
    Attach {
        /// Full redirect URL (id_token in fragment or query)
        #[arg(long)]
        redirect: String,
    },

    /// Bind the identity token and request a proof for the stored session
    Prove {
        #[arg(long)]
        redirect: String,
    },

    /// Derive the account address for an identity under the stored salt
    Address {
        /// Subject claim (`sub`)
        #[arg(long)]
        sub: String,
        /// Audience claim (`aud`, the OAuth client id); defaults to oidc.client_id
        #[arg(long)]
        aud: Option<String>,
    },

    /// Per-user salt management
    Salt {
        #[command(subcommand)]
        action: SaltAction,
    },

    /// Generate a content key pair (X25519)
    Keygen {
        /// Write the secret key (hex) to this file instead of stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Encrypt a file so only the holder of the given public key can read it
    Seal {
        /// Recipient content public key (hex)
        #[arg(long)]
        to: String,
        input: PathBuf,
        output: PathBuf,
    },

    /// Decrypt a sealed payload with a content secret key
    Open {
        /// File holding the content secret key (hex)
        #[arg(long, env = "ZKM_CONTENT_KEY_FILE")]
        key_file: PathBuf,
        input: PathBuf,
        output: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    /// Start a new session valid through epoch + session.validity_window_epochs
    New {
        /// Current ledger epoch
        #[arg(long)]
        epoch: u64,
        /// Opaque OAuth `state` value echoed back by the provider
        #[arg(long)]
        state: Option<String>,
    },

    /// Show the stored session; with --epoch, also check expiry
    Show {
        #[arg(long)]
        epoch: Option<u64>,
    },

    /// Clear the stored session
    Destroy,
}

#[derive(Subcommand, Debug)]
enum SaltAction {
    /// Delete the salt; the next session derives a new address
    Reset {
        /// Confirm the address change
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = zkm_secrets::expand_tilde(&cli.config);
    let config = ZkmConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = match cli.log_format {
        Some(format) => format,
        None if config.logging.format.eq_ignore_ascii_case("json") => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, format);

    match cli.command {
        Commands::Session { action } => match action {
            SessionAction::New { epoch, state } => cmd_session_new(&config, epoch, state.as_deref()),
            SessionAction::Show { epoch } => cmd_session_show(&config, epoch),
            SessionAction::Destroy => cmd_session_destroy(&config),
        },
        Commands::Attach { redirect } => cmd_attach(&config, &redirect),
        Commands::Prove { redirect } => cmd_prove(&config, &redirect).await,
        Commands::Address { sub, aud } => cmd_address(&config, &sub, aud.as_deref()),
        Commands::Salt {
            action: SaltAction::Reset { yes },
        } => cmd_salt_reset(&config, yes),
        Commands::Keygen { out } => cmd_keygen(out.as_deref()),
        Commands::Seal { to, input, output } => cmd_seal(&to, &input, &output),
        Commands::Open {
            key_file,
            input,
            output,
        } => cmd_open(&key_file, &input, &output),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output; logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn credential_manager(config: &ZkmConfig) -> Result<CredentialManager> {
    let store: Arc<dyn SecretStore> = zkm_secrets::build_store(&config.store)
        .context("opening secret store")?
        .into();
    Ok(CredentialManager::from_config(store, &config.session))
}

// ── `zkm session` ─────────────────────────────────────────────────────────────

fn cmd_session_new(config: &ZkmConfig, epoch: u64, state: Option<&str>) -> Result<()> {
    if config.store.backend == "memory" {
        tracing::warn!("memory store selected: the session will not survive this process");
    }
    let manager = credential_manager(config)?;
    let session = manager.create_session(epoch)?;
    let nonce = session.nonce();

    println!("max epoch:  {}", session.max_epoch());
    println!("nonce:      {nonce}");
    match oidc::authorization_url(&config.oidc, &nonce, state) {
        Ok(url) => println!("login URL:  {url}"),
        Err(e) => println!("login URL:  unavailable ({e})"),
    }
    Ok(())
}

fn cmd_session_show(config: &ZkmConfig, epoch: Option<u64>) -> Result<()> {
    let manager = credential_manager(config)?;
    let session = match epoch {
        Some(current) => manager.load_active_session(current)?,
        None => manager.load_session()?,
    };
    println!("public key: 0x{}", hex::encode(session.public_key().as_bytes()));
    println!("max epoch:  {}", session.max_epoch());
    println!("nonce:      {}", session.nonce());
    if let Some(current) = epoch {
        println!(
            "remaining:  {} epoch(s)",
            session.max_epoch().saturating_sub(current)
        );
    }
    Ok(())
}

fn cmd_session_destroy(config: &ZkmConfig) -> Result<()> {
    credential_manager(config)?.destroy_session();
    println!("session cleared");
    Ok(())
}

// ── `zkm attach` / `zkm prove` ────────────────────────────────────────────────

fn attach_from_redirect(
    manager: &CredentialManager,
    redirect: &str,
) -> Result<zkm_auth::EphemeralSession> {
    let mut session = manager.load_session()?;
    // a bad redirect URL is retryable; only a token bound elsewhere kills the session
    let token = oidc::token_from_redirect(redirect)?;
    if let Err(e) = session.attach_token(token) {
        manager.destroy_session();
        tracing::warn!("session discarded; run `zkm session new` to log in again");
        return Err(AuthError::from(e).into());
    }
    if let Some(address) = session.derived_address() {
        tracing::info!(%address, "identity token attached");
    }
    Ok(session)
}

fn cmd_attach(config: &ZkmConfig, redirect: &str) -> Result<()> {
    let manager = credential_manager(config)?;
    let session = attach_from_redirect(&manager, redirect)?;
    let address = session
        .derived_address()
        .context("token attached but no address derived")?;
    println!("address:    {address}");
    Ok(())
}

async fn cmd_prove(config: &ZkmConfig, redirect: &str) -> Result<()> {
    let manager = credential_manager(config)?;
    let session = attach_from_redirect(&manager, redirect)?;
    let prover = HttpProver::from_config(&config.prover)?;
    tracing::info!(url = prover.url(), "contacting proof service");

    let proof = zkm_auth::request_proof(&prover, &session).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&proof).context("rendering proof")?
    );
    Ok(())
}

// ── `zkm address` / `zkm salt` ────────────────────────────────────────────────

fn cmd_address(config: &ZkmConfig, sub: &str, aud: Option<&str>) -> Result<()> {
    let aud = aud
        .filter(|a| !a.is_empty())
        .or_else(|| Some(config.oidc.client_id.as_str()).filter(|a| !a.is_empty()))
        .context("no audience: pass --aud or set oidc.client_id in config")?;
    let manager = credential_manager(config)?;
    let salt = manager.load_or_create_salt()?;
    println!("{}", zkm_auth::derive_address(salt.expose_secret(), sub, aud));
    Ok(())
}

fn cmd_salt_reset(config: &ZkmConfig, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!(
            "resetting the salt changes every derived address; re-run with --yes to confirm"
        );
    }
    let manager = credential_manager(config)?;
    manager.destroy_session();
    manager.reset_salt()?;
    println!("salt cleared");
    Ok(())
}

// ── content commands ──────────────────────────────────────────────────────────

fn cmd_keygen(out: Option<&Path>) -> Result<()> {
    let pair = ContentKeyPair::generate();
    let secret_hex = pair.secret.to_hex();
    match out {
        Some(path) => {
            write_private(path, secret_hex.as_bytes())
                .with_context(|| format!("writing secret key: {}", path.display()))?;
            eprintln!("secret key written to {}", path.display());
        }
        None => println!("secret:     {}", secret_hex.as_str()),
    }
    println!("public:     {}", pair.public.to_hex());
    Ok(())
}

fn cmd_seal(to: &str, input: &Path, output: &Path) -> Result<()> {
    let recipient = ContentPublicKey::from_hex(to).context("parsing --to public key")?;
    let plaintext =
        std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let payload = zkm_crypto::encrypt(&plaintext, &recipient)?;
    std::fs::write(output, payload.to_bytes()?)
        .with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(
        bytes = plaintext.len(),
        output = %output.display(),
        "sealed content"
    );
    Ok(())
}

fn cmd_open(key_file: &Path, input: &Path, output: &Path) -> Result<()> {
    let key_hex = zeroize::Zeroizing::new(
        std::fs::read_to_string(key_file)
            .with_context(|| format!("reading key file {}", key_file.display()))?,
    );
    let secret = ContentSecretKey::from_hex(key_hex.trim()).context("parsing content secret key")?;
    let sealed = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let payload = EncryptedPayload::from_bytes(&sealed)
        .with_context(|| format!("parsing sealed payload {}", input.display()))?;

    let plaintext = zeroize::Zeroizing::new(zkm_crypto::decrypt(&payload, &secret)?);
    std::fs::write(output, plaintext.as_slice())
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

// ── `zkm config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &ZkmConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_session_new() {
        let cli = Cli::try_parse_from(["zkm", "session", "new", "--epoch", "41"]).unwrap();
        match cli.command {
            Commands::Session {
                action: SessionAction::New { epoch, state },
            } => {
                assert_eq!(epoch, 41);
                assert!(state.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_log_format_flag() {
        let cli = Cli::try_parse_from(["zkm", "--log-format", "json", "config", "show"]).unwrap();
        assert_eq!(cli.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn test_seal_open_files() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("buyer.key");
        let pair = ContentKeyPair::generate();
        write_private(&key_path, pair.secret.to_hex().as_bytes()).unwrap();

        let input = dir.path().join("track.flac");
        let sealed = dir.path().join("track.sealed");
        let opened = dir.path().join("track.out");
        std::fs::write(&input, vec![0x5Au8; 4096]).unwrap();

        cmd_seal(&pair.public.to_hex(), &input, &sealed).unwrap();
        assert_ne!(std::fs::read(&sealed).unwrap(), std::fs::read(&input).unwrap());

        cmd_open(&key_path, &sealed, &opened).unwrap();
        assert_eq!(std::fs::read(&opened).unwrap(), vec![0x5Au8; 4096]);
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("other.key");
        write_private(&key_path, ContentKeyPair::generate().secret.to_hex().as_bytes()).unwrap();

        let input = dir.path().join("in");
        let sealed = dir.path().join("sealed");
        std::fs::write(&input, b"cover art").unwrap();
        cmd_seal(&ContentKeyPair::generate().public.to_hex(), &input, &sealed).unwrap();

        assert!(cmd_open(&key_path, &sealed, &dir.path().join("out")).is_err());
        assert!(!dir.path().join("out").exists());
    }

    fn file_store_config(dir: &Path) -> ZkmConfig {
        let mut config = ZkmConfig::default();
        config.store.dir = dir.to_path_buf();
        config
    }

    #[test]
    fn test_attach_keeps_session_on_bad_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_store_config(dir.path());
        let manager = credential_manager(&config).unwrap();
        let nonce = manager.create_session(3).unwrap().nonce();

        let err = attach_from_redirect(&manager, "https://app.example/callback#state=x")
            .unwrap_err();
        assert!(err.to_string().contains("no identity token"), "got: {err}");
        assert_eq!(manager.load_session().unwrap().nonce(), nonce);

        let err = attach_from_redirect(&manager, "https://app.example/callback#id_token=garbage")
            .unwrap_err();
        assert!(err.to_string().contains("invalid identity token"), "got: {err}");
        assert_eq!(manager.load_session().unwrap().nonce(), nonce);
    }

    #[test]
    fn test_attach_discards_session_on_nonce_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_store_config(dir.path());
        let manager = credential_manager(&config).unwrap();
        manager.create_session(3).unwrap();

        let jwt = zkm_auth::jwt::encode_unsigned(&serde_json::json!({
            "sub": "user-1", "aud": "client-1", "nonce": "someone-elses-nonce"
        }));
        let redirect = format!("https://app.example/callback#id_token={jwt}");
        let err = attach_from_redirect(&manager, &redirect).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuthError>(),
            Some(AuthError::Binding(_))
        ));
        assert!(matches!(manager.load_session(), Err(AuthError::SessionInvalid(_))));
    }

    #[test]
    fn test_attach_binds_matching_token() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_store_config(dir.path());
        let manager = credential_manager(&config).unwrap();
        let nonce = manager.create_session(3).unwrap().nonce();

        let jwt = zkm_auth::jwt::encode_unsigned(&serde_json::json!({
            "sub": "user-1", "aud": "client-1", "nonce": nonce
        }));
        let redirect = format!("https://app.example/callback?id_token={jwt}&state=s");
        let session = attach_from_redirect(&manager, &redirect).unwrap();
        assert!(session.derived_address().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_keygen_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.key");
        cmd_keygen(Some(&path)).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(ContentSecretKey::from_hex(std::fs::read_to_string(&path).unwrap().trim()).is_ok());
    }
}
