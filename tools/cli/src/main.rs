//! LanVault CLI - command line interface for a device vault.
//!
//! `unlock` remembers the master key in the OS keystore so later commands
//! run without a prompt until `logout`. The master password is read from
//! `LANVAULT_PASSWORD` when set, otherwise prompted for.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use lanvault_common::EntryId;
use lanvault_storage::LocalProvider;
use lanvault_sync::discovery::MdnsBrowser;
use lanvault_sync::{SyncClientConfig, SyncOutcome, SyncService};
use lanvault_vault::{
    KeyStore, MemoryKeyStore, NewEntry, OsKeyStore, Validity, VaultManager, VaultOperations,
    VaultSession, VaultStore,
};

const PASSWORD_ENV: &str = "LANVAULT_PASSWORD";

#[derive(Parser)]
#[command(name = "lanvault")]
#[command(about = "LanVault - Local password vault with LAN sync")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding vault.json (default: <data dir>/lanvault).
    #[arg(long, env = "LANVAULT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Do not remember keys or sync settings in the OS keystore.
    #[arg(long)]
    no_keystore: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault.
    Init,

    /// Unlock the vault and remember the key until logout.
    Unlock,

    /// Forget the remembered key.
    Logout,

    /// List entries.
    List {
        /// Only show entries whose validity has run out.
        #[arg(long)]
        expired: bool,
    },

    /// Add an entry. The entry password is prompted for.
    Add {
        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        username: String,

        /// Months until the entry expires, or "infinite".
        #[arg(long)]
        validity: Option<String>,
    },

    /// Print the decrypted password of an entry.
    Show {
        /// Entry id.
        id: String,
    },

    /// Replace an entry's fields. Omitted fields keep their value.
    Update {
        /// Entry id.
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        username: Option<String>,

        /// Months until the entry expires, or "infinite".
        #[arg(long)]
        validity: Option<String>,

        /// Prompt for a new password.
        #[arg(long)]
        password: bool,
    },

    /// Delete an entry.
    Delete {
        /// Entry id.
        id: String,
    },

    /// Synchronize with a LanVault sync host.
    #[command(subcommand)]
    Sync(SyncCommands),
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Look for a sync host on the local network.
    Discover {
        /// Browse timeout in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },

    /// Set the host URL and token.
    Configure {
        #[arg(long)]
        url: String,

        #[arg(long, env = "LANVAULT_SYNC_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Check that the host is reachable.
    Test,

    /// Show the host's current version.
    Status,

    /// Replace the local vault with the host's copy.
    Pull,

    /// Upload the local vault to the host.
    Push,

    /// List the snapshots kept by the host.
    Versions,
}

/// Everything a command needs for one device vault.
struct Device {
    data_dir: PathBuf,
    manager: VaultManager,
    sync: SyncService,
}

impl Device {
    fn open(
        data_dir: Option<PathBuf>,
        no_keystore: bool,
        settings: SyncClientConfig,
    ) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => dirs::data_dir()
                .context("No data directory on this platform, pass --data-dir")?
                .join("lanvault"),
        };

        let provider = LocalProvider::new(&data_dir)
            .with_context(|| format!("Failed to open {}", data_dir.display()))?;
        let store = Arc::new(VaultStore::at_root(Arc::new(provider))?);

        let keystore: Arc<dyn KeyStore> = if no_keystore {
            Arc::new(MemoryKeyStore::new())
        } else {
            Arc::new(OsKeyStore::new())
        };

        let sync = SyncService::new(settings, store.clone(), Some(keystore.clone()))
            .context("Failed to set up sync client")?;
        Ok(Self {
            data_dir,
            manager: VaultManager::with_keystore(store, keystore),
            sync,
        })
    }

    fn ops(&self) -> VaultOperations<'_> {
        VaultOperations::new(self.manager.store())
    }

    /// Unlock with the remembered key, or fall back to the master password.
    async fn session(&self) -> Result<VaultSession> {
        if !self.manager.exists().await? {
            anyhow::bail!("No vault found, run `lanvault init` first");
        }

        match self.manager.unlock_from_keystore().await {
            Ok(Some(session)) => return Ok(session),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Keystore unavailable"),
        }

        let password = master_password("Master password: ")?;
        self.manager
            .unlock(&password)
            .await
            .context("Failed to unlock vault")
    }

    /// Restore saved sync settings into the client.
    fn load_sync_config(&self) -> Result<()> {
        outcome(self.sync.load_config()).context("Run `lanvault sync configure` first")?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut settings = SyncClientConfig::default();
    if let Commands::Sync(SyncCommands::Discover { timeout_ms }) = &cli.command {
        settings.discovery_timeout = Duration::from_millis(*timeout_ms);
    }
    let device = Device::open(cli.data_dir, cli.no_keystore, settings)?;

    match cli.command {
        Commands::Init => cmd_init(&device).await,
        Commands::Unlock => cmd_unlock(&device).await,
        Commands::Logout => cmd_logout(&device),
        Commands::List { expired } => cmd_list(&device, expired).await,
        Commands::Add {
            title,
            username,
            validity,
        } => cmd_add(&device, title, username, validity.as_deref()).await,
        Commands::Show { id } => cmd_show(&device, &id).await,
        Commands::Update {
            id,
            title,
            username,
            validity,
            password,
        } => cmd_update(&device, &id, title, username, validity.as_deref(), password).await,
        Commands::Delete { id } => cmd_delete(&device, &id).await,
        Commands::Sync(command) => cmd_sync(&device, command).await,
    }
}

/// Master password from the environment, or a prompt.
fn master_password(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(Zeroizing::new(password));
    }
    prompt_password(prompt)
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

fn parse_id(id: &str) -> Result<EntryId> {
    EntryId::new(id).context("Invalid entry id")
}

fn parse_validity(value: Option<&str>) -> Result<Option<Validity>> {
    value
        .map(Validity::parse)
        .transpose()
        .context("Invalid validity")
}

/// Turn a sync outcome into a result carrying the host's message.
fn outcome<T>(outcome: SyncOutcome<T>) -> Result<T> {
    outcome.into_result().map_err(anyhow::Error::msg)
}

/// Create a new vault.
async fn cmd_init(device: &Device) -> Result<()> {
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => Zeroizing::new(password),
        Err(_) => {
            let password = prompt_password("New master password: ")?;
            let confirm = prompt_password("Confirm master password: ")?;
            if *password != *confirm {
                anyhow::bail!("Passwords do not match");
            }
            password
        }
    };

    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    device
        .manager
        .init(&password)
        .await
        .context("Failed to create vault")?;

    println!("Vault created in {}", device.data_dir.display());
    Ok(())
}

/// Unlock and remember the key.
async fn cmd_unlock(device: &Device) -> Result<()> {
    let password = master_password("Master password: ")?;
    device
        .manager
        .unlock(&password)
        .await
        .context("Failed to unlock vault")?;

    println!("Vault unlocked.");
    Ok(())
}

/// Forget the remembered key.
fn cmd_logout(device: &Device) -> Result<()> {
    let mut session = VaultSession::locked();
    device
        .manager
        .logout(&mut session)
        .context("Failed to clear remembered key")?;

    println!("Vault locked.");
    Ok(())
}

/// List entries.
async fn cmd_list(device: &Device, expired_only: bool) -> Result<()> {
    let session = device.session().await?;
    let now = chrono::Utc::now();

    let entries = if expired_only {
        device.ops().expired_entries(&session, now).await?
    } else {
        device.ops().list_entries(&session).await?
    }
    .context("Vault is locked")?;

    if entries.is_empty() {
        println!("No entries.");
        return Ok(());
    }

    for entry in entries {
        let expiry = match entry.expires_at() {
            Some(at) if at <= now => format!("expired {}", at.format("%Y-%m-%d")),
            Some(at) => format!("expires {}", at.format("%Y-%m-%d")),
            None => "no expiry".to_string(),
        };
        println!(
            "{}  {:<24} {:<24} ({})",
            entry.id, entry.title, entry.username, expiry
        );
    }

    Ok(())
}

/// Add an entry.
async fn cmd_add(
    device: &Device,
    title: String,
    username: String,
    validity: Option<&str>,
) -> Result<()> {
    let validity = parse_validity(validity)?;
    let session = device.session().await?;

    let password = prompt_password("Entry password: ")?;
    let mut entry = NewEntry::new(title, username, password.as_str());
    if let Some(validity) = validity {
        entry = entry.with_validity(validity);
    }

    let id = device
        .ops()
        .add_entry(&session, entry)
        .await
        .context("Failed to add entry")?
        .context("Vault is locked")?;

    info!(id = %id, "Entry added");
    println!("Entry added: {}", id);
    Ok(())
}

/// Reveal an entry's password.
async fn cmd_show(device: &Device, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let session = device.session().await?;

    let password = device
        .ops()
        .reveal_password(&session, &id)
        .await
        .context("Failed to decrypt entry")?
        .context("Vault is locked")?;

    println!("{}", password.as_str());
    Ok(())
}

/// Update an entry.
async fn cmd_update(
    device: &Device,
    id: &str,
    title: Option<String>,
    username: Option<String>,
    validity: Option<&str>,
    new_password: bool,
) -> Result<()> {
    let id = parse_id(id)?;
    let validity = parse_validity(validity)?;
    let session = device.session().await?;
    let ops = device.ops();

    let current = ops
        .list_entries(&session)
        .await?
        .context("Vault is locked")?
        .into_iter()
        .find(|e| e.id == id)
        .with_context(|| format!("Entry not found: {}", id))?;

    let password = if new_password {
        prompt_password("New entry password: ")?
    } else {
        ops.reveal_password(&session, &id)
            .await
            .context("Failed to decrypt entry")?
            .context("Vault is locked")?
    };

    let mut entry = NewEntry::new(
        title.unwrap_or(current.title),
        username.unwrap_or(current.username),
        password.as_str(),
    );
    if let Some(validity) = validity {
        entry = entry.with_validity(validity);
    }

    if !ops.update_entry(&session, &id, entry).await? {
        anyhow::bail!("Entry not found: {}", id);
    }

    println!("Entry updated: {}", id);
    Ok(())
}

/// Delete an entry.
async fn cmd_delete(device: &Device, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let session = device.session().await?;

    if !device.ops().delete_entry(&session, &id).await? {
        anyhow::bail!("Entry not found: {}", id);
    }

    println!("Entry deleted: {}", id);
    Ok(())
}

async fn cmd_sync(device: &Device, command: SyncCommands) -> Result<()> {
    match command {
        SyncCommands::Discover { .. } => cmd_sync_discover(device).await,
        SyncCommands::Configure { url, token } => cmd_sync_configure(device, &url, token),
        SyncCommands::Test => {
            device.load_sync_config()?;
            let health = outcome(device.sync.test_connection().await)?;
            println!(
                "Connected to {} {} ({})",
                health.data.service, health.data.version, health.data.status
            );
            Ok(())
        }
        SyncCommands::Status => {
            device.load_sync_config()?;
            let status = outcome(device.sync.status().await)?;
            match status.timestamp {
                Some(at) => println!("Host version {} ({})", status.version_code, at),
                None => println!("Host version {}", status.version_code),
            }
            Ok(())
        }
        SyncCommands::Pull => {
            device.load_sync_config()?;
            let mut session = device.session().await?;
            let pulled = outcome(device.sync.pull(&mut session).await)?;
            println!("Pulled {} ({} entries).", pulled.version_code, pulled.entries);
            if pulled.unlock_required {
                println!("The pulled vault uses another password; run `unlock` with it.");
            }
            Ok(())
        }
        SyncCommands::Push => {
            device.load_sync_config()?;
            let session = device.session().await?;
            let pushed = outcome(device.sync.push(&session).await)?;
            println!("Pushed as {}", pushed.version_code);
            Ok(())
        }
        SyncCommands::Versions => {
            device.load_sync_config()?;
            let versions = outcome(device.sync.list_versions().await)?.versions;
            if versions.is_empty() {
                println!("Host holds no vault.");
            }
            for v in versions {
                let when = v.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default();
                println!("[{}] {:<8} {:<8} {}", v.index, v.label, v.version_code, when);
            }
            Ok(())
        }
    }
}

/// Browse the local network for a sync host.
async fn cmd_sync_discover(device: &Device) -> Result<()> {
    let browser = MdnsBrowser::new().context("Failed to start local-network discovery")?;

    match outcome(device.sync.discover(&browser).await)?.host {
        Some(host) => {
            println!("Found {} at {}", host.name, host.url);
            println!("Run `lanvault sync configure --url {}` to use it.", host.url);
        }
        None => println!("No sync host found."),
    }
    Ok(())
}

/// Save host URL and token.
fn cmd_sync_configure(device: &Device, url: &str, token: Option<String>) -> Result<()> {
    let token = match token {
        Some(token) => Zeroizing::new(token),
        None => prompt_password("Sync token: ")?,
    };

    outcome(device.sync.save_config(url, &token)).context("Failed to save sync config")?;
    println!("Sync host set to {}", device.sync.client().config().host_url.unwrap_or_default());
    Ok(())
}
