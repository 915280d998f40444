use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::info;
use tracing_subscriber::EnvFilter;

use picstash::auth::CredentialHasher;
use picstash::config::ServerConfig;
use picstash::identity::{IdentityStore, validate_username};
use picstash::server::{AppState, create_router};
use picstash::store::{SqliteStore, Store};
use picstash::types::Role;

const GENERATED_PASSWORD_LEN: usize = 20;

#[derive(Parser)]
#[command(name = "picstash")]
#[command(about = "A self-hosted image host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// TOML config file. Flags given on the command line override it.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database, uploads and backups
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Secret used to sign bearer tokens
        #[arg(long, env = "PICSTASH_SECRET_KEY", hide_env_values = true)]
        secret_key: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the data directory and create the first admin
    Init {
        /// Data directory for the database, uploads and backups
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Username of the first admin
        #[arg(long, default_value = "admin")]
        username: String,

        /// Password of the first admin. Prompted for when omitted.
        #[arg(long)]
        password: Option<String>,

        /// Skip interactive prompts and generate a password if none is given
        #[arg(long)]
        non_interactive: bool,
    },
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

fn prompt_password() -> anyhow::Result<String> {
    let password = inquire::Password::new("Admin password:")
        .with_validator(|input: &str| {
            if input.is_empty() {
                Ok(inquire::validator::Validation::Invalid(
                    "Password cannot be empty".into(),
                ))
            } else {
                Ok(inquire::validator::Validation::Valid)
            }
        })
        .prompt()?;
    Ok(password)
}

fn run_init(
    data_dir: PathBuf,
    username: String,
    password: Option<String>,
    non_interactive: bool,
) -> anyhow::Result<()> {
    validate_username(&username)?;

    let config = ServerConfig {
        data_dir,
        ..ServerConfig::default()
    };
    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    fs::create_dir_all(config.uploads_dir())?;
    fs::create_dir_all(config.backups_dir())?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    if store.has_admin()? {
        bail!(
            "Already initialized: an admin account exists in {}",
            config.db_path().display()
        );
    }

    let (password, generated) = match password {
        Some(password) => (password, false),
        None if non_interactive => (generate_password(), true),
        None => (prompt_password()?, false),
    };

    let identity = IdentityStore::new(Arc::new(store), CredentialHasher::default());
    let admin = identity.create(&username, &password, Role::Admin)?;

    println!();
    println!("========================================");
    println!("Created admin '{}' (id {})", admin.username, admin.id);
    if generated {
        println!();
        println!("Password (save this, it won't be shown again):");
        println!();
        println!("  {password}");
    }
    println!("========================================");
    println!();

    Ok(())
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    if !store.has_admin()? {
        bail!(
            "Server not initialized. Run 'picstash admin init' first to create an admin account."
        );
    }

    let state = Arc::new(AppState::new(&config, Arc::new(store))?);
    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("picstash=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                username,
                password,
                non_interactive,
            } => {
                run_init(data_dir, username, password, non_interactive)?;
            }
        },
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
            secret_key,
        } => {
            let mut config = match config {
                Some(path) => ServerConfig::from_file(&path)?,
                None => ServerConfig::default(),
            };
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            if secret_key.is_some() {
                config.secret_key = secret_key;
            }
            config.require_secret()?;

            run_serve(config).await?;
        }
    }

    Ok(())
}
