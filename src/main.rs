use anyhow::Result;
use clap::{Parser, Subcommand};
use oaproxy_auth::{OAuthClient, OAuthSettings, PkceSession};
use oaproxy_config::Config;
use oaproxy_server::AppState;
use oaproxy_store::FileTokenStore;
use oaproxy_types::TokenStore;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "oaproxy",
    about = "oaproxy — OpenAI-compatible gateway for Anthropic OAuth credentials"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway server.
    Serve {
        /// Path to a JSON configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Override the loopback listen port (default: 8081).
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Log in to Anthropic with the OAuth PKCE flow.
    Login {
        /// Path to a JSON configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Remove the stored credential.
    Logout {
        /// Path to a JSON configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Show credential status without exposing secrets.
    Status {
        /// Path to a JSON configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => cmd_serve(config, port).await,
        Commands::Login { config } => cmd_login(config).await,
        Commands::Logout { config } => cmd_logout(config).await,
        Commands::Status { config } => cmd_status(config).await,
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    Ok(Config::load(path.as_deref())?)
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_serve(config_path: Option<PathBuf>, port: Option<u16>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.port = port;
    }
    init_tracing(&config.log_level);

    // Loopback only; the gateway performs no inbound authentication.
    let addr = format!("127.0.0.1:{}", config.port);
    let store = Arc::new(FileTokenStore::new(&config.token_file));
    let state = AppState::new(config, store)?;
    let app = oaproxy_server::make_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "oaproxy listening");
    eprintln!("oaproxy listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn cmd_login(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let oauth = OAuthClient::new(
        reqwest::Client::new(),
        OAuthSettings {
            auth_base: config.auth_base.clone(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scope: config.scope.clone(),
        },
    );

    let session = PkceSession::generate();
    let url = oauth.authorize_url(&session);
    eprintln!("Opening browser: {url}");
    if let Err(e) = open::that(&url) {
        eprintln!("Failed to open browser automatically: {e}");
        eprintln!("Open the URL above manually to continue.");
    }

    eprint!("Paste the authorization code (looks like code#state): ");
    std::io::stderr().flush()?;
    let mut pasted = String::new();
    std::io::stdin().read_line(&mut pasted)?;

    let credential = oauth.exchange(&session, pasted.trim()).await?;
    let store = FileTokenStore::new(&config.token_file);
    store.save(&credential).await?;
    eprintln!(
        "Login successful; credential saved to {}",
        store.path().display()
    );
    Ok(())
}

async fn cmd_logout(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = FileTokenStore::new(&config.token_file);
    store.clear().await?;
    eprintln!("Logged out");
    Ok(())
}

async fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = FileTokenStore::new(&config.token_file);
    match store.load().await {
        Ok(None) => println!("no credential stored; run `oaproxy login`"),
        Ok(Some(credential)) => {
            let expires =
                chrono::DateTime::<chrono::Utc>::from_timestamp(credential.expires_at as i64, 0)
                    .map_or_else(|| credential.expires_at.to_string(), |dt| dt.to_rfc3339());
            if credential.is_expired() {
                println!("credential present but expired (expired at {expires})");
            } else {
                println!("credential present, valid until {expires}");
            }
        }
        Err(e) => println!("credential store unreadable: {e}"),
    }
    Ok(())
}
