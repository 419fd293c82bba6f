use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sitegate::auth::{AuthGate, CurrentUserQuery, Guarded, Navigator, RouteGuardSpec};
use sitegate::config::{ClientConfig, ConfigError, ConfigOverrides};
use sitegate::net::api::ApiClient;
use sitegate::net::types::{ApiError, SiteConfig};
use sitegate::query::{FocusManager, QueryCache};
use sitegate::site_config::ConfigCache;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid JSON value: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("stdin read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "sitegate", about = "Route gate and site-config cache client")]
struct Cli {
    #[arg(long, env = "SITEGATE_API_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "SITEGATE_SESSION_TOKEN")]
    session_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the current user and run the route gate for `path`.
    Access {
        #[arg(long)]
        role: Option<String>,
        #[arg(long, default_value = "/dashboard")]
        path: String,
    },
    /// Print the whole site config, or one key.
    Config {
        #[arg(long)]
        key: Option<String>,
    },
    /// Print exam categories, falling back to the built-in list.
    Categories,
    /// Write one key (value is JSON) and print the refreshed config.
    Set { key: String, value: String },
    /// Keep the config mounted; read `focus`, `blur`, `refetch`, `quit` from stdin.
    Watch,
}

/// Prints redirects instead of performing them.
struct StdoutNavigator;

impl Navigator for StdoutNavigator {
    fn navigate(&self, path: &str) {
        println!("redirect -> {path}");
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = ConfigOverrides { api_base_url: cli.base_url, session_token: cli.session_token };
    let config = ClientConfig::from_env_with(&overrides)?;

    let api = Arc::new(ApiClient::new(&config)?);
    info!(base_url = %api.base_url(), "sitegate client ready");
    let focus = FocusManager::new();

    match cli.command {
        Command::Access { role, path } => run_access(&config, api, &focus, role, &path).await,
        Command::Config { key } => run_config(&config, api, &focus, key).await,
        Command::Categories => run_categories(&config, api, &focus).await,
        Command::Set { key, value } => run_set(&config, api, &focus, &key, &value).await,
        Command::Watch => run_watch(&config, api, &focus).await,
    }
}

async fn run_access(
    config: &ClientConfig,
    api: Arc<ApiClient>,
    focus: &FocusManager,
    role: Option<String>,
    path: &str,
) -> Result<(), CliError> {
    let users = QueryCache::new("current-user", config.query_options(), focus);
    let mut query = CurrentUserQuery::mount(&users, api);
    let spec = match role {
        Some(role) => RouteGuardSpec::role(role),
        None => RouteGuardSpec::authenticated(),
    };
    let mut gate = AuthGate::new(spec, StdoutNavigator).with_login_path(&config.login_path);

    let state = query.resolved().await;
    if let Some(e) = query.error() {
        warn!(error = %e, "identity lookup failed; treating as signed out");
    }
    match gate.render(&state, || format!("render {path}")) {
        Guarded::Content(view) => println!("{view}"),
        Guarded::Denied => println!("permission denied: {path}"),
        Guarded::Loading => println!("loading"),
        Guarded::Redirecting => {}
    }
    Ok(())
}

async fn run_config(
    config: &ClientConfig,
    api: Arc<ApiClient>,
    focus: &FocusManager,
    key: Option<String>,
) -> Result<(), CliError> {
    let cache = ConfigCache::new(api, config.query_options(), focus);
    match key {
        Some(key) => {
            let mut view = cache.get_key(&key);
            let value = view.settled().await;
            report_error(view.error());
            match value {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("{key}: not set"),
            }
        }
        None => {
            let mut view = cache.get_all();
            let site = view.settled().await;
            report_error(view.error());
            print_config(&site)?;
        }
    }
    Ok(())
}

async fn run_categories(config: &ClientConfig, api: Arc<ApiClient>, focus: &FocusManager) -> Result<(), CliError> {
    let cache = ConfigCache::new(api, config.query_options(), focus);
    let mut view = cache.get_exam_categories();
    let categories = view.settled().await;
    report_error(view.error());
    for category in categories {
        println!("{category}");
    }
    Ok(())
}

async fn run_set(
    config: &ClientConfig,
    api: Arc<ApiClient>,
    focus: &FocusManager,
    key: &str,
    raw_value: &str,
) -> Result<(), CliError> {
    let value: Value = serde_json::from_str(raw_value)?;
    let cache = ConfigCache::new(api, config.query_options(), focus);
    let mut view = cache.get_all();
    view.settled().await;

    cache.set_key(key, value).await?;
    let site = view.settled().await;
    report_error(view.error());
    print_config(&site)?;
    Ok(())
}

async fn run_watch(config: &ClientConfig, api: Arc<ApiClient>, focus: &FocusManager) -> Result<(), CliError> {
    let cache = ConfigCache::new(api, config.query_options(), focus);
    let mut view = cache.get_all();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line?.as_deref().map(str::trim) {
                    Some("focus") => {
                        let started = focus.focus();
                        info!(started, "window focused");
                    }
                    Some("blur") => focus.blur(),
                    Some("refetch") => view.refetch(),
                    Some("quit") | None => break,
                    Some("") => {}
                    Some(other) => eprintln!("unknown command '{other}' (focus|blur|refetch|quit)"),
                }
            }
            site = view.changed() => {
                if !view.is_loading() {
                    report_error(view.error());
                    print_config(&site)?;
                    println!("categories: {}", site.exam_categories_or_default().join(", "));
                }
            }
        }
    }
    Ok(())
}

fn print_config(site: &SiteConfig) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(site)?);
    Ok(())
}

fn report_error(error: Option<ApiError>) {
    if let Some(e) = error {
        warn!(error = %e, "config read failed; showing defaults");
    }
}
