//! 客户端会话工具
//!
//! 以前端外壳的方式登录网关，并把会话持久化到本地文件。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use icu_auth_core::{
    AuthorizationGate, CookiePolicy, FileCredentialStore, HttpAuthenticator, LoginCredentials,
    RouteTable, SessionStore, default_path, sign_in,
};
use icu_common::RetryConfig;
use icu_config::AppConfig;
use icu_telemetry::init_from_config;

#[derive(Debug, Parser)]
#[command(name = "icu-session")]
#[command(about = "Sign in to the ICU reserve gateway and inspect the persisted session")]
struct Cli {
    /// 配置目录
    #[arg(long, default_value = "config")]
    config_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sign in and persist the session
    Login {
        /// Account email
        email: String,
        /// Account password
        password: String,
    },
    /// Clear the persisted session
    Logout,
    /// Show the signed-in role and its home page
    Status,
    /// Evaluate a page path for the current session
    Navigate {
        /// Page path, e.g. /nurse
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config_dir)?;
    init_from_config(&config.telemetry);

    let policy = CookiePolicy::new(
        config.session.token_ttl_days,
        config.cookie_secure(),
        config.session.same_site,
    )?;
    let storage = Arc::new(FileCredentialStore::new(&config.session.storage_path));
    let store = SessionStore::restore(storage, policy);

    match cli.command {
        Commands::Login { email, password } => {
            let authenticator = HttpAuthenticator::new(
                &config.auth.api_base_url,
                Duration::from_secs(config.auth.timeout_secs),
                RetryConfig::new(
                    config.auth.max_attempts,
                    Duration::from_millis(200),
                    Duration::from_secs(2),
                ),
            )?;
            let credentials = LoginCredentials::new(email, password);
            let signed_in = sign_in(&store, &authenticator, &credentials)
                .await
                .context("sign-in failed")?;
            println!("signed in as {}, landing on {}", signed_in.role, signed_in.landing_path);
        }
        Commands::Logout => {
            store.logout();
            println!("signed out");
        }
        Commands::Status => match store.session().role() {
            Some(role) => println!("signed in as {} (home {})", role, default_path(role)),
            None => println!("anonymous"),
        },
        Commands::Navigate { path } => {
            let navigation = RouteTable::hospital().navigate(&AuthorizationGate::new(), &store.session(), &path);
            println!("{}", serde_json::to_string(&navigation)?);
        }
    }

    Ok(())
}
