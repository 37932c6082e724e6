//! Seletivo session client - Main Entry Point
//!
//! Signs in to the back-office API, keeps the session refreshed and sends
//! authenticated requests from the terminal.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use seletivo_app::{GetOutcome, SessionContext};
use seletivo_application::{ClearReason, RefreshOutcome};
use seletivo_domain::GuardDecision;
use seletivo_infrastructure::SessionSettings;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "seletivo")]
#[command(author, version, about = "Seletivo back-office session client", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./seletivo.toml when present)
    #[arg(long, short, global = true, env = "SELETIVO_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with e-mail and password
    Login {
        /// Account e-mail
        #[arg(long)]
        email: String,

        /// Account password
        #[arg(long, env = "SELETIVO_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show the current session
    Status,

    /// Exchange the refresh token for a new access token
    Refresh,

    /// End the session
    Logout,

    /// Send an authenticated GET request
    Get {
        /// Path relative to the API base URL
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = SessionSettings::load(cli.config.as_deref())?;
    let session = SessionContext::open(settings).await?;

    match cli.command {
        Commands::Login { email, password } => {
            let user = session.login(&email, &password).await?;
            println!(
                "Signed in as {} (tenant {}, roles {})",
                user.display_name(),
                user.tenant_id,
                user.roles.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
            );
        }
        Commands::Status => {
            let (decision, status) = session.status().await;
            println!("{}", status.display_message());
            if let GuardDecision::Redirect { reason } = decision {
                println!(
                    "Protected views are unavailable ({}); sign in at {}",
                    reason.label(),
                    session.settings().login_route
                );
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Refresh => match session.refresh().await {
            RefreshOutcome::Refreshed => println!("Session refreshed"),
            RefreshOutcome::AlreadyHandled | RefreshOutcome::Superseded => {
                println!("Session changed meanwhile, nothing to do");
            }
            RefreshOutcome::Cleared(ClearReason::NoRefreshToken) => {
                println!("No refresh token held; signed out");
                return Ok(ExitCode::FAILURE);
            }
            RefreshOutcome::Cleared(ClearReason::ExchangeFailed) => {
                println!("Refresh was refused; signed out");
                return Ok(ExitCode::FAILURE);
            }
        },
        Commands::Logout => {
            session.logout().await?;
            println!("Signed out");
        }
        Commands::Get { path } => match session.get(&path).await? {
            GetOutcome::Denied {
                reason,
                login_route,
            } => {
                println!("Session rejected ({}); sign in at {login_route}", reason.label());
                return Ok(ExitCode::FAILURE);
            }
            GetOutcome::Response(response) => {
                println!("HTTP {} ({} ms)", response.status, response.duration.as_millis());
                println!("{}", response.text());
                if !response.is_success() {
                    return Ok(ExitCode::FAILURE);
                }
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}
