//! astro-bot — entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI args (`-v` tiers, `-f` config path)
//!   3. Load config (TOML + env overrides)
//!   4. Init logger once at the effective level
//!   5. Decode service-account credentials, build the store client
//!   6. Spawn bot subsystem (lifecycle manager, watcher, runner)
//!   7. Spawn admin subsystem (HTTP server)
//!   8. Wait for ctrl-c or a subsystem error

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use astro_bot::process::{Pm2Control, ProcessControl};
use astro_bot::store::{self, FirestoreClient, FlowSource};
use astro_bot::{admin, bot, config, error, logger};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), error::AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();

    logger::init(effective_log_level, force_cli_level)?;

    info!(
        bot_name = %config.bot_name,
        run_env = %config.run_env,
        portal_port = config.portal.port,
        admin_port = config.admin.port,
        collection = %config.store.collection,
        "config loaded"
    );

    let credentials_b64 = config.credentials_b64.as_deref().ok_or_else(|| {
        error::AppError::Config("FIREBASE_CREDENTIALS_BASE64 is not set".to_string())
    })?;
    let account = store::credentials::decode(credentials_b64)?;

    info!(project = %account.project_id, "store credentials loaded");

    let source: Arc<dyn FlowSource> =
        Arc::new(FirestoreClient::new(account, config.store.collection.clone()));

    // Shared shutdown token — ctrl-c cancels it, all components watch it.
    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let bot_handle = bot::start(&config, source, shutdown.clone());

    let process: Arc<dyn ProcessControl> = Arc::new(Pm2Control::new());
    let admin_handle = admin::start(&config, process, shutdown.clone());

    let (bot_result, admin_result) = tokio::join!(bot_handle.join(), admin_handle.join());

    // Whichever side exited first has already cancelled the token; make
    // sure the other side's error is not lost.
    shutdown.cancel();
    bot_result?;
    admin_result?;

    Ok(())
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: astro-bot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // Each -v raises verbosity one tier from the config default:
    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug
    //   -vvvv+  → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs {
        log_level,
        config_path,
    }
}
