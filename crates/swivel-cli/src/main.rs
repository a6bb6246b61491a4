//! `swivel-cli` – the Swivel daemon binary
//!
//! Entry point ("ignition switch") for the gimbal bridge.  It:
//!
//! 1. Loads `~/.swivel/config.toml`, writing the default file on first run.
//! 2. Initialises tracing with an optional OTLP exporter.
//! 3. Builds the radio, session, arbiter and command table.
//! 4. Connects to the gimbal with bounded startup retries.
//! 5. Spawns the intake client, delivery loop and reconnect supervisor, then
//!    parks until **Ctrl-C** or the first task exit.

mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use swivel_intake::IntakeClient;
use swivel_kernel::CommandArbiter;
use swivel_link::{GatewayRadio, GimbalRadio, GimbalSession, ReconnectSupervisor, SimRadio};
use swivel_runtime::{run_delivery, telemetry};

fn main() -> ExitCode {
    print_banner();

    // ── Structured logging ────────────────────────────────────────────────
    // Everything after this line is traced; the banner and boot steps stay
    // on println! for UX consistency.  RUST_LOG filters (default "info"),
    // SWIVEL_LOG_FORMAT=json switches to newline-delimited JSON logs.
    let _guard = telemetry::init_tracing("swivel");

    let cfg = load_or_init_config();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Runtime error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(cfg))
}

/// Load `~/.swivel/config.toml`, writing the defaults on first run.  Env
/// overrides apply either way, so a containerised daemon works without a
/// config file at all.
fn load_or_init_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Config error".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

async fn run(cfg: config::Config) -> ExitCode {
    // ── Boot ──────────────────────────────────────────────────────────────
    println!();
    println!("  {} Validating command table …", "[1/5]".bold().cyan());
    let table = match cfg.command_table() {
        Ok(table) => {
            println!("        {}", "OK".green());
            table
        }
        Err(e) => {
            println!("        {} {}", "✗".red().bold(), e);
            error!(error = %e, "command table invalid, aborting");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "  {} Building {} radio …",
        "[2/5]".bold().cyan(),
        cfg.gimbal.transport.to_string().bold()
    );
    let radio: Box<dyn GimbalRadio> = match cfg.gimbal.transport {
        config::TransportMode::Gateway => {
            Box::new(GatewayRadio::new(cfg.gimbal.gateway_url.clone()))
        }
        config::TransportMode::Sim => Box::new(SimRadio::new()),
    };
    let session = Arc::new(GimbalSession::new(radio, cfg.link_config()));
    let arbiter = Arc::new(CommandArbiter::new(cfg.arbiter_timeout()));
    println!("        {}", "OK".green());

    // ── Initial connect ───────────────────────────────────────────────────
    println!(
        "  {} Connecting to gimbal at {} …",
        "[3/5]".bold().cyan(),
        cfg.gimbal.address.bold()
    );
    let startup_delay = Duration::from_secs(cfg.gimbal.startup_retry_delay_secs);
    if !connect_with_retries(&session, cfg.gimbal.startup_attempts, startup_delay).await {
        println!("        {} gimbal unreachable, giving up", "✗".red().bold());
        return ExitCode::FAILURE;
    }
    println!("        {}", "OK".green());

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let ctrlc_tx = shutdown_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        let _ = ctrlc_tx.send(());
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Tasks ─────────────────────────────────────────────────────────────
    println!("  {} Starting intake client …", "[4/5]".bold().cyan());
    let intake = IntakeClient::new(cfg.intake_config(), arbiter.clone());
    let mut intake_handle = tokio::spawn(intake.run(shutdown_tx.subscribe()));
    println!("        {}", "OK".green());

    println!(
        "  {} Starting delivery loop and supervisor …",
        "[5/5]".bold().cyan()
    );
    let mut delivery_handle = tokio::spawn(run_delivery(
        arbiter.clone(),
        session.clone(),
        table,
        cfg.delivery_config(),
        shutdown_tx.subscribe(),
    ));
    let supervisor = ReconnectSupervisor::spawn(
        session.clone(),
        cfg.supervisor_config(),
        shutdown_tx.subscribe(),
    );
    println!("        {}", "OK".green());
    println!();
    info!("swivel bridge running");

    // ── Park until the first task exits ───────────────────────────────────
    // Both loops only return once shutdown fires, so an early exit from
    // either is worth the same teardown as Ctrl-C.
    let mut failed = false;
    tokio::select! {
        result = &mut delivery_handle => {
            match result {
                Ok(Ok(())) => info!("delivery loop ended"),
                Ok(Err(ref e)) => {
                    failed = true;
                    error!(error = %e, "delivery loop failed");
                }
                Err(ref e) => {
                    failed = true;
                    error!(error = %e, "delivery task panicked");
                }
            }
            let _ = shutdown_tx.send(());
            let _ = intake_handle.await;
        }
        result = &mut intake_handle => {
            if let Err(ref e) = result {
                failed = true;
                error!(error = %e, "intake task panicked");
            } else {
                info!("intake client ended");
            }
            let _ = shutdown_tx.send(());
            match delivery_handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed = true;
                    error!(error = %e, "delivery loop failed");
                }
                Err(e) => {
                    failed = true;
                    error!(error = %e, "delivery task panicked");
                }
            }
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────
    supervisor.stop().await;
    session.disconnect().await;
    info!("swivel bridge stopped");

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Bounded startup connect. Returns `false` once every attempt has failed.
async fn connect_with_retries(
    session: &GimbalSession,
    attempts: u32,
    delay: Duration,
) -> bool {
    for attempt in 1..=attempts {
        match session.connect().await {
            Ok(()) => return true,
            Err(e) => {
                warn!(attempt, max_attempts = attempts, error = %e, "startup connect failed");
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    error!(attempts, "gimbal unreachable after startup retries");
    false
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#" ___         _          _ "#.bold().cyan());
    println!("{}", r#"/ __|_ __ __(_)_ _____ | |"#.bold().cyan());
    println!("{}", r#"\__ \ V  V /| \ V / -_)| |"#.bold().cyan());
    println!("{}", r#"|___/\_/\_/ |_|\_/\___||_|"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Swivel".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Gimbal Control Bridge");
    println!();
}
