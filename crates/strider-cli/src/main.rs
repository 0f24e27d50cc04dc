//! `strider` – interactive console for the Strider motion executor.
//!
//! 1. Initialises structured logging (see `strider_runtime::telemetry`).
//! 2. Loads `~/.strider/config.toml`, writing the defaults on first run.
//! 3. Starts a [`MotionServer`] against a simulated differential-drive base
//!    and obstacle field running on the wall clock.
//! 4. Drops the operator into the console; **Ctrl-C** preempts the running
//!    goal and ends the session.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{error, warn};

use strider_control::{MotionContext, ParamStore};
use strider_hal::{CommandSink, SimulatedBase, SimulatedObstacles, SystemClock};
use strider_middleware::{BusCommandSink, BusError, EventBus, Topic};
use strider_perception::ObstacleBoard;
use strider_runtime::{MotionServer, TelemetryConfig, init_tracing};
use strider_types::{EventPayload, GoalStatus};

fn main() {
    let _guard = match init_tracing(&TelemetryConfig::from_env("strider")) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("[strider] {e}");
            None
        }
    };

    print_banner();
    let cfg = load_or_create_config();

    // ── Simulated world ───────────────────────────────────────────────────
    let clock = Arc::new(SystemClock::new());
    let base = Arc::new(SimulatedBase::new(clock.clone()));
    let field = Arc::new(SimulatedObstacles::new(base.clone()));
    let bus = EventBus::new(cfg.bus_capacity);
    let sink: Arc<dyn CommandSink> = if cfg.mirror_commands {
        Arc::new(BusCommandSink::new(base.clone(), bus.clone()))
    } else {
        base.clone()
    };
    let ctx = MotionContext {
        clock,
        poses: base.clone(),
        obstacles: field.clone(),
        board: Arc::new(ObstacleBoard::new()),
        sink,
        params: Arc::new(ParamStore::new(cfg.motion.clone())),
        bus: bus.clone(),
    };

    let server = match MotionServer::start(ctx) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "motion server failed to start");
            println!("{}: {}", "Startup failed".red(), e);
            std::process::exit(1);
        }
    };

    if cfg.echo_status {
        spawn_status_echo(&bus);
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    let canceller = server.canceller();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        canceller.cancel();
        shutdown_flag.store(true, Ordering::SeqCst);
        println!("{}", "  ✓ Goal preempted. Press Enter to leave.".green());
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not stop the robot");
    }

    println!(
        "  Type {} for a list of commands.\n",
        "help".bold().cyan()
    );

    let console = repl::Console {
        server: &server,
        base: &base,
        field: &field,
    };
    repl::run(&console, shutdown);

    server.shutdown();
}

fn load_or_create_config() -> config::Config {
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
            config::apply_env_overrides(&mut cfg);
            match config::save(&config::Config::default()) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
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

/// Print goal-status transitions from the bus as they happen.
fn spawn_status_echo(bus: &EventBus) {
    let mut rx = bus.subscribe_to(Topic::GoalStatus);
    let spawned = thread::Builder::new()
        .name("strider-status".into())
        .spawn(move || {
            loop {
                match rx.blocking_recv() {
                    Ok(event) => {
                        if let EventPayload::GoalStatus { goal_id, status } = event.payload {
                            let id = goal_id.to_string();
                            let label = match &status {
                                GoalStatus::Active => "active".cyan(),
                                GoalStatus::Succeeded => "succeeded".green(),
                                GoalStatus::Preempted => "preempted".yellow(),
                                GoalStatus::Aborted(reason) => {
                                    format!("aborted: {reason}").red()
                                }
                                GoalStatus::Rejected(reason) => {
                                    format!("rejected: {reason}").red()
                                }
                            };
                            println!("\n  [goal {}] {}", id[..8].dimmed(), label);
                        }
                    }
                    Err(BusError::Lagged { .. }) => continue,
                    Err(BusError::Closed { .. }) => break,
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "status echo unavailable");
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   ______       _    __         "#.bold().cyan());
    println!("{}", r#"  / __/ /_____ (_)__/ /__ ____  "#.bold().cyan());
    println!("{}", r#" _\ \/ __/ __// / _  / -_) __/  "#.bold().cyan());
    println!("{}", r#"/___/\__/_/  /_/\_,_/\__/_/     "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Strider".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Point-to-point motion executor");
    println!();
}
