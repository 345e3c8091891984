mod cli;
mod config_watcher;
mod daemon;
mod engine;
mod ipc_server;
mod kwin;
mod monitor_thread;
mod pulse;
mod tray;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "focusvol",
    about = "Lower an application's volume while its window is in the background"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon (for autostart, systemd, or manual start)
    Daemon {
        /// Log level (trace, debug, info, warn, error)
        #[arg(long, env = "FOCUSVOL_LOG_LEVEL", default_value = "info")]
        log_level: String,
    },
    /// Show the monitored application, its levels, and focus state
    Status,
    /// List applications with visible windows
    Apps {
        /// Re-enumerate windows instead of using the periodic snapshot
        #[arg(long)]
        refresh: bool,
    },
    /// List active audio sessions
    Sessions,
    /// Start monitoring an application
    Start {
        /// Process name to match (case-insensitive substring)
        app: String,
        /// Volume while focused, 0.0 to 1.0 (default: saved, else 1.0)
        #[arg(long)]
        focused: Option<f64>,
        /// Volume while in the background, 0.0 to 1.0 (default: saved, else 0.1)
        #[arg(long)]
        unfocused: Option<f64>,
    },
    /// Stop monitoring and restore full volume
    Stop,
    /// Change the levels of the running monitor (prints them if no flag is given)
    Levels {
        #[arg(long)]
        focused: Option<f64>,
        #[arg(long)]
        unfocused: Option<f64>,
    },
    /// Save a level pair for an application (defaults to the live levels)
    Save {
        app: String,
        #[arg(long)]
        focused: Option<f64>,
        #[arg(long)]
        unfocused: Option<f64>,
    },
    /// Show the saved level pair for an application
    Load { app: String },
    /// Start the daemon at login
    Startup {
        #[command(subcommand)]
        command: StartupCommands,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum StartupCommands {
    /// Create the login entry
    Enable,
    /// Remove the login entry
    Disable,
    /// Report whether the login entry exists
    Status,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print current config as TOML
    Show,
    /// Print config directory path
    Dir,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        None => {
            use clap::CommandFactory;
            let _ = Cli::command().print_help();
            println!();
            std::process::exit(0);
        }
        // The daemon builds its own multi-thread runtime; CLI commands only
        // need a single-threaded one for one IPC round trip.
        Some(Commands::Daemon { log_level }) => daemon::run(&log_level),
        Some(cmd) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(anyhow::Error::from)
            .and_then(|rt| rt.block_on(cli::run(cmd))),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
