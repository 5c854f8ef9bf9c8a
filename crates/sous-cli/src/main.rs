use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "sous-cli", version, about = "Sous CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cooking timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Session token management
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Authenticated API requests
    Api {
        #[command(subcommand)]
        action: commands::api::ApiAction,
    },
    /// Bridge envelope tools
    Bridge {
        #[command(subcommand)]
        action: commands::bridge::BridgeAction,
    },
}

fn main() {
    // Logs go to stderr so JSON on stdout stays parseable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Auth { action } => commands::auth::run(action),
        Commands::Api { action } => commands::api::run(action),
        Commands::Bridge { action } => commands::bridge::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
