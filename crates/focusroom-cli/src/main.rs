use clap::{Parser, Subcommand};
use focusroom_core::Identity;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "focusroom", version, about = "Focusroom work/break timer")]
struct Cli {
    /// Identity whose session is used (blank or absent means "guest")
    #[arg(long, global = true, env = "FOCUSROOM_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Completed-phase statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
}

/// Log to stderr so stdout stays machine-readable. `FOCUSROOM_LOG` takes
/// the usual `EnvFilter` directives.
fn init_logging() {
    let filter = EnvFilter::try_from_env("FOCUSROOM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let identity = Identity::from_option(cli.user.as_deref());
    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action, identity),
        Commands::Config { action } => commands::config::run(action),
        Commands::Stats { action } => commands::stats::run(action, identity),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
