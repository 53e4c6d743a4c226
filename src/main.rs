use clap::{Parser, Subcommand};
use logrelay::config::resolve_config_dir;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "logrelay")]
#[command(about = "Log shipping agent", long_about = None)]
struct Cli {
    /// Configuration directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logrelay::logging::init(cli.debug);

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Some(Commands::Run) | None => {
            // Default behavior is to run
            let config_dir = resolve_config_dir(cli.config_dir.as_deref());
            logrelay::cli::run::run(config_dir)
                .await
                .map(|_| ())
                .map_err(Into::into)
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                logrelay::cli::config::init(stdout, cli.config_dir.as_deref())
            }
            ConfigAction::Check => {
                logrelay::cli::config::check(&resolve_config_dir(cli.config_dir.as_deref()))
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
