use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::Level;

use relnotes::config::{ENV_FILE, Environment};
use relnotes::{ChatCompletions, Config, Console, HistoryProvider, Outcome, Session};

#[derive(Parser)]
#[command(name = "relnotes")]
#[command(about = "Draft a release changelog from tagged git history")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Commit hash to read history from instead of the branch head
    #[arg(long, value_name = "SHA")]
    from: Option<String>,

    /// Configuration file (default: ./relnotes.toml if it exists)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print the changelog instructions given to the model
    Prompt,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    if let Some(Command::Prompt) = cli.command {
        print!("{}", relnotes::prompt::instructions());
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(from) = cli.from {
        config.history.start = Some(from);
    }

    let environment = Environment::load(Path::new(ENV_FILE))?;
    let env = |var: &str| environment.get(var);
    let history = HistoryProvider::from_config(&config.history, env)?;
    let summarizer = ChatCompletions::new(config.model.resolve(env)?)?;

    let session = Session::new(&config, history, summarizer, Console::terminal());
    match session.run().await? {
        Outcome::Accepted(changelog) => {
            println!("{changelog}");
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Aborted => {
            eprintln!("Changelog not generated.");
            Ok(ExitCode::SUCCESS)
        }
        Outcome::NotGenerated(reason) => {
            eprintln!("Changelog not generated: {reason}");
            Ok(ExitCode::FAILURE)
        }
    }
}
