use crate::{commands, server};
use clap::{Args, Parser, Subcommand};
use laboranalysis::config::AppConfig;
use laboranalysis::error::AppError;
use laboranalysis::pipeline::WorkerRole;
use laboranalysis::telemetry;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "laboranalysis",
    about = "Run the labor-market report pipeline: intake server and stage workers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the intake and report HTTP service (default command)
    Serve(ServeArgs),
    /// Run one stage worker against the shared queue store
    Work(WorkArgs),
    /// Submit a single order into the incoming queue
    Submit(SubmitArgs),
    /// Submit every order in a customer,kind,subject CSV file
    Import(ImportArgs),
    /// Print how many orders each queue holds
    Queues,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct WorkArgs {
    /// Stage to work: harvest, analyze or notify
    #[arg(value_parser = parse_role)]
    pub(crate) role: WorkerRole,
    /// Run a single poll cycle and exit instead of looping
    #[arg(long)]
    pub(crate) once: bool,
    /// Expose /health, /ready and /metrics on this port while working
    #[arg(long)]
    pub(crate) status_port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct SubmitArgs {
    #[arg(long)]
    pub(crate) customer: String,
    /// vacancy or resume
    #[arg(long)]
    pub(crate) kind: String,
    /// Occupation (vacancy) or search criteria (resume)
    #[arg(long)]
    pub(crate) subject: String,
}

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// CSV file with a customer,kind,subject header
    pub(crate) path: PathBuf,
}

fn parse_role(raw: &str) -> Result<WorkerRole, String> {
    raw.parse()
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match command {
        Command::Serve(args) => server::run(config, args).await,
        Command::Work(args) => commands::work(config, args).await,
        Command::Submit(args) => commands::submit(&config, args),
        Command::Import(args) => commands::import(&config, args),
        Command::Queues => commands::queues(&config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_work_command() {
        let cli = Cli::try_parse_from(["laboranalysis", "work", "analyze", "--once"])
            .expect("arguments parse");
        match cli.command {
            Some(Command::Work(args)) => {
                assert_eq!(args.role, WorkerRole::Analyze);
                assert!(args.once);
                assert!(args.status_port.is_none());
            }
            other => panic!("expected work command, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_role() {
        assert!(Cli::try_parse_from(["laboranalysis", "work", "publish"]).is_err());
    }

    #[test]
    fn serve_is_the_default() {
        let cli = Cli::try_parse_from(["laboranalysis"]).expect("arguments parse");
        assert!(cli.command.is_none());
    }
}
