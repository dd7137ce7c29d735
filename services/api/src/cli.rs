use crate::demo::{run_demo, DemoArgs};
use crate::infra::parse_cutoff;
use crate::server;
use attendance_trust::error::AppError;
use attendance_trust::workflows::attendance::trust::PolicyMode;
use chrono::NaiveTime;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Attendance Trust",
    about = "Run or demonstrate the attendance trust decision service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk through clock-in, hold, and review scenarios against an in-memory store
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// JSON file mapping each manager's employee id to their direct reports
    #[arg(long)]
    pub(crate) org_chart: Option<PathBuf>,
    /// Mode for organizations that have not stored their own policy
    #[arg(long)]
    pub(crate) trust_mode: Option<PolicyMode>,
    /// Clock-ins after this UTC time (HH:MM) are marked late
    #[arg(long, value_parser = parse_cutoff)]
    pub(crate) late_after: Option<NaiveTime>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
    }
}
