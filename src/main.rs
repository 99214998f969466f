//! Examsync CLI entry point.

use anyhow::Result;
use clap::Parser;

use examsync::cli::commands::{exam, job, material, question, CommandContext};
use examsync::cli::{Cli, Commands};
use examsync::infrastructure::logging::{LogConfig, LoggerImpl};
use examsync::ConfigLoader;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        examsync::cli::handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::try_from(&config.logging)?)?;
    let ctx = CommandContext::new(config, cli.json);

    match cli.command {
        Commands::WatchExam(args) => exam::watch_exam(args, &ctx).await,
        Commands::Analyze(args) => exam::analyze(args, &ctx).await,
        Commands::WatchJob(args) => job::watch_job(args, &ctx).await,
        Commands::Generate(args) => job::generate(args, &ctx).await,
        Commands::Reassess(args) => question::reassess(args, &ctx).await,
        Commands::EditQuestion(args) => question::edit_question(args, &ctx).await,
        Commands::Freshness(args) => question::freshness(args, &ctx).await,
        Commands::Embed(args) => material::embed(args, &ctx).await,
    }
}
