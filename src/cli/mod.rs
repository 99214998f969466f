//! Command-line interface for following live work from a terminal.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use output::{create_spinner, ProgressBarExt};

#[derive(Parser)]
#[command(name = "examsync")]
#[command(about = "Follow exam analysis, reassessment and generation jobs live", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file to load instead of .examsync/config.yaml
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Keep an exam live and print its analysis progress
    WatchExam(commands::exam::WatchExamArgs),

    /// Start analysis of every question of an exam and follow it
    Analyze(commands::exam::AnalyzeArgs),

    /// Follow a generation job that is already running
    WatchJob(commands::job::WatchJobArgs),

    /// Generate questions from a material and follow the job
    Generate(commands::job::GenerateArgs),

    /// Reassess one question and wait for the new assessment
    Reassess(commands::question::ReassessArgs),

    /// Save a new stem and options for a question, bumping its version
    EditQuestion(commands::question::EditQuestionArgs),

    /// Show whether a question's latest assessment is current
    Freshness(commands::question::FreshnessArgs),

    /// Chunk and embed a material
    Embed(commands::material::EmbedArgs),
}

/// Print a command failure and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        eprintln!("{body}");
    } else {
        eprintln!("{} {err}", console::style("Error:").red().bold());
        for cause in err.chain().skip(1) {
            eprintln!("  {} {cause}", console::style("caused by:").dim());
        }
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "examsync",
            "reassess",
            "--exam",
            "e1",
            "--question",
            "q1",
            "--json",
            "--config",
            "alt.yaml",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("alt.yaml")));
        match cli.command {
            Commands::Reassess(args) => {
                assert_eq!(args.exam, "e1");
                assert_eq!(args.question, "q1");
            }
            _ => panic!("expected reassess"),
        }
    }

    #[test]
    fn test_generate_parses_bloom_level() {
        let cli = Cli::try_parse_from([
            "examsync",
            "generate",
            "--material",
            "m1",
            "--count",
            "4",
            "--bloom",
            "toepassen",
            "--goal",
            "Begrijpt breuken",
        ])
        .unwrap();
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let request = args.into_request().unwrap();
        assert_eq!(request.specification.count, 4);
        assert_eq!(request.specification.num_options, 4);
        assert_eq!(
            request.specification.bloom_level,
            crate::domain::models::BloomLevel::Toepassen
        );
    }

    #[test]
    fn test_unknown_bloom_level_is_rejected() {
        let cli = Cli::try_parse_from([
            "examsync", "generate", "--material", "m1", "--bloom", "onthouden!", "--goal", "x",
        ])
        .unwrap();
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert!(args.into_request().is_err());
    }
}
