use crate::analysis::BranchResolution;
use crate::stg::State;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// wearleak CLI options.
#[derive(Debug, Parser)]
#[command(
    name = "wearleak",
    version,
    about = "Find sensor leaks and ambient-mode display issues in watch faces",
    args_conflicts_with_subcommands = true,
    subcommand_precedence_over_arg = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub analyze: AnalyzeArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze program models.
    Analyze(AnalyzeArgs),

    /// Print the lifecycle state machine.
    Stg(StgArgs),

    /// Print a model's value-flow graph as Graphviz DOT.
    Vfg(VfgArgs),

    /// List available checks.
    ListChecks,

    /// Explain a check.
    Explain {
        /// Check name.
        check: String,
    },
}

#[derive(Debug, Clone, ClapArgs)]
pub struct AnalyzeArgs {
    /// Program model files (JSON) or directories containing them.
    #[arg(value_name = "MODEL")]
    pub paths: Vec<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,

    /// Path to wearleak.toml (discovered from the first model otherwise).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Longest lifecycle event sequence to replay.
    #[arg(long)]
    pub path_length: Option<usize>,

    /// How often one method may be re-entered during a single analysis run.
    #[arg(long)]
    pub recursion_cap: Option<usize>,

    /// Tracker used to decide conditional branches.
    #[arg(long, value_enum)]
    pub branch_resolution: Option<BranchResolution>,

    /// Write a replay script for every leak into this directory.
    #[arg(long, value_name = "DIR")]
    pub emit_tests: Option<PathBuf>,

    /// Exit with code 1 if any warnings are reported.
    #[arg(long)]
    pub deny_warnings: bool,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct StgArgs {
    /// Render as Graphviz DOT.
    #[arg(long)]
    pub dot: bool,

    /// Enumerate event paths up to this length instead of printing the table.
    #[arg(long)]
    pub path_length: Option<usize>,

    /// State the enumerated paths start from.
    #[arg(long, value_enum, default_value_t = State::Null)]
    pub from: State,

    /// Also show which callbacks each engine of this model implements.
    #[arg(long, value_name = "MODEL")]
    pub model: Option<PathBuf>,

    /// Path to wearleak.toml (discovered from the model otherwise).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct VfgArgs {
    /// Program model file (JSON).
    #[arg(value_name = "MODEL")]
    pub model: PathBuf,

    /// Path to wearleak.toml (discovered from the model otherwise).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
    Markdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_paths_analyze_without_a_subcommand() {
        let args = Args::try_parse_from(["wearleak", "face.json", "--path-length", "2", "--format", "json"]).unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.analyze.paths, vec![PathBuf::from("face.json")]);
        assert_eq!(args.analyze.path_length, Some(2));
        assert_eq!(args.analyze.format, OutputFormat::Json);
    }

    #[test]
    fn stg_starts_from_null_by_default() {
        let args = Args::try_parse_from(["wearleak", "stg", "--path-length", "3"]).unwrap();
        let Some(Command::Stg(stg)) = args.command else {
            panic!("expected the stg subcommand");
        };
        assert_eq!(stg.from, State::Null);
        assert_eq!(stg.path_length, Some(3));
        assert!(!stg.dot);
    }

    #[test]
    fn vfg_takes_one_model() {
        let args = Args::try_parse_from(["wearleak", "vfg", "face.json", "--config", "w.toml"]).unwrap();
        let Some(Command::Vfg(vfg)) = args.command else {
            panic!("expected the vfg subcommand");
        };
        assert_eq!(vfg.model, PathBuf::from("face.json"));
        assert_eq!(vfg.config, Some(PathBuf::from("w.toml")));
        assert!(Args::try_parse_from(["wearleak", "vfg"]).is_err());
    }
}
