use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "repotool",
    about = "Repository tool: analyze, repair and compact native quad stores",
    version,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Analyze the repository and report its state
    #[arg(short = 'a', long = "analyze")]
    pub analyze: bool,

    /// Analyze the repository and repair it if it is not healthy
    #[arg(short = 'f', long = "analyzeAndFix")]
    pub analyze_and_fix: bool,

    /// Also check for (and remove) garbage contexts
    #[arg(short = 'g', long = "garbageCheck")]
    pub garbage_check: bool,

    /// Rebuild the repository under its own index configuration
    #[arg(short = 'c', long = "cleanup")]
    pub cleanup: bool,

    /// Comma-separated index configuration, e.g. `spoc,psoc`
    #[arg(short = 'i', long = "indices")]
    pub indices: Option<String>,

    /// Path to a TOML configuration file (default: ./repotool.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the result as JSON on stdout; progress goes to stderr
    #[arg(long)]
    pub json: bool,

    /// Repository directory (default: <data_dir>/<repository_name>)
    pub source: Option<PathBuf>,

    /// Where the repaired repository goes (default: SOURCE)
    pub target: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Analyze,
    AnalyzeAndFix,
    Cleanup,
}

impl Cli {
    /// The first selected operation, in fixed precedence order.
    pub fn operation(&self) -> Option<Operation> {
        if self.analyze {
            Some(Operation::Analyze)
        } else if self.analyze_and_fix {
            Some(Operation::AnalyzeAndFix)
        } else if self.cleanup {
            Some(Operation::Cleanup)
        } else {
            None
        }
    }
}
