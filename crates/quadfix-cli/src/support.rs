use crate::cli::Cli;
use quadfix_repair::{ConsoleProgress, ConsoleStream, RepairError};
use quadfix_store::IndexOrdering;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "repotool.toml";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_REPOSITORY_NAME: &str = "dbmodel";
pub const DEFAULT_NATIVE_STORE_INDICES: &str = "spoc,psoc";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepotoolConfig {
    pub data_dir: PathBuf,
    pub repository_name: String,
    pub native_store_indices: String,
}

impl Default for RepotoolConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            repository_name: DEFAULT_REPOSITORY_NAME.to_string(),
            native_store_indices: DEFAULT_NATIVE_STORE_INDICES.to_string(),
        }
    }
}

impl RepotoolConfig {
    pub fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("invalid configuration: {e}"))
    }

    pub fn repository_path(&self) -> PathBuf {
        self.data_dir.join(&self.repository_name)
    }
}

/// Everything an operation needs, resolved before any store I/O.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub source: PathBuf,
    pub target: PathBuf,
    pub ordering: IndexOrdering,
    pub check_ghosts: bool,
    pub json: bool,
}

impl Invocation {
    pub fn progress(&self) -> ConsoleProgress {
        if self.json {
            ConsoleProgress::new(ConsoleStream::Stderr)
        } else {
            ConsoleProgress::new(ConsoleStream::Stdout)
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<RepotoolConfig, String> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
            if !fallback.is_file() {
                return Ok(RepotoolConfig::default());
            }
            fallback
        }
    };
    let text = fs::read_to_string(&path)
        .map_err(|e| format!("failed to read config {}: {e}", path.display()))?;
    RepotoolConfig::parse(&text).map_err(|e| format!("{}: {e}", path.display()))
}

pub fn resolve_invocation(cli: &Cli) -> Result<Invocation, String> {
    let config = load_config(cli.config.as_deref())?;
    let indices = cli
        .indices
        .as_deref()
        .unwrap_or(&config.native_store_indices);
    let ordering: IndexOrdering = indices
        .parse()
        .map_err(|e| format!("invalid index configuration `{indices}`: {e}"))?;
    let source = cli
        .source
        .clone()
        .unwrap_or_else(|| config.repository_path());
    let target = cli.target.clone().unwrap_or_else(|| source.clone());

    debug!(
        source = %source.display(),
        target = %target.display(),
        %ordering,
        "resolved invocation"
    );
    Ok(Invocation {
        source,
        target,
        ordering,
        check_ghosts: cli.garbage_check,
        json: cli.json,
    })
}

pub fn resolve_invocation_or_exit(cli: &Cli) -> Invocation {
    resolve_invocation(cli).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    })
}

pub fn print_json_or_exit(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("error: failed to render JSON output: {e}");
            std::process::exit(1);
        }
    }
}

pub fn exit_with_repair_error(err: RepairError) -> ! {
    eprintln!("error: {err}");
    eprintln!("  remediation: {}", err.remediation());
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn empty_config_uses_defaults() {
        let config = RepotoolConfig::parse("").expect("empty config should parse");
        assert_eq!(config, RepotoolConfig::default());
        assert_eq!(config.repository_path(), PathBuf::from("data/dbmodel"));
    }

    #[test]
    fn config_overrides_individual_keys() {
        let config = RepotoolConfig::parse("repository_name = \"other\"\n")
            .expect("config should parse");
        assert_eq!(config.repository_name, "other");
        assert_eq!(config.native_store_indices, DEFAULT_NATIVE_STORE_INDICES);
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let err = RepotoolConfig::parse("data_directory = \"x\"\n").expect_err("unknown key");
        assert!(err.contains("invalid configuration"));
    }

    #[test]
    fn target_defaults_to_source_and_indices_override_config() {
        let cli = Cli::parse_from(["repotool", "-a", "-i", "psoc", "some/db"]);
        let invocation = resolve_invocation(&cli).expect("invocation should resolve");
        assert_eq!(invocation.source, PathBuf::from("some/db"));
        assert_eq!(invocation.target, invocation.source);
        assert_eq!(invocation.ordering.to_string(), "psoc");
    }

    #[test]
    fn invalid_indices_are_rejected() {
        let cli = Cli::parse_from(["repotool", "-a", "-i", "spoc,spox", "some/db"]);
        let err = resolve_invocation(&cli).expect_err("bad ordering");
        assert!(err.contains("spoc,spox"));
    }
}
