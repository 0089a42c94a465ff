//! CLI argument parsing for pila

use crate::config::AnalysisConfig;
use crate::store::EncodingMode;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for analysis reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table (default)
    Text,
    /// JSON document with results and the result timeline
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "pila")]
#[command(version)]
#[command(about = "Encode recorded call stacks and flag anomalous sub-trees", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rebuild call trees and write their arrays into the work directory
    Encode {
        #[command(flatten)]
        input: InputArgs,

        /// Matrix layout inside stored records
        #[arg(long = "encoding", value_enum)]
        encoding: Option<EncodingMode>,
    },

    /// Run statistical anomaly detection
    Detect {
        #[command(flatten)]
        input: InputArgs,

        /// Sensitivity: flag positions more than N standard deviations above the mean
        #[arg(short = 'n', long = "n-value", value_name = "N")]
        n_value: Option<u32>,

        /// Discard an existing store in the work directory first
        #[arg(long = "fresh")]
        fresh: bool,

        /// Output format
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Check the trace's array dimensions against an exported model
    Check {
        #[command(flatten)]
        input: InputArgs,

        /// Directory holding model.json and metadata.json
        #[arg(long = "model-dir", value_name = "DIR")]
        model_dir: PathBuf,

        /// Output format
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the header and records of an array store
    Inspect {
        /// Directory holding the array store
        #[arg(long = "work-dir", value_name = "DIR")]
        work_dir: PathBuf,

        /// Only print the header
        #[arg(long = "header-only")]
        header_only: bool,
    },
}

/// Call input and the settings shared by every analysis command
#[derive(Args, Debug)]
pub struct InputArgs {
    /// JSON array of recorded calls: [{"start", "length", "depth", "symbol"}, ...]
    #[arg(value_name = "CALLS")]
    pub calls: PathBuf,

    /// TOML analysis configuration
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Depth whose calls become roots
    #[arg(short = 'd', long = "target-depth", value_name = "DEPTH")]
    pub target_depth: Option<u32>,

    /// Directory holding the array store
    #[arg(short = 'w', long = "work-dir", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,
}

impl InputArgs {
    /// Apply flag overrides on top of a base configuration
    pub fn apply_to(&self, config: &mut AnalysisConfig) {
        if let Some(depth) = self.target_depth {
            config.target_depth = depth;
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_encode() {
        let cli = Cli::parse_from([
            "pila",
            "encode",
            "calls.json",
            "--target-depth",
            "2",
            "--work-dir",
            "/tmp/w",
            "--encoding",
            "dense",
        ]);
        match cli.command {
            Command::Encode { input, encoding } => {
                assert_eq!(input.calls, PathBuf::from("calls.json"));
                assert_eq!(input.target_depth, Some(2));
                assert_eq!(input.work_dir, Some(PathBuf::from("/tmp/w")));
                assert_eq!(encoding, Some(EncodingMode::Dense));
            }
            other => panic!("Expected encode, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_detect_defaults() {
        let cli = Cli::parse_from(["pila", "detect", "calls.json"]);
        assert!(!cli.debug);
        match cli.command {
            Command::Detect {
                input,
                n_value,
                fresh,
                format,
            } => {
                assert!(input.config.is_none());
                assert!(n_value.is_none());
                assert!(!fresh);
                assert_eq!(format, OutputFormat::Text);
            }
            other => panic!("Expected detect, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_detect_flags() {
        let cli = Cli::parse_from([
            "pila", "detect", "calls.json", "-n", "0", "--format", "json", "--fresh",
            "--debug",
        ]);
        assert!(cli.debug);
        match cli.command {
            Command::Detect {
                n_value,
                fresh,
                format,
                ..
            } => {
                assert_eq!(n_value, Some(0));
                assert!(fresh);
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("Expected detect, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_check_requires_model_dir() {
        assert!(Cli::try_parse_from(["pila", "check", "calls.json"]).is_err());
        let cli = Cli::parse_from(["pila", "check", "calls.json", "--model-dir", "/m"]);
        assert!(matches!(cli.command, Command::Check { .. }));
    }

    #[test]
    fn test_cli_inspect() {
        let cli = Cli::parse_from(["pila", "inspect", "--work-dir", "/tmp/w", "--header-only"]);
        match cli.command {
            Command::Inspect {
                work_dir,
                header_only,
            } => {
                assert_eq!(work_dir, PathBuf::from("/tmp/w"));
                assert!(header_only);
            }
            other => panic!("Expected inspect, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["pila"]).is_err());
    }

    #[test]
    fn test_input_overrides_config() {
        let cli = Cli::parse_from(["pila", "detect", "calls.json", "-d", "3", "-w", "/tmp/x"]);
        let Command::Detect { input, .. } = cli.command else {
            panic!("Expected detect");
        };
        let mut config = AnalysisConfig::default();
        input.apply_to(&mut config);
        assert_eq!(config.target_depth, 3);
        assert_eq!(config.work_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.n_value, 3);
    }
}
