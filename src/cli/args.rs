//! Command-line argument parsing for toolgate
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use crate::normalize::OutputKind;
use crate::tools::types::{MountSpec, ToolRequest};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// toolgate - run external CLI tools and get one JSON envelope back
#[derive(Parser, Debug)]
#[command(name = "toolgate")]
#[command(version)]
#[command(about = "Resolve, run and normalize external command-line tools", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only on stderr)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a tool and print the normalized response
    Run(RunArgs),

    /// Run a JSON tool request read from a file or stdin
    Call {
        /// Request file; stdin when absent or `-`
        file: Option<PathBuf>,
    },

    /// Show how a tool would be executed
    Resolve {
        tool: String,

        /// Profile version (latest when absent)
        #[arg(long = "tool-version")]
        tool_version: Option<String>,
    },

    /// Compute a timeout from workload parameters
    Estimate(EstimateArgs),

    /// List registered tool profiles
    Profiles,

    /// Check the container runtime and every tool profile
    Doctor,

    /// Display current configuration
    Config,
}

/// Arguments of `toolgate run`
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Tool name
    pub tool: String,

    /// Profile version (latest when absent)
    #[arg(long = "tool-version")]
    pub tool_version: Option<String>,

    /// Output kind: json, ndjson, lines or pairs
    #[arg(short, long)]
    pub output: Option<OutputKind>,

    /// Timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<f64>,

    /// Workload size for the profile's timeout estimate
    #[arg(long)]
    pub units: Option<u64>,

    /// Profile template parameter, `key=value`
    #[arg(short, long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// Volume mount, `host:container`
    #[arg(short, long = "mount", value_parser = parse_mount)]
    pub mounts: Vec<MountSpec>,

    /// Environment variable, `KEY=VALUE`
    #[arg(short, long = "env", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Container network
    #[arg(long)]
    pub network: Option<String>,

    /// Working directory of the tool
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Extra arguments passed to the tool
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Arguments of `toolgate estimate`
#[derive(clap::Args, Debug, Clone)]
pub struct EstimateArgs {
    /// Timeout for one unit of work, seconds
    #[arg(long)]
    pub per_unit: u64,

    /// Number of units
    #[arg(long)]
    pub units: u64,

    /// Units processed at once
    #[arg(long)]
    pub concurrency: u64,

    /// Retries per unit
    #[arg(long, default_value_t = 0)]
    pub retries: u64,

    /// Fixed allowance, seconds
    #[arg(long, default_value_t = 0)]
    pub buffer: u64,

    /// Upper bound, seconds
    #[arg(long)]
    pub max: u64,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl RunArgs {
    /// The request this command line describes
    pub fn to_request(&self) -> ToolRequest {
        ToolRequest {
            tool: self.tool.clone(),
            version: self.tool_version.clone(),
            args: self.args.clone(),
            params: self.params.iter().cloned().collect(),
            output: self.output.clone(),
            timeout_secs: self.timeout,
            estimate: None,
            workload_units: self.units,
            mounts: self.mounts.clone(),
            working_dir: self.cwd.clone(),
            env: self.env.iter().cloned().collect(),
            network: self.network.clone(),
        }
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Log level for toolgate's own events
    pub fn log_level(&self) -> tracing::Level {
        match self {
            Verbosity::Quiet => tracing::Level::ERROR,
            Verbosity::Normal => tracing::Level::WARN,
            Verbosity::Verbose => tracing::Level::INFO,
            Verbosity::VeryVerbose => tracing::Level::DEBUG,
        }
    }

    /// Check if should show progress spinners
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}

/// Parse `key=value`; the value may itself contain `=`
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

/// Parse `host:container`, splitting on the last `:` so Windows drive
/// letters survive
pub fn parse_mount(s: &str) -> Result<MountSpec, String> {
    match s.rsplit_once(':') {
        Some((host, container)) if !host.is_empty() && container.starts_with('/') => {
            Ok(MountSpec::new(host, container))
        }
        _ => Err(format!("expected host:/container/path, got '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_verbosity_quiet() {
        assert_eq!(parse(&["toolgate", "-q", "profiles"]).verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_verbosity_normal() {
        assert_eq!(parse(&["toolgate", "profiles"]).verbosity(), Verbosity::Normal);
    }

    #[test]
    fn test_verbosity_verbose() {
        assert_eq!(parse(&["toolgate", "-v", "doctor"]).verbosity(), Verbosity::Verbose);
    }

    #[test]
    fn test_verbosity_very_verbose() {
        assert_eq!(parse(&["toolgate", "doctor", "-vv"]).verbosity(), Verbosity::VeryVerbose);
    }

    #[test]
    fn test_run_arguments() {
        let args = parse(&[
            "toolgate", "run", "amass",
            "--tool-version", "3.19",
            "-p", "target=example.com",
            "-m", "/data/amass:/.config/amass",
            "-e", "TOKEN=a=b",
            "--timeout", "30",
            "--", "-v", "-brute",
        ]);

        let Commands::Run(run) = args.command else {
            panic!("expected run command");
        };
        let request = run.to_request();
        assert_eq!(request.tool, "amass");
        assert_eq!(request.version.as_deref(), Some("3.19"));
        assert_eq!(request.params["target"], "example.com");
        assert_eq!(request.mounts, vec![MountSpec::new("/data/amass", "/.config/amass")]);
        assert_eq!(request.env["TOKEN"], "a=b");
        assert_eq!(request.timeout_secs, Some(30.0));
        assert_eq!(request.args, vec!["-v", "-brute"]);
    }

    #[test]
    fn test_run_output_kind() {
        let args = parse(&["toolgate", "run", "echo-json", "--output", "json"]);
        let Commands::Run(run) = args.command else {
            panic!("expected run command");
        };
        assert_eq!(run.output, Some(OutputKind::JsonObject));

        assert!(Args::try_parse_from(["toolgate", "run", "x", "--output", "xml"]).is_err());
    }

    #[test]
    fn test_estimate_arguments() {
        let args = parse(&[
            "toolgate", "estimate",
            "--per-unit", "30", "--units", "500", "--concurrency", "100",
            "--retries", "3", "--buffer", "300", "--max", "3600",
        ]);
        let Commands::Estimate(est) = args.command else {
            panic!("expected estimate command");
        };
        assert_eq!(est.per_unit, 30);
        assert_eq!(est.max, 3600);
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_parse_mount() {
        assert_eq!(
            parse_mount("C:\\data:/data").unwrap(),
            MountSpec::new("C:\\data", "/data")
        );
        assert!(parse_mount("/data").is_err());
        assert!(parse_mount("/data:relative").is_err());
    }

    #[test]
    fn test_verbosity_methods() {
        assert!(!Verbosity::Quiet.show_progress());
        assert!(Verbosity::Normal.show_progress());
        assert_eq!(Verbosity::VeryVerbose.log_level(), tracing::Level::DEBUG);
        assert_eq!(Verbosity::Quiet.as_str(), "quiet");
    }
}
