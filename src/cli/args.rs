// src/cli/args.rs

use crate::constants::{DEFAULT_CPU_ENVIRONMENTS, DEFAULT_MEMORY_RESOURCES};
use log::LevelFilter;

/// Presentation configuration threaded explicitly through the logging and
/// preview layers at construction time.
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub color: bool,
    pub level: LevelFilter,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            color: true,
            level: LevelFilter::Warn,
        }
    }
}

/// Tool-level options, as opposed to the legacy `qsub` flag set.
#[derive(Debug, Clone)]
pub struct ToolOptions {
    /// Preview the converted command instead of executing it.
    pub dry_run: bool,
    /// Resource names checked (in order) for a `--mem-per-cpu` value.
    pub memory_resources: Vec<String>,
    /// Parallel environments checked (in order) for `--cpus-per-task`.
    pub cpu_environments: Vec<String>,
    /// Explicit `resource=partition` mappings, consulted before any fuzzy
    /// partition matching.
    pub partition_overrides: Vec<(String, String)>,
    pub output: OutputOptions,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            memory_resources: DEFAULT_MEMORY_RESOURCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cpu_environments: DEFAULT_CPU_ENVIRONMENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            partition_overrides: Vec::new(),
            output: OutputOptions::default(),
        }
    }
}

/// Maps a `--verbose` value to a log level. Accepts the usual level names
/// plus small integers (0 = off … 5 = trace).
pub fn parse_level(raw: &str) -> Option<LevelFilter> {
    if raw.chars().all(|c| c.is_ascii_digit()) {
        return match raw.parse::<u8>().ok()? {
            0 => Some(LevelFilter::Off),
            1 => Some(LevelFilter::Error),
            2 => Some(LevelFilter::Warn),
            3 => Some(LevelFilter::Info),
            4 => Some(LevelFilter::Debug),
            5 => Some(LevelFilter::Trace),
            _ => None,
        };
    }
    match raw.to_ascii_lowercase().as_str() {
        "critical" | "fatal" | "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

pub const HELP: &str = "\
qslurm - translate Grid Engine qsub invocations into Slurm sbatch commands

USAGE:
    qslurm [TOOL OPTIONS] [QSUB OPTIONS] <script|command> [args...]
    qslurm [TOOL OPTIONS] [QSUB OPTIONS] -- <command> [args...]
    ... | qslurm [TOOL OPTIONS] [QSUB OPTIONS]

TOOL OPTIONS:
    -n, --dry-run            Preview the converted sbatch command.
    --memory <resource>...   Resource names mapped to `--mem-per-cpu`
                             (default: mem_req s_vmem). The first one present
                             among the hard resources wins.
    --cpus <parallel_env>... Parallel environments mapped to
                             `--cpus-per-task` (default: def_slot). Range
                             values fall back to their minimum bound.
    --partition <resource=partition>...
                             Explicit resource-to-partition mappings tried
                             before matching against `sinfo` output.
    --verbose [level]        Set the logging level (default: warning; bare
                             `--verbose` means info).
    --ignore-coloring        Disable colored output.
    --version                Print the version and exit.
    -?, --help, -help        Show this message.

QSUB OPTIONS:
    The familiar qsub flag set (-N, -l, -pe, -hold_jid, -o, -e, -t, -b,
    -v, -V, ...). Flags without a Slurm equivalent are reported and
    dropped, never silently ignored. Script directive lines (default
    marker `#$`, override with -C) are honored with lower precedence than
    the command line.
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_names_and_digits() {
        assert_eq!(parse_level("critical"), Some(LevelFilter::Error));
        assert_eq!(parse_level("WARNING"), Some(LevelFilter::Warn));
        assert_eq!(parse_level("3"), Some(LevelFilter::Info));
        assert_eq!(parse_level("0"), Some(LevelFilter::Off));
        assert_eq!(parse_level("chatty"), None);
        assert_eq!(parse_level("9"), None);
    }

    #[test]
    fn test_default_priority_lists() {
        let tool = ToolOptions::default();
        assert_eq!(tool.memory_resources, ["mem_req", "s_vmem"]);
        assert_eq!(tool.cpu_environments, ["def_slot"]);
        assert!(!tool.dry_run);
    }
}
