// src/constants.rs

/// The Slurm submission command the mapper produces an invocation of.
pub const SBATCH: &str = "sbatch";

/// The Slurm queue-listing command used for job-name dependency resolution.
pub const SQUEUE: &str = "squeue";

/// The Slurm partition-listing command used for resource→partition mapping.
pub const SINFO: &str = "sinfo";

/// Wrapper script expected next to the installed binary. It restores the
/// Grid Engine environment inside the allocated job before handing off to
/// the real interpreter.
pub const WRAPPER_FILENAME: &str = "qslurm-wrapper.sh";

/// Prefix for temporary job scripts materialized under the user's home.
pub const TEMP_SCRIPT_PREFIX: &str = "qslurm";

/// Default marker for embedded directive lines in job scripts.
pub const DEFAULT_DIRECTIVE_PREFIX: &str = "#$";

/// Resource names scanned (in order) for a `--mem-per-cpu` value.
pub const DEFAULT_MEMORY_RESOURCES: &[&str] = &["mem_req", "s_vmem"];

/// Parallel environment names scanned (in order) for a `--cpus-per-task` value.
pub const DEFAULT_CPU_ENVIRONMENTS: &[&str] = &["def_slot"];

/// Timeout applied to every scheduler query.
pub const QUERY_TIMEOUT_SECS: u64 = 15;

/// Exit status used when the run is interrupted by the user.
pub const EXIT_INTERRUPTED: i32 = 130;
