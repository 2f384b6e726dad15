// src/system/slurm.rs

use crate::constants::{QUERY_TIMEOUT_SECS, SINFO, SQUEUE};
use crate::system::executor::{self, ExecutorError};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Read-only view of the target scheduler, fetched lazily by the mapper.
///
/// The trait is the seam that lets tests map commands without a live Slurm
/// installation.
pub trait SchedulerInspector {
    /// Jobs of the current user that are currently queued or running,
    /// indexed by job name.
    fn running_jobs(&self) -> Result<BTreeMap<String, BTreeSet<u64>>, ExecutorError>;

    /// Names of the partitions the target scheduler offers.
    fn partitions(&self) -> Result<BTreeSet<String>, ExecutorError>;
}

/// Inspector backed by the `squeue`/`sinfo` command-line tools.
pub struct SlurmCli;

impl SchedulerInspector for SlurmCli {
    fn running_jobs(&self) -> Result<BTreeMap<String, BTreeSet<u64>>, ExecutorError> {
        let result = executor::capture_output(
            SQUEUE,
            &["--noheader", "--me", "--format", "%i %j"],
            Duration::from_secs(QUERY_TIMEOUT_SECS),
        )?;
        Ok(parse_running_jobs(&result.stdout))
    }

    fn partitions(&self) -> Result<BTreeSet<String>, ExecutorError> {
        let result = executor::capture_output(
            SINFO,
            &["--noheader", "--format", "%R"],
            Duration::from_secs(QUERY_TIMEOUT_SECS),
        )?;
        Ok(parse_partitions(&result.stdout))
    }
}

/// Parses `squeue` output: one `<id> <name>` pair per line. Job names may
/// contain spaces, so only the first field is split off.
fn parse_running_jobs(stdout: &str) -> BTreeMap<String, BTreeSet<u64>> {
    let mut name2ids: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();
    for line in stdout.lines() {
        let Some((id, name)) = line.trim_end().split_once(' ') else {
            continue;
        };
        match id.parse::<u64>() {
            Ok(id) => {
                name2ids.entry(name.to_string()).or_default().insert(id);
            }
            Err(_) => log::warn!("unparsable squeue line skipped: {}", line),
        }
    }
    name2ids
}

/// Parses `sinfo` output: one partition name per line.
fn parse_partitions(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_running_jobs_groups_by_name() {
        let index = parse_running_jobs("10 align\n11 align\n12 stats run\n");
        assert_eq!(
            index.get("align"),
            Some(&[10, 11].iter().copied().collect::<BTreeSet<u64>>())
        );
        // A name containing a space is kept whole.
        assert_eq!(
            index.get("stats run"),
            Some(&[12].iter().copied().collect::<BTreeSet<u64>>())
        );
    }

    #[test]
    fn test_parse_running_jobs_skips_garbage() {
        let index = parse_running_jobs("not-an-id jobname\n\n13 ok\n");
        assert_eq!(index.len(), 1);
        assert!(index.contains_key("ok"));
    }

    #[test]
    fn test_parse_partitions_drops_blank_lines() {
        let partitions = parse_partitions("gpu\nmem.q\n\nweb-service\n");
        assert_eq!(partitions.len(), 3);
        assert!(partitions.contains("mem.q"));
    }
}
