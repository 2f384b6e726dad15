// src/core/partition.rs

use anyhow::{Result, bail};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

lazy_static! {
    // Punctuation boundary for partition prefixes; '-' and '_' are part of
    // the prefix, everything else ends it.
    static ref PREFIX_BOUNDARY: Regex =
        Regex::new(r##"[!"#$%&'()*+,./:;<=>?@\[\\\]^`{|}~]"##).unwrap();
}

/// The leading run of a partition name before the first punctuation
/// boundary, e.g. `mem.q` → `mem`.
pub fn partition_prefix(name: &str) -> &str {
    PREFIX_BOUNDARY.splitn(name, 2).next().unwrap_or(name)
}

/// Maps resource names onto Slurm partitions.
///
/// Order of attempts per resource: explicit override, exact match against a
/// partition's prefix token, forward match against full partition names.
pub struct PartitionResolver<'a> {
    partitions: &'a BTreeSet<String>,
    overrides: &'a [(String, String)],
}

impl<'a> PartitionResolver<'a> {
    pub fn new(partitions: &'a BTreeSet<String>, overrides: &'a [(String, String)]) -> Self {
        Self {
            partitions,
            overrides,
        }
    }

    /// All partitions a resource name matches. For hard resources more than
    /// one hit is a fatal ambiguity; soft resources keep every hit and let
    /// the caller combine them into an "any of these" list.
    fn resolve(&self, resource: &str, is_hard: bool) -> Result<Vec<&'a str>> {
        if let Some((_, partition)) = self.overrides.iter().find(|(r, _)| r == resource) {
            return Ok(vec![partition.as_str()]);
        }

        let mut hits: Vec<&str> = self
            .partitions
            .iter()
            .filter(|p| partition_prefix(p) == resource)
            .map(String::as_str)
            .collect();
        if hits.is_empty() {
            hits = self
                .partitions
                .iter()
                .filter(|p| p.starts_with(resource))
                .map(String::as_str)
                .collect();
        }

        if hits.len() > 1 && is_hard {
            log::error!(
                "resource specification \"{}\" matches multiple partitions.",
                resource
            );
            log::warn!("\t{} -> {}", resource, hits.join(", "));
            log::warn!(
                "try to add an explicit mapping option like `--partition {}={}`.",
                resource,
                hits[0]
            );
            bail!("failed to map resource into partition.");
        }
        Ok(hits)
    }

    /// Resolves the full resource set into `--partition` arguments.
    ///
    /// Hard resources must agree on exactly one partition; soft resources
    /// only apply when no hard resource matched and produce a comma-joined
    /// candidate list.
    pub fn map_partitions(
        &self,
        hard: &[(String, Option<String>)],
        soft: &[(String, Option<String>)],
    ) -> Result<Vec<String>> {
        let mut matched: Vec<(&str, &str)> = Vec::new();
        for (resource, _) in hard {
            for partition in self.resolve(resource, true)? {
                matched.push((resource.as_str(), partition));
            }
        }

        let distinct: BTreeSet<&str> = matched.iter().map(|(_, p)| *p).collect();
        if distinct.len() > 1 {
            log::error!("hard resource specifications match multiple partitions.");
            for (resource, partition) in &matched {
                log::warn!("\t{} -> {}", resource, partition);
            }
            log::warn!(
                "try to specify a single resource or use `-soft` to give an \"as available\" resource list."
            );
            bail!("failed to map resource into partition.");
        }
        if let Some(partition) = distinct.into_iter().next() {
            log::info!(
                "set partition by hard resource {} -> {}",
                matched
                    .iter()
                    .map(|(r, _)| *r)
                    .collect::<Vec<_>>()
                    .join(", "),
                partition
            );
            return Ok(vec!["--partition".to_string(), partition.to_string()]);
        }

        // No hard binding; fall back to soft resources as a candidate list.
        let mut candidates: Vec<(&str, Vec<&str>)> = Vec::new();
        for (resource, _) in soft {
            for partition in self.resolve(resource, false)? {
                match candidates.iter_mut().find(|(p, _)| *p == partition) {
                    Some((_, resources)) => resources.push(resource.as_str()),
                    None => candidates.push((partition, vec![resource.as_str()])),
                }
            }
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        log::info!("set partition by soft resource");
        for (partition, resources) in &candidates {
            log::info!("\t{} -> {}", resources.join(", "), partition);
        }
        let joined = candidates
            .iter()
            .map(|(p, _)| *p)
            .collect::<Vec<_>>()
            .join(",");
        Ok(vec!["--partition".to_string(), joined])
    }
}
