// src/core/model.rs

use anyhow::{Result, anyhow};
use chrono::NaiveDateTime;

/// Whether a resource request is mandatory or best-effort.
///
/// Unqualified requests count as hard, so the "merge unqualified into hard"
/// invariant holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceQualifier {
    #[default]
    Hard,
    Soft,
}

/// Entries collected by qualifier-stateful list flags (`-l`, `-q`).
///
/// The `-hard`/`-soft` toggles switch the qualifier applied to subsequent
/// entries. Insertion order is preserved; it drives partition resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualifiedList {
    hard: Vec<String>,
    soft: Vec<String>,
}

impl QualifiedList {
    pub fn push(&mut self, qualifier: ResourceQualifier, entry: String) {
        match qualifier {
            ResourceQualifier::Hard => self.hard.push(entry),
            ResourceQualifier::Soft => self.soft.push(entry),
        }
    }

    pub fn hard(&self) -> &[String] {
        &self.hard
    }

    pub fn soft(&self) -> &[String] {
        &self.soft
    }

    /// All entries regardless of qualifier, hard first.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.hard.iter().chain(self.soft.iter())
    }
}

/// Splits `name[=value]` entries into pairs with dictionary semantics:
/// a repeated name keeps its first position but takes the last value.
pub fn kv_pairs(entries: &[String]) -> Vec<(String, Option<String>)> {
    let mut pairs: Vec<(String, Option<String>)> = Vec::new();
    for entry in entries {
        let (name, value) = match entry.split_once('=') {
            Some((name, value)) => (name.to_string(), Some(value.to_string())),
            None => (entry.clone(), None),
        };
        if let Some(existing) = pairs.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = value;
        } else {
            pairs.push((name, value));
        }
    }
    pairs
}

/// One slot range of a parallel environment request: `n`, `n-m`, `-m` or
/// `n-` (an empty bound reads as 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotRange {
    pub lo: u32,
    pub hi: Option<u32>,
}

impl SlotRange {
    /// True when the range pins exactly one slot count.
    pub fn is_single(&self) -> bool {
        self.hi.is_none()
    }
}

/// Parses a comma-separated slot range list and returns it sorted.
pub fn parse_slot_ranges(spec: &str) -> Result<Vec<SlotRange>> {
    let mut ranges = Vec::new();
    for item in spec.split(',') {
        let mut bounds = item.split('-');
        let lo = parse_bound(bounds.next().unwrap_or(""), spec)?;
        let hi = match bounds.next() {
            Some(raw) => Some(parse_bound(raw, spec)?),
            None => None,
        };
        if bounds.next().is_some() {
            return Err(anyhow!("invalid slot range: \"{}\"", spec));
        }
        ranges.push(SlotRange { lo, hi });
    }
    ranges.sort();
    Ok(ranges)
}

fn parse_bound(raw: &str, spec: &str) -> Result<u32> {
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse()
        .map_err(|_| anyhow!("invalid slot range: \"{}\"", spec))
}

/// Parallel environment requests (`-pe name ranges`), insertion-ordered.
/// A repeated environment name replaces the earlier range list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelEnv(Vec<(String, Vec<SlotRange>)>);

impl ParallelEnv {
    pub fn insert(&mut self, name: String, ranges: Vec<SlotRange>) {
        if let Some(existing) = self.0.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = ranges;
        } else {
            self.0.push((name, ranges));
        }
    }

    pub fn get(&self, name: &str) -> Option<&[SlotRange]> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ranges)| ranges.as_slice())
    }
}

/// Whether a dropped legacy flag has no Slurm equivalent at all, or an
/// equivalent whose conversion is deferred. The distinction only changes
/// the diagnostic; the argument is dropped either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    NotSupported,
    NotImplemented,
}

/// The parsed legacy `qsub` command line.
///
/// Every field is `None` until a command-line flag (or, with lower
/// precedence, a script directive) sets it. The mapper consumes this
/// read-only.
#[derive(Debug, Clone, Default)]
pub struct LegacyArgs {
    /// `-a date_time`
    pub begin_time: Option<NaiveDateTime>,
    /// `-dl date_time`
    pub deadline: Option<NaiveDateTime>,
    /// `-A account_string`
    pub account: Option<String>,
    /// `-ar ar_id`
    pub reservation: Option<String>,
    /// `-b y|n`: the trailing command is a binary invocation, not a script.
    pub binary_job: Option<bool>,
    /// `-C prefix_string`: directive marker override.
    pub directive_prefix: Option<String>,
    /// `-cwd`
    pub use_cwd: Option<bool>,
    /// `-i [[host]:]file,...`
    pub stdin_path: Option<Vec<String>>,
    /// `-o [[host]:]path,...`
    pub stdout_path: Option<Vec<String>>,
    /// `-e [[host]:]path,...`
    pub stderr_path: Option<Vec<String>>,
    /// `-j y|n`: merge stderr into stdout.
    pub merge_streams: Option<bool>,
    /// `-h`
    pub hold: Option<bool>,
    /// `-hold_jid wc_job_list`
    pub hold_jid: Option<Vec<String>>,
    /// `-hold_jid_ad wc_job_list`
    pub hold_jid_ad: Option<Vec<String>>,
    /// `-l resource[=value],...` qualified by `-hard`/`-soft`.
    pub resources: Option<QualifiedList>,
    /// `-q queue[@host],...` qualified by `-hard`/`-soft`.
    pub queues: Option<QualifiedList>,
    /// `-m b|e|a|s|n,...`
    pub mail_events: Option<Vec<String>>,
    /// `-M user[@host],...`
    pub mail_user: Option<Vec<String>>,
    /// `-N name`
    pub job_name: Option<String>,
    /// `-P project_name`
    pub project: Option<String>,
    /// `-p priority`
    pub priority: Option<String>,
    /// `-pe parallel_env n[-m],...`
    pub parallel_env: Option<ParallelEnv>,
    /// `-r y|n`
    pub requeue: Option<bool>,
    /// `-S [[host]:]pathname,...`
    pub interpreter: Option<Vec<String>>,
    /// `-t n[-m[:s]]`
    pub task_range: Option<String>,
    /// `-tc max_running_tasks`
    pub task_concurrency: Option<String>,
    /// `-terse`
    pub terse: Option<bool>,
    /// `-v variable[=value],...`
    pub export_vars: Option<Vec<String>>,
    /// `-V`
    pub export_all: Option<bool>,
    /// `-verify`
    pub verify: Option<bool>,
    /// `-wd working_dir`
    pub working_dir: Option<String>,
    /// Trailing script path (plus script arguments) or binary command.
    pub command: Vec<String>,
    /// Flags that were recognized but dropped, reported during mapping.
    pub dropped: Vec<(&'static str, Support)>,
}

impl LegacyArgs {
    /// True when the job was declared a family of indexed tasks.
    pub fn is_array(&self) -> bool {
        self.task_range.is_some()
    }

    pub fn note_dropped(&mut self, flag: &'static str, support: Support) {
        if !self.dropped.iter().any(|(f, _)| *f == flag) {
            self.dropped.push((flag, support));
        }
    }

    /// Merges values parsed from script directives into this set.
    ///
    /// Command-line values always win: only fields still unset are taken
    /// from `other`. The trailing command is never merged.
    pub fn merge_from(&mut self, other: Self) {
        macro_rules! take_if_unset {
            ($($field:ident),+ $(,)?) => {
                $(if self.$field.is_none() {
                    self.$field = other.$field;
                })+
            };
        }

        take_if_unset!(
            begin_time,
            deadline,
            account,
            reservation,
            binary_job,
            directive_prefix,
            use_cwd,
            stdin_path,
            stdout_path,
            stderr_path,
            merge_streams,
            hold,
            hold_jid,
            hold_jid_ad,
            resources,
            queues,
            mail_events,
            mail_user,
            job_name,
            project,
            priority,
            parallel_env,
            requeue,
            interpreter,
            task_range,
            task_concurrency,
            terse,
            export_vars,
            export_all,
            verify,
            working_dir,
        );

        for (flag, support) in other.dropped {
            self.note_dropped(flag, support);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_pairs_last_value_wins() {
        let entries = vec![
            "mem_req=4G".to_string(),
            "gpu".to_string(),
            "mem_req=8G".to_string(),
        ];
        let pairs = kv_pairs(&entries);
        assert_eq!(
            pairs,
            vec![
                ("mem_req".to_string(), Some("8G".to_string())),
                ("gpu".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_parse_slot_ranges() {
        let ranges = parse_slot_ranges("4").unwrap();
        assert_eq!(ranges, vec![SlotRange { lo: 4, hi: None }]);
        assert!(ranges[0].is_single());

        let ranges = parse_slot_ranges("8,2-4,-6").unwrap();
        assert_eq!(
            ranges,
            vec![
                SlotRange { lo: 0, hi: Some(6) },
                SlotRange { lo: 2, hi: Some(4) },
                SlotRange { lo: 8, hi: None },
            ]
        );

        assert!(parse_slot_ranges("1-2-3").is_err());
        assert!(parse_slot_ranges("four").is_err());
    }

    #[test]
    fn test_open_ended_range_is_not_single() {
        let ranges = parse_slot_ranges("4-").unwrap();
        assert_eq!(ranges, vec![SlotRange { lo: 4, hi: Some(0) }]);
        assert!(!ranges[0].is_single());
    }

    #[test]
    fn test_qualified_list_state() {
        let mut list = QualifiedList::default();
        list.push(ResourceQualifier::Hard, "mem_req=4G".to_string());
        list.push(ResourceQualifier::Soft, "gpu".to_string());
        list.push(ResourceQualifier::Hard, "cpu.q".to_string());
        assert_eq!(list.hard(), ["mem_req=4G", "cpu.q"]);
        assert_eq!(list.soft(), ["gpu"]);
    }

    #[test]
    fn test_merge_keeps_command_line_values() {
        let mut base = LegacyArgs {
            job_name: Some("from-cli".to_string()),
            ..Default::default()
        };
        let directives = LegacyArgs {
            job_name: Some("from-script".to_string()),
            account: Some("lab".to_string()),
            command: vec!["ignored".to_string()],
            ..Default::default()
        };
        base.merge_from(directives);
        assert_eq!(base.job_name.as_deref(), Some("from-cli"));
        assert_eq!(base.account.as_deref(), Some("lab"));
        assert!(base.command.is_empty());
    }

    #[test]
    fn test_parallel_env_replaces_on_duplicate() {
        let mut pe = ParallelEnv::default();
        pe.insert("smp".to_string(), parse_slot_ranges("4").unwrap());
        pe.insert("smp".to_string(), parse_slot_ranges("8").unwrap());
        assert_eq!(pe.get("smp"), Some(&[SlotRange { lo: 8, hi: None }][..]));
        assert_eq!(pe.get("mpi"), None);
    }
}
