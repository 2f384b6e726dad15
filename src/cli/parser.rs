// src/cli/parser.rs

use crate::cli::args::{ToolOptions, parse_level};
use crate::core::datetime::parse_qsub_datetime;
use crate::core::model::{
    LegacyArgs, ResourceQualifier, Support, parse_slot_ranges,
};
use anyhow::{Result, anyhow, bail};
use log::LevelFilter;

/// Outcome of parsing a full command line.
#[derive(Debug)]
pub enum Invocation {
    Help,
    Version,
    Submit(Box<Submission>),
}

#[derive(Debug)]
pub struct Submission {
    pub tool: ToolOptions,
    pub legacy: LegacyArgs,
}

/// How many value tokens a flag consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Zero,
    One,
    OneOrTwo,
    Two,
    Three,
}

/// What a recognized flag does to the argument model.
#[derive(Debug, Clone, Copy)]
enum Action {
    Begin,
    Deadline,
    Account,
    Reservation,
    BinaryJob,
    DirectivePrefix,
    UseCwd,
    StdinPath,
    StdoutPath,
    StderrPath,
    MergeStreams,
    Hold,
    HoldJid,
    HoldJidAd,
    Resources,
    Queues,
    MailEvents,
    MailUser,
    JobName,
    Project,
    Priority,
    ParallelEnv,
    Requeue,
    Interpreter,
    TaskRange,
    TaskConcurrency,
    Terse,
    ExportVars,
    ExportAll,
    Verify,
    WorkingDir,
    HardState,
    SoftState,
    Dropped(Support),
}

struct FlagSpec {
    name: &'static str,
    arity: Arity,
    action: Action,
}

const fn flag(name: &'static str, arity: Arity, action: Action) -> FlagSpec {
    FlagSpec { name, arity, action }
}

/// The complete legacy flag surface. One entry per recognized `qsub` flag;
/// everything else starts the trailing command, as qsub itself treats it.
static FLAG_TABLE: &[FlagSpec] = &[
    flag("-@", Arity::One, Action::Dropped(Support::NotImplemented)),
    flag("-a", Arity::One, Action::Begin),
    flag("-ac", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-adds", Arity::Three, Action::Dropped(Support::NotImplemented)),
    flag("-ar", Arity::One, Action::Reservation),
    flag("-A", Arity::One, Action::Account),
    flag("-bgio", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-binding", Arity::OneOrTwo, Action::Dropped(Support::NotImplemented)),
    flag("-b", Arity::One, Action::BinaryJob),
    flag("-c", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-ckpt", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-clear", Arity::Zero, Action::Dropped(Support::NotImplemented)),
    flag("-clearp", Arity::One, Action::Dropped(Support::NotImplemented)),
    flag("-clears", Arity::Two, Action::Dropped(Support::NotImplemented)),
    flag("-cwd", Arity::Zero, Action::UseCwd),
    flag("-C", Arity::One, Action::DirectivePrefix),
    flag("-dc", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-dl", Arity::One, Action::Deadline),
    flag("-e", Arity::One, Action::StderrPath),
    flag("-hard", Arity::Zero, Action::HardState),
    flag("-hold_jid_ad", Arity::One, Action::HoldJidAd),
    flag("-hold_jid", Arity::One, Action::HoldJid),
    flag("-h", Arity::Zero, Action::Hold),
    flag("-i", Arity::One, Action::StdinPath),
    flag("-j", Arity::One, Action::MergeStreams),
    flag("-jc", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-js", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-jsv", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-l", Arity::One, Action::Resources),
    flag("-masterl", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-masterq", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-m", Arity::One, Action::MailEvents),
    flag("-M", Arity::One, Action::MailUser),
    flag("-mbind", Arity::One, Action::Dropped(Support::NotImplemented)),
    flag("-mods", Arity::Three, Action::Dropped(Support::NotImplemented)),
    flag("-notify", Arity::Zero, Action::Dropped(Support::NotImplemented)),
    flag("-now", Arity::One, Action::Dropped(Support::NotImplemented)),
    flag("-N", Arity::One, Action::JobName),
    flag("-o", Arity::One, Action::StdoutPath),
    flag("-par", Arity::One, Action::Dropped(Support::NotImplemented)),
    flag("-pe", Arity::Two, Action::ParallelEnv),
    flag("-pty", Arity::One, Action::Dropped(Support::NotImplemented)),
    flag("-p", Arity::One, Action::Priority),
    flag("-P", Arity::One, Action::Project),
    flag("-q", Arity::One, Action::Queues),
    flag("-rdi", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-row", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-r", Arity::One, Action::Requeue),
    flag("-R", Arity::One, Action::Dropped(Support::NotImplemented)),
    flag("-sc", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-shell", Arity::One, Action::Dropped(Support::NotImplemented)),
    flag("-si", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-soft", Arity::Zero, Action::SoftState),
    flag("-sync", Arity::One, Action::Dropped(Support::NotImplemented)),
    flag("-S", Arity::One, Action::Interpreter),
    flag("-tc", Arity::One, Action::TaskConcurrency),
    flag("-tcon", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-terse", Arity::Zero, Action::Terse),
    flag("-t", Arity::One, Action::TaskRange),
    flag("-umask", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-verify", Arity::Zero, Action::Verify),
    flag("-v", Arity::One, Action::ExportVars),
    flag("-V", Arity::Zero, Action::ExportAll),
    flag("-wd", Arity::One, Action::WorkingDir),
    flag("-w", Arity::One, Action::Dropped(Support::NotSupported)),
    flag("-xdv", Arity::One, Action::Dropped(Support::NotSupported)),
    flag(
        "-xd_run_as_image_user",
        Arity::One,
        Action::Dropped(Support::NotSupported),
    ),
];

fn find_flag(token: &str) -> Option<&'static FlagSpec> {
    FLAG_TABLE.iter().find(|spec| spec.name == token)
}

/// Parses the full command line: tool options plus the legacy flag set.
pub fn parse_command_line(tokens: &[String]) -> Result<Invocation> {
    let mut tool = ToolOptions::default();
    let mut legacy = LegacyArgs::default();
    let mut qualifier = ResourceQualifier::Hard;

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_str();

        match token {
            "-?" | "--help" | "-help" => return Ok(Invocation::Help),
            "--version" => return Ok(Invocation::Version),
            "-n" | "--dry-run" => {
                tool.dry_run = true;
                i += 1;
                continue;
            }
            "--ignore-coloring" => {
                tool.output.color = false;
                i += 1;
                continue;
            }
            "--verbose" => {
                if let Some(level) = tokens.get(i + 1).and_then(|t| parse_level(t)) {
                    tool.output.level = level;
                    i += 2;
                } else {
                    tool.output.level = LevelFilter::Info;
                    i += 1;
                }
                continue;
            }
            "--memory" => {
                tool.memory_resources = collect_values(tokens, &mut i);
                continue;
            }
            "--cpus" => {
                tool.cpu_environments = collect_values(tokens, &mut i);
                continue;
            }
            "--partition" => {
                for pair in collect_values(tokens, &mut i) {
                    let (resource, partition) = pair.split_once('=').ok_or_else(|| {
                        anyhow!(
                            "argument --partition: \"{}\" is not a resource=partition pair",
                            pair
                        )
                    })?;
                    tool.partition_overrides
                        .push((resource.to_string(), partition.to_string()));
                }
                continue;
            }
            _ => {}
        }

        match step(tokens, &mut i, &mut legacy, &mut qualifier)? {
            true => {}
            false => break,
        }
    }

    Ok(Invocation::Submit(Box::new(Submission { tool, legacy })))
}

/// Parses directive-line arguments: the legacy grammar only, no tool
/// options. Used for `#$` lines extracted from the job script.
pub fn parse_directive_args(tokens: &[String]) -> Result<LegacyArgs> {
    let mut legacy = LegacyArgs::default();
    let mut qualifier = ResourceQualifier::Hard;
    let mut i = 0;
    while i < tokens.len() {
        if !step(tokens, &mut i, &mut legacy, &mut qualifier)? {
            break;
        }
    }
    Ok(legacy)
}

/// Consumes one flag (or starts the trailing command) at `tokens[*i]`.
/// Returns false once the trailing command has been captured.
fn step(
    tokens: &[String],
    i: &mut usize,
    legacy: &mut LegacyArgs,
    qualifier: &mut ResourceQualifier,
) -> Result<bool> {
    let token = tokens[*i].as_str();

    if token == "--" {
        legacy.command = tokens[*i + 1..].to_vec();
        return Ok(false);
    }
    if !token.starts_with('-') {
        legacy.command = tokens[*i..].to_vec();
        return Ok(false);
    }
    let Some(spec) = find_flag(token) else {
        // Unrecognized dash tokens begin the command remainder, exactly as
        // qsub treats them (a binary command may carry its own flags).
        legacy.command = tokens[*i..].to_vec();
        return Ok(false);
    };

    *i += 1;
    let values = consume_values(tokens, i, spec)?;
    apply(spec, &values, legacy, qualifier)?;
    Ok(true)
}

fn consume_values(tokens: &[String], i: &mut usize, spec: &FlagSpec) -> Result<Vec<String>> {
    let required = match spec.arity {
        Arity::Zero => 0,
        Arity::One | Arity::OneOrTwo => 1,
        Arity::Two => 2,
        Arity::Three => 3,
    };
    if tokens.len() - *i < required {
        bail!(
            "argument {}: expected {} argument{}",
            spec.name,
            required,
            if required == 1 { "" } else { "s" }
        );
    }

    let mut values = tokens[*i..*i + required].to_vec();
    *i += required;

    if spec.arity == Arity::OneOrTwo {
        if let Some(extra) = tokens.get(*i).filter(|t| !t.starts_with('-')) {
            values.push(extra.clone());
            *i += 1;
        }
    }

    Ok(values)
}

fn apply(
    spec: &FlagSpec,
    values: &[String],
    legacy: &mut LegacyArgs,
    qualifier: &mut ResourceQualifier,
) -> Result<()> {
    let scalar = || values.first().cloned().unwrap_or_default();

    match spec.action {
        Action::Begin => legacy.begin_time = Some(parse_qsub_datetime(&scalar())?),
        Action::Deadline => legacy.deadline = Some(parse_qsub_datetime(&scalar())?),
        Action::Account => legacy.account = Some(scalar()),
        Action::Reservation => legacy.reservation = Some(scalar()),
        Action::BinaryJob => legacy.binary_job = Some(parse_yes_no(spec.name, &scalar())?),
        Action::DirectivePrefix => legacy.directive_prefix = Some(scalar()),
        Action::UseCwd => legacy.use_cwd = Some(true),
        Action::StdinPath => append_list(&mut legacy.stdin_path, &scalar()),
        Action::StdoutPath => append_list(&mut legacy.stdout_path, &scalar()),
        Action::StderrPath => append_list(&mut legacy.stderr_path, &scalar()),
        Action::MergeStreams => legacy.merge_streams = Some(parse_yes_no(spec.name, &scalar())?),
        Action::Hold => legacy.hold = Some(true),
        Action::HoldJid => append_list(&mut legacy.hold_jid, &scalar()),
        Action::HoldJidAd => append_list(&mut legacy.hold_jid_ad, &scalar()),
        Action::Resources => {
            let list = legacy.resources.get_or_insert_with(Default::default);
            for entry in scalar().split(',') {
                list.push(*qualifier, entry.to_string());
            }
        }
        Action::Queues => {
            let list = legacy.queues.get_or_insert_with(Default::default);
            for entry in scalar().split(',') {
                list.push(*qualifier, entry.to_string());
            }
        }
        Action::MailEvents => append_list(&mut legacy.mail_events, &scalar()),
        Action::MailUser => append_list(&mut legacy.mail_user, &scalar()),
        Action::JobName => legacy.job_name = Some(scalar()),
        Action::Project => legacy.project = Some(scalar()),
        Action::Priority => legacy.priority = Some(scalar()),
        Action::ParallelEnv => {
            let ranges = parse_slot_ranges(values.get(1).map(String::as_str).unwrap_or(""))?;
            legacy
                .parallel_env
                .get_or_insert_with(Default::default)
                .insert(scalar(), ranges);
        }
        Action::Requeue => legacy.requeue = Some(parse_yes_no(spec.name, &scalar())?),
        Action::Interpreter => append_list(&mut legacy.interpreter, &scalar()),
        Action::TaskRange => legacy.task_range = Some(scalar()),
        Action::TaskConcurrency => legacy.task_concurrency = Some(scalar()),
        Action::Terse => legacy.terse = Some(true),
        Action::ExportVars => append_list(&mut legacy.export_vars, &scalar()),
        Action::ExportAll => legacy.export_all = Some(true),
        Action::Verify => legacy.verify = Some(true),
        Action::WorkingDir => legacy.working_dir = Some(scalar()),
        Action::HardState => *qualifier = ResourceQualifier::Hard,
        Action::SoftState => *qualifier = ResourceQualifier::Soft,
        Action::Dropped(support) => legacy.note_dropped(spec.name, support),
    }
    Ok(())
}

/// Splits a comma-joined value into an append-mode list field.
fn append_list(slot: &mut Option<Vec<String>>, raw: &str) {
    slot.get_or_insert_with(Vec::new)
        .extend(raw.split(',').map(str::to_string));
}

fn parse_yes_no(flag_name: &str, value: &str) -> Result<bool> {
    match value.chars().next() {
        Some('y') | Some('Y') => Ok(true),
        Some('n') | Some('N') => Ok(false),
        _ => bail!(
            "argument {}: unknown value \"{}\" (expect y[es] or n[o])",
            flag_name,
            value
        ),
    }
}

/// Greedily consumes the value tokens following a repeatable tool option
/// (`--memory a b c`), stopping at the next dash token.
fn collect_values(tokens: &[String], i: &mut usize) -> Vec<String> {
    *i += 1;
    let mut values = Vec::new();
    while let Some(token) = tokens.get(*i) {
        if token.starts_with('-') {
            break;
        }
        values.push(token.clone());
        *i += 1;
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::SlotRange;

    fn to_tokens(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn submit(args: &[&str]) -> Submission {
        let Invocation::Submit(submission) = parse_command_line(&to_tokens(args)).unwrap() else {
            unreachable!("test inputs never contain help/version tokens")
        };
        *submission
    }

    #[test]
    fn test_scenario_command_line() {
        let parsed = submit(&[
            "-N", "myjob", "-l", "mem_req=4G", "-pe", "smp", "4", "script.sh", "alpha",
        ]);
        assert_eq!(parsed.legacy.job_name.as_deref(), Some("myjob"));
        let resources = parsed.legacy.resources.unwrap();
        assert_eq!(resources.hard(), ["mem_req=4G"]);
        assert_eq!(
            parsed.legacy.parallel_env.unwrap().get("smp"),
            Some(&[SlotRange { lo: 4, hi: None }][..])
        );
        assert_eq!(parsed.legacy.command, ["script.sh", "alpha"]);
    }

    #[test]
    fn test_tool_options_and_overrides() {
        let parsed = submit(&[
            "--dry-run",
            "--memory", "h_vmem",
            "--cpus", "smp", "mpi",
            "--partition", "gpu=gpu.q",
            "-N", "x",
            "script.sh",
        ]);
        assert!(parsed.tool.dry_run);
        assert_eq!(parsed.tool.memory_resources, ["h_vmem"]);
        assert_eq!(parsed.tool.cpu_environments, ["smp", "mpi"]);
        assert_eq!(
            parsed.tool.partition_overrides,
            [("gpu".to_string(), "gpu.q".to_string())]
        );
    }

    #[test]
    fn test_malformed_partition_override_fails() {
        let err = parse_command_line(&to_tokens(&["--partition", "gpu"])).unwrap_err();
        assert!(err.to_string().contains("resource=partition"));
    }

    #[test]
    fn test_hard_soft_qualifier_state() {
        let parsed = submit(&[
            "-l", "mem_req=4G", "-soft", "-l", "gpu", "-hard", "-l", "ssd", "s.sh",
        ]);
        let resources = parsed.legacy.resources.unwrap();
        assert_eq!(resources.hard(), ["mem_req=4G", "ssd"]);
        assert_eq!(resources.soft(), ["gpu"]);
    }

    #[test]
    fn test_yes_no_tri_state() {
        let parsed = submit(&["-b", "yes", "-r", "n", "--", "hostname"]);
        assert_eq!(parsed.legacy.binary_job, Some(true));
        assert_eq!(parsed.legacy.requeue, Some(false));
        assert_eq!(parsed.legacy.command, ["hostname"]);

        let err = parse_command_line(&to_tokens(&["-b", "maybe"])).unwrap_err();
        assert!(err.to_string().contains("expect y[es] or n[o]"));
    }

    #[test]
    fn test_unknown_dash_token_starts_command() {
        let parsed = submit(&["-N", "x", "-unknown", "arg"]);
        assert_eq!(parsed.legacy.command, ["-unknown", "arg"]);
    }

    #[test]
    fn test_missing_value_is_a_usage_error() {
        let err = parse_command_line(&to_tokens(&["-pe", "smp"])).unwrap_err();
        assert!(err.to_string().contains("expected 2 arguments"));
    }

    #[test]
    fn test_comma_lists_accumulate() {
        let parsed = submit(&[
            "-hold_jid", "1,aligner", "-hold_jid", "7", "-m", "b,e", "s.sh",
        ]);
        assert_eq!(parsed.legacy.hold_jid.unwrap(), ["1", "aligner", "7"]);
        assert_eq!(parsed.legacy.mail_events.unwrap(), ["b", "e"]);
    }

    #[test]
    fn test_dropped_flags_are_recorded() {
        let parsed = submit(&["-ckpt", "c1", "-sync", "y", "s.sh"]);
        assert_eq!(
            parsed.legacy.dropped,
            [
                ("-ckpt", Support::NotSupported),
                ("-sync", Support::NotImplemented),
            ]
        );
    }

    #[test]
    fn test_directive_args_reject_tool_options() {
        // Tool options inside a script directive are not flags; they start
        // the (ignored) command remainder.
        let legacy = parse_directive_args(&to_tokens(&["-N", "nightly", "--dry-run"])).unwrap();
        assert_eq!(legacy.job_name.as_deref(), Some("nightly"));
        assert_eq!(legacy.command, ["--dry-run"]);
    }

    #[test]
    fn test_help_and_version_short_circuit() {
        assert!(matches!(
            parse_command_line(&to_tokens(&["-?"])).unwrap(),
            Invocation::Help
        ));
        assert!(matches!(
            parse_command_line(&to_tokens(&["--version"])).unwrap(),
            Invocation::Version
        ));
    }

    #[test]
    fn test_datetime_flags_parse() {
        let parsed = submit(&["-a", "202606151230", "s.sh"]);
        assert!(parsed.legacy.begin_time.is_some());
        let err = parse_command_line(&to_tokens(&["-a", "2026"])).unwrap_err();
        assert!(err.to_string().contains("invalid datetime format"));
    }
}
