// src/core/mapper.rs

use crate::core::datetime::to_iso8601;
use crate::core::model::{LegacyArgs, Support, kv_pairs};
use crate::core::partition::PartitionResolver;
use crate::core::script::JobScript;
use anyhow::{Context, Result, bail};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::system::slurm::SchedulerInspector;

/// Everything the mapping engine needs besides the parsed arguments:
/// the resolved target binary, the tool-level configuration and the
/// scheduler boundary.
pub struct MapperContext<'a> {
    /// Resolved `sbatch` path, or the bare name stamped for preview runs.
    pub bin: String,
    pub dry_run: bool,
    pub home: PathBuf,
    pub memory_resources: &'a [String],
    pub cpu_environments: &'a [String],
    pub partition_overrides: &'a [(String, String)],
    pub wrapper_path: PathBuf,
    pub inspector: &'a dyn SchedulerInspector,
}

/// Shared shape of the three path-spec flags.
struct PathFlag {
    option_name: &'static str,
    bind_to: &'static str,
    stream: char,
    is_output: bool,
}

const INPUT_PATH: PathFlag = PathFlag {
    option_name: "-i",
    bind_to: "--input",
    stream: 'i',
    is_output: false,
};
const OUTPUT_PATH: PathFlag = PathFlag {
    option_name: "-o",
    bind_to: "--output",
    stream: 'o',
    is_output: true,
};
const ERROR_PATH: PathFlag = PathFlag {
    option_name: "-e",
    bind_to: "--error",
    stream: 'e',
    is_output: true,
};

/// Converts a [`LegacyArgs`] set plus its [`JobScript`] into the complete
/// `sbatch` argument vector.
///
/// Per-flag conversions run first, then the cross-cutting resolutions in a
/// fixed order: dependencies, output defaulting, array expansion, exports,
/// wrapper, interpreter and the trailing script/command tokens. The
/// argument vector is append-only throughout.
pub struct CommandMapper<'a> {
    ctx: MapperContext<'a>,
    args: Vec<String>,
}

impl<'a> CommandMapper<'a> {
    pub fn new(ctx: MapperContext<'a>) -> Self {
        Self {
            ctx,
            args: Vec::new(),
        }
    }

    pub fn convert(mut self, legacy: &LegacyArgs, script: &JobScript) -> Result<Vec<String>> {
        // Pre-pass: `-j y` makes an explicit `-e` meaningless.
        let stderr_spec = if legacy.merge_streams == Some(true) {
            if legacy.stderr_path.is_some() {
                log::warn!("`-e` is ignored due to `-j` is enabled.");
            }
            None
        } else {
            legacy.stderr_path.as_deref()
        };

        // --- per-flag conversion ---
        if let Some(dt) = &legacy.begin_time {
            self.push_pair("--begin", to_iso8601(dt));
        }
        if let Some(dt) = &legacy.deadline {
            self.push_pair("--deadline", to_iso8601(dt));
        }
        if let Some(account) = &legacy.account {
            self.push_pair("--account", account);
        }
        if let Some(reservation) = &legacy.reservation {
            self.push_pair("--reservation", reservation);
        }
        if legacy.use_cwd == Some(true) {
            let cwd = env::current_dir().context("could not determine working directory")?;
            self.push_pair("--chdir", cwd.display().to_string());
        }
        if let Some(dir) = &legacy.working_dir {
            self.push_pair("--chdir", dir);
        }
        if legacy.hold == Some(true) {
            self.push_flag("--hold");
        }
        if let Some(name) = &legacy.job_name {
            self.push_pair("--job-name", name);
        }
        if let Some(project) = &legacy.project {
            self.push_pair("--wckey", project);
        }
        if let Some(priority) = &legacy.priority {
            self.push_pair("--nice", priority);
        }
        if let Some(events) = &legacy.mail_events {
            self.map_mail_events(events);
        }
        if let Some(users) = &legacy.mail_user {
            let user = use_first(users, "-M").to_string();
            self.push_pair("--mail-user", user);
        }
        if let Some(paths) = &legacy.stdin_path {
            self.map_path(paths, &INPUT_PATH, legacy)?;
        }
        if let Some(paths) = &legacy.stdout_path {
            self.map_path(paths, &OUTPUT_PATH, legacy)?;
        }
        if let Some(paths) = stderr_spec {
            self.map_path(paths, &ERROR_PATH, legacy)?;
        }
        if legacy.resources.is_some() {
            self.map_resources(legacy)?;
        }
        if let Some(queues) = &legacy.queues {
            let hosts: Vec<&str> = queues
                .iter()
                .filter_map(|queue| match queue.split_once('@') {
                    Some((_, host)) if !host.starts_with('@') => Some(host),
                    _ => {
                        log::error!(
                            "queue specification at \"-q\" option requires host name: {}",
                            queue
                        );
                        None
                    }
                })
                .collect();
            if !hosts.is_empty() {
                self.push_pair("--nodelist", hosts.join(","));
            }
        }
        if legacy.parallel_env.is_some() {
            self.map_parallel_env(legacy);
        }
        match legacy.requeue {
            Some(true) => self.push_flag("--requeue"),
            Some(false) => self.push_flag("--no-requeue"),
            None => {}
        }
        if legacy.terse == Some(true) {
            self.push_flag("--parsable");
        }
        if legacy.verify == Some(true) {
            self.push_flag("--test-only");
        }
        for (flag, support) in &legacy.dropped {
            match support {
                Support::NotSupported => log::warn!("\"{}\" option is not supported.", flag),
                Support::NotImplemented => {
                    log::warn!("\"{}\" option is not implemented yet; ignored.", flag);
                }
            }
        }

        // --- cross-cutting post-resolution ---
        self.map_dependencies(legacy)?;
        self.default_output_paths(legacy, stderr_spec.is_some());
        self.map_array(legacy);
        self.map_exports(legacy, script);
        self.append_wrapper()?;
        self.append_interpreter(legacy, script);
        self.append_trailing(legacy, script);

        let mut command = Vec::with_capacity(self.args.len() + 1);
        command.push(self.ctx.bin);
        command.extend(self.args);
        Ok(command)
    }

    fn push_flag(&mut self, flag: &str) {
        self.args.push(flag.to_string());
    }

    fn push_pair(&mut self, flag: &str, value: impl Into<String>) {
        self.args.push(flag.to_string());
        self.args.push(value.into());
    }

    // # mail events

    fn map_mail_events(&mut self, events: &[String]) {
        let mut types: Vec<&str> = Vec::new();
        for code in events {
            match code.as_str() {
                "n" => {}
                "b" => types.push("BEGIN"),
                "e" => types.push("END"),
                "a" => types.extend(["FAIL", "REQUEUE"]),
                other => {
                    log::warn!("unknown mail type \"{}\" for \"-m\" was ignored.", other);
                }
            }
        }
        if !types.is_empty() {
            self.push_pair("--mail-type", types.join(","));
        }
    }

    // # path specs

    fn map_path(&mut self, value: &[String], flag: &PathFlag, legacy: &LegacyArgs) -> Result<()> {
        let path = use_first(value, flag.option_name);
        let path = strip_host(path, flag.option_name);

        let mut path = PathBuf::from(path);
        if legacy.use_cwd != Some(true) && path.is_relative() {
            path = self.ctx.home.join(path);
        }

        if flag.is_output {
            if path.is_dir() {
                path = path.join(self.default_filename(flag.stream, legacy));
            } else if path.is_file() {
                log::warn!(
                    "output file specified by \"{}\" will be overwritten.",
                    flag.option_name
                );
            } else {
                path = self.prepare_output_file(path, flag)?;
            }
        }

        self.push_pair(flag.bind_to, path.display().to_string());
        Ok(())
    }

    /// Creates a missing log directory and rewrites legacy placeholders in
    /// the filename into Slurm's `%`-token syntax.
    fn prepare_output_file(&self, path: PathBuf, flag: &PathFlag) -> Result<PathBuf> {
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty());
        if let Some(dir) = dir {
            if !dir.exists() {
                log::debug!("output log directory does not exist.");
                if !self.ctx.dry_run {
                    fs::create_dir_all(dir).map_err(|e| {
                        log::error!("{}", e);
                        anyhow::anyhow!(
                            "failed to create log output directory for \"{}\".",
                            flag.option_name
                        )
                    })?;
                    log::info!("directory \"{}\" was created for output.", dir.display());
                }
            }
        }

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let filename = filename
            .replace('%', "%%")
            .replace("$USER", "%u")
            .replace("$JOB_ID", "%j")
            .replace("$JOB_NAME", "%x")
            .replace("$HOSTNAME", "%N")
            .replace("$TASK_ID", "%a");

        Ok(match dir {
            Some(dir) => dir.join(filename),
            None => PathBuf::from(filename),
        })
    }

    /// Synthesized log filename: job name and job id tokens, plus the task
    /// id for array jobs.
    fn default_filename(&self, stream: char, legacy: &LegacyArgs) -> String {
        let mut name = format!("%x.{}%j", stream);
        if legacy.is_array() {
            name.push_str(".%a");
        }
        name
    }

    fn default_output_path(&self, stream: char, legacy: &LegacyArgs) -> String {
        let name = self.default_filename(stream, legacy);
        if legacy.use_cwd == Some(true) {
            name
        } else {
            self.ctx.home.join(name).display().to_string()
        }
    }

    // # resource requests

    fn map_resources(&mut self, legacy: &LegacyArgs) -> Result<()> {
        let Some(request) = &legacy.resources else {
            return Ok(());
        };
        let hard = kv_pairs(request.hard());
        let soft = kv_pairs(request.soft());

        let partitions = match self.ctx.inspector.partitions() {
            Ok(partitions) => partitions,
            Err(e) if self.ctx.dry_run => {
                log::warn!("{}", e);
                BTreeSet::new()
            }
            Err(e) => return Err(e).context("failed to list partitions"),
        };
        let resolver = PartitionResolver::new(&partitions, self.ctx.partition_overrides);
        let partition_args = resolver.map_partitions(&hard, &soft)?;
        self.args.extend(partition_args);

        for key in self.ctx.memory_resources {
            let Some((_, value)) = hard.iter().find(|(name, _)| name == key) else {
                continue;
            };
            match value {
                Some(value) => {
                    let value = value.clone();
                    self.push_pair("--mem-per-cpu", value);
                    break;
                }
                None => log::warn!(
                    "resource \"{}\" carries no value; not usable for `--mem-per-cpu`.",
                    key
                ),
            }
        }
        Ok(())
    }

    // # parallel environments

    fn map_parallel_env(&mut self, legacy: &LegacyArgs) {
        let Some(envs) = &legacy.parallel_env else {
            return;
        };

        let mut first_match = None;
        for name in self.ctx.cpu_environments {
            let Some(ranges) = envs.get(name) else {
                continue;
            };
            if first_match.is_none() {
                first_match = Some(ranges);
            }
            if ranges.len() == 1 && ranges[0].is_single() {
                self.push_pair("--cpus-per-task", ranges[0].lo.to_string());
                return;
            }
        }

        if let Some(ranges) = first_match {
            let mut slots = ranges.first().map(|r| r.lo).unwrap_or(0);
            if slots == 0 {
                slots = 1;
            }
            log::warn!(
                "range value for `-pe` is not supported. use minimum value: {}",
                slots
            );
            self.push_pair("--cpus-per-task", slots.to_string());
        }
    }

    // # dependency resolution

    fn map_dependencies(&mut self, legacy: &LegacyArgs) -> Result<()> {
        let families = [legacy.hold_jid.as_deref(), legacy.hold_jid_ad.as_deref()];
        let has_names = families
            .iter()
            .flatten()
            .flat_map(|ids| ids.iter())
            .any(|id| !is_numeric(id));
        if !has_names {
            return Ok(());
        }

        let index = match self.ctx.inspector.running_jobs() {
            Ok(index) => index,
            Err(e) if self.ctx.dry_run => {
                log::warn!("{}", e);
                return Ok(());
            }
            Err(e) => return Err(e).context("failed to query running jobs"),
        };
        let running: BTreeSet<u64> = index.values().flatten().copied().collect();

        let resolve = |ids: Option<&[String]>| -> Vec<String> {
            let mut resolved = Vec::new();
            for id in ids.unwrap_or_default() {
                if is_numeric(id) && id.parse::<u64>().is_ok_and(|n| running.contains(&n)) {
                    resolved.push(id.clone());
                } else if let Some(job_ids) = index.get(id.as_str()) {
                    let expanded: Vec<String> =
                        job_ids.iter().map(u64::to_string).collect();
                    log::debug!("dependency: {} -> {}", id, expanded.join(", "));
                    resolved.extend(expanded);
                } else {
                    log::info!("job \"{}\" is not running.", id);
                }
            }
            resolved
        };

        let plain = resolve(legacy.hold_jid.as_deref());
        let correlated = resolve(legacy.hold_jid_ad.as_deref());

        let mut clauses = Vec::new();
        if !plain.is_empty() {
            clauses.push(format!("afterok:{}", plain.join(":")));
        }
        if !correlated.is_empty() {
            clauses.push(format!("aftercorr:{}", correlated.join(":")));
        }
        if !clauses.is_empty() {
            self.push_pair("--dependency", clauses.join(","));
        }
        Ok(())
    }

    // # output defaulting, array, exports

    fn default_output_paths(&mut self, legacy: &LegacyArgs, stderr_given: bool) {
        if legacy.stdout_path.is_none() {
            let path = self.default_output_path('o', legacy);
            self.push_pair("--output", path);
        }
        if legacy.merge_streams != Some(true) && !stderr_given {
            let path = self.default_output_path('e', legacy);
            self.push_pair("--error", path);
        }
    }

    fn map_array(&mut self, legacy: &LegacyArgs) {
        let Some(range) = &legacy.task_range else {
            return;
        };
        let mut spec = range.clone();
        if let Some(limit) = &legacy.task_concurrency {
            spec.push('%');
            spec.push_str(limit);
        }
        self.push_pair("--array", spec);
    }

    /// Slurm treats an absent or empty `--export` as "export everything",
    /// which inverts the qsub default. An explicit NONE is emitted whenever
    /// nothing was requested.
    fn map_exports(&mut self, legacy: &LegacyArgs, script: &JobScript) {
        if legacy.export_all != Some(true) && legacy.export_vars.is_none() {
            self.push_pair("--export", "NONE");
            return;
        }

        let mut export = Vec::new();
        if legacy.export_all == Some(true) {
            export.push("ALL".to_string());
        }
        if let Some(vars) = &legacy.export_vars {
            export.extend(vars.iter().cloned());
        }
        for (name, value) in self.synthesize_env(legacy, script) {
            export.push(format!("{}={}", name, value));
        }
        self.push_pair("--export", export.join(","));
    }

    /// The environment a qsub job would have seen at submission time.
    fn synthesize_env(&self, legacy: &LegacyArgs, script: &JobScript) -> Vec<(String, String)> {
        let home = Some(self.ctx.home.display().to_string());
        let host = hostname();
        let user = username();
        let workdir = env::current_dir()
            .ok()
            .map(|dir| dir.display().to_string());
        let job_script = script.path.as_ref().map(|p| p.display().to_string());
        let request = legacy.job_name.clone().or_else(|| script.base_name());

        let entries = [
            ("SGE_O_HOME", home.clone()),
            ("SGE_O_HOST", host),
            ("SGE_O_LOGNAME", user.clone()),
            ("SGE_O_MAIL", env::var("MAIL").ok()),
            ("SGE_O_PATH", env::var("PATH").ok()),
            ("SGE_O_SHELL", env::var("SHELL").ok()),
            ("SGE_O_WORKDIR", workdir),
            ("ENVIRONMENT", Some("BATCH".to_string())),
            ("HOME", home),
            ("JOB_SCRIPT", job_script),
            ("LOGNAME", user.clone()),
            ("REQUEST", request),
            ("USER", user),
        ];
        entries
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
            .collect()
    }

    // # wrapper, interpreter, trailing tokens

    fn append_wrapper(&mut self) -> Result<()> {
        if !self.ctx.wrapper_path.exists() {
            bail!(
                "\"{}\" is not found. make sure qslurm has been installed correctly \
                 and the wrapper script exists next to the binary.",
                self.ctx.wrapper_path.display()
            );
        }
        self.args.push(self.ctx.wrapper_path.display().to_string());
        Ok(())
    }

    fn append_interpreter(&mut self, legacy: &LegacyArgs, script: &JobScript) {
        if legacy.binary_job == Some(true) {
            self.push_flag("/bin/sh");
            return;
        }

        if let Some(spec) = &legacy.interpreter {
            let path = use_first(spec, "-S");
            let path = strip_host(path, "-S").to_string();
            self.args.push(path);
            return;
        }

        log::warn!("interpreter for given script is not specified by `-S` option.");
        if let Some(tokens) = catch_shebang(&script.body) {
            log::warn!("use `{}` as interpreter", tokens.join(" "));
            self.args.extend(tokens);
            return;
        }
        log::warn!("use `/bin/sh` anyway.");
        self.push_flag("/bin/sh");
    }

    fn append_trailing(&mut self, legacy: &LegacyArgs, script: &JobScript) {
        if !legacy.command.is_empty() {
            self.args.extend(legacy.command.iter().cloned());
        } else if let Some(path) = &script.path {
            self.args.push(path.display().to_string());
        }
    }
}

fn is_numeric(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
}

fn hostname() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
}

fn username() -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|user| user.name)
        .or_else(|| env::var("USER").ok())
        .or_else(|| env::var("LOGNAME").ok())
}

/// Keeps the first entry of a multi-valued path/user spec, warning when
/// more were given.
fn use_first<'v>(value: &'v [String], option_name: &str) -> &'v str {
    let first = value.first().map(String::as_str).unwrap_or_default();
    if value.len() > 1 {
        log::warn!(
            "setting multiple paths for \"{}\" option is not supported. use first one: {}",
            option_name,
            first
        );
    }
    first
}

/// Strips a `host:` prefix. A bare leading separator is dropped silently;
/// an actual host name is unsupported and dropped with a warning.
fn strip_host<'v>(path: &'v str, option_name: &str) -> &'v str {
    if let Some(stripped) = path.strip_prefix(':') {
        return stripped.trim_start_matches(':');
    }
    match path.split_once(':') {
        Some((_, rest)) => {
            log::warn!(
                "\"hostname\" specification in \"{}\" option is not supported.",
                option_name
            );
            rest
        }
        None => path,
    }
}

/// First-line shebang whose interpreter actually exists on disk.
fn catch_shebang(body: &str) -> Option<Vec<String>> {
    let head = body.lines().next()?;
    let rest = head.strip_prefix("#!")?;
    let tokens = shlex::split(rest)?;
    let interpreter = tokens.first()?;
    if Path::new(interpreter).exists() {
        Some(tokens)
    } else {
        None
    }
}
