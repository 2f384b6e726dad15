// src/core/script.rs

use crate::cli::parser;
use crate::constants::{DEFAULT_DIRECTIVE_PREFIX, TEMP_SCRIPT_PREFIX};
use crate::core::model::LegacyArgs;
use anyhow::{Context, Result, bail};
use chrono::Local;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fs::{self, OpenOptions};
use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

/// Where the job body came from. Slurm always needs an on-disk script
/// path, so stdin and binary-command jobs are materialized to a temp file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSource {
    Stdin,
    BinaryCommand,
    File,
}

/// The job body plus its provenance.
#[derive(Debug)]
pub struct JobScript {
    pub body: String,
    /// On-disk location; always `Some` once loading finished.
    pub path: Option<PathBuf>,
    pub source: ScriptSource,
}

impl JobScript {
    /// Base name of the on-disk script, used for job-name defaulting.
    pub fn base_name(&self) -> Option<String> {
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
    }
}

/// Obtains the job body per the `qsub` rules, enriches `args` with
/// script-derived defaults (directive lines, default job name) and
/// materializes a temp script when no on-disk path exists.
pub fn load(args: &mut LegacyArgs) -> Result<JobScript> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let stdin = if args.command.is_empty() {
        read_stdin()
    } else {
        None
    };
    load_with(args, stdin, &home)
}

fn read_stdin() -> Option<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return None;
    }
    let mut body = String::new();
    stdin.lock().read_to_string(&mut body).ok()?;
    Some(body)
}

fn load_with(
    args: &mut LegacyArgs,
    stdin: Option<String>,
    temp_dir: &Path,
) -> Result<JobScript> {
    let mut temp_required = false;

    let (body, mut path, source) = if args.command.is_empty() {
        if args.binary_job == Some(true) {
            bail!("command required for a binary job");
        }
        let body = stdin.filter(|body| !body.is_empty());
        let Some(body) = body else {
            bail!("no input read from stdin");
        };
        temp_required = true;
        if args.job_name.is_none() {
            args.job_name = Some("STDIN".to_string());
        }
        (body, None, ScriptSource::Stdin)
    } else {
        let first = args.command[0].clone();
        if args.binary_job == Some(true) {
            temp_required = true;
            if args.job_name.is_none() {
                args.job_name = Some(first);
            }
            (args.command.join(" "), None, ScriptSource::BinaryCommand)
        } else {
            let body = fs::read_to_string(&first)
                .with_context(|| format!("failed to open script \"{}\"", first))?;
            (body, Some(PathBuf::from(first)), ScriptSource::File)
        }
    };

    if temp_required {
        let temp_path = write_temp_script(temp_dir, &body)?;
        log::warn!("write temporary script to \"{}\"", temp_path.display());
        path = Some(temp_path);
        args.command.clear();
    }

    merge_directives(args, &body)?;

    Ok(JobScript { body, path, source })
}

/// Extracts directive lines (marker default `#$`, overridable via `-C`),
/// tokenizes them with shell word splitting and merges the parsed flags at
/// lower precedence than the explicit command line.
fn merge_directives(args: &mut LegacyArgs, body: &str) -> Result<()> {
    let marker = args
        .directive_prefix
        .clone()
        .unwrap_or_else(|| DEFAULT_DIRECTIVE_PREFIX.to_string());
    if marker.is_empty() {
        return Ok(());
    }

    let mut collected = Vec::new();
    for line in body.lines() {
        if let Some(rest) = line.strip_prefix(&marker) {
            collected.push(rest.trim());
        }
    }
    if collected.is_empty() {
        return Ok(());
    }

    let tokens = shlex::split(&collected.join(" "))
        .context("invalid quoting in script directive lines")?;
    let extra = parser::parse_directive_args(&tokens).context("invalid argument in the script")?;
    args.merge_from(extra);
    Ok(())
}

/// Writes the body to a fresh, uniquely named file. The name is
/// timestamp-based; a same-second retry appends three random alphanumeric
/// characters. An existing file is never overwritten.
fn write_temp_script(dir: &Path, body: &str) -> Result<PathBuf> {
    let mut last_stamp: Option<String> = None;

    loop {
        let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
        let name = if last_stamp.as_deref() == Some(stamp.as_str()) {
            format!("{}-{}-{}", TEMP_SCRIPT_PREFIX, stamp, random_suffix())
        } else {
            format!("{}-{}", TEMP_SCRIPT_PREFIX, stamp)
        };
        last_stamp = Some(stamp);

        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(body.as_bytes())
                    .with_context(|| format!("failed to write \"{}\"", path.display()))?;
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to create \"{}\"", path.display()));
            }
        }
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(3)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn args_with_command(command: &[&str]) -> LegacyArgs {
        LegacyArgs {
            command: command.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_file_script_with_directives() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.sh");
        fs::write(
            &script,
            "#!/bin/bash\n#$ -N nightly -l mem_req=2G\necho run\n",
        )
        .unwrap();

        let mut args = args_with_command(&[script.to_str().unwrap()]);
        let job = load_with(&mut args, None, dir.path()).unwrap();

        assert_eq!(job.source, ScriptSource::File);
        assert_eq!(job.path.as_deref(), Some(script.as_path()));
        assert_eq!(args.job_name.as_deref(), Some("nightly"));
        assert!(args.resources.is_some());
        // The original command (script + args) stays for the final argv.
        assert_eq!(args.command.len(), 1);
    }

    #[test]
    fn test_command_line_beats_directives() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.sh");
        fs::write(&script, "#$ -N from-script\n").unwrap();

        let mut args = args_with_command(&[script.to_str().unwrap()]);
        args.job_name = Some("from-cli".to_string());
        load_with(&mut args, None, dir.path()).unwrap();

        assert_eq!(args.job_name.as_deref(), Some("from-cli"));
    }

    #[test]
    fn test_custom_directive_marker() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.sh");
        fs::write(&script, "#$ -N ignored\n#SGE -N custom\n").unwrap();

        let mut args = args_with_command(&[script.to_str().unwrap()]);
        args.directive_prefix = Some("#SGE".to_string());
        load_with(&mut args, None, dir.path()).unwrap();

        assert_eq!(args.job_name.as_deref(), Some("custom"));
    }

    #[test]
    fn test_stdin_script_is_materialized() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = LegacyArgs::default();
        let job = load_with(&mut args, Some("echo hi\n".to_string()), dir.path()).unwrap();

        assert_eq!(job.source, ScriptSource::Stdin);
        assert_eq!(args.job_name.as_deref(), Some("STDIN"));
        let path = job.path.unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("qslurm-"));
        assert_eq!(fs::read_to_string(path).unwrap(), "echo hi\n");
    }

    #[test]
    fn test_empty_stdin_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = LegacyArgs::default();
        assert!(load_with(&mut args, Some(String::new()), dir.path()).is_err());
        assert!(load_with(&mut args, None, dir.path()).is_err());
    }

    #[test]
    fn test_binary_job_requires_a_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = LegacyArgs {
            binary_job: Some(true),
            ..Default::default()
        };
        let err = load_with(&mut args, None, dir.path()).unwrap_err();
        assert!(err.to_string().contains("command required"));
    }

    #[test]
    fn test_binary_job_joins_command_and_clears_it() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args_with_command(&["hostname", "-f"]);
        args.binary_job = Some(true);
        let job = load_with(&mut args, None, dir.path()).unwrap();

        assert_eq!(job.source, ScriptSource::BinaryCommand);
        assert_eq!(job.body, "hostname -f");
        assert_eq!(args.job_name.as_deref(), Some("hostname"));
        assert!(args.command.is_empty());
        assert!(job.path.is_some());
    }

    #[test]
    fn test_temp_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_temp_script(dir.path(), "a\n").unwrap();
        let second = write_temp_script(dir.path(), "b\n").unwrap();
        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(&first).unwrap(), "a\n");
        assert_eq!(fs::read_to_string(&second).unwrap(), "b\n");
    }
}
