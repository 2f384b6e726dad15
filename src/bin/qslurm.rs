// src/bin/qslurm.rs

use anyhow::{Context, Result, bail};
use colored::Colorize;
use qslurm::cli::args::{HELP, OutputOptions};
use qslurm::cli::parser::{self, Invocation, Submission};
use qslurm::constants::{EXIT_INTERRUPTED, SBATCH, WRAPPER_FILENAME};
use qslurm::core::mapper::{CommandMapper, MapperContext};
use qslurm::core::preview::Presenter;
use qslurm::core::script;
use qslurm::system::executor::{self, ExecutorError};
use qslurm::system::slurm::SlurmCli;
use std::env;
use std::path::{Path, PathBuf};
use std::process::exit;

fn main() {
    let tokens: Vec<String> = env::args().skip(1).collect();

    let invocation = match parser::parse_command_line(&tokens) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            eprintln!("try `qslurm --help` for the accepted options.");
            exit(1);
        }
    };

    let submission = match invocation {
        Invocation::Help => {
            print!("{}", HELP);
            return;
        }
        Invocation::Version => {
            println!("qslurm {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        Invocation::Submit(submission) => submission,
    };

    init_output(&submission.tool.output);

    match run(*submission) {
        Ok(code) => exit(code),
        Err(e) => {
            if let Some(ExecutorError::Interrupted) = e.downcast_ref::<ExecutorError>() {
                exit(EXIT_INTERRUPTED);
            }
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            exit(1);
        }
    }
}

/// Configures the logger and global coloring before any mapping work runs.
fn init_output(output: &OutputOptions) {
    if !output.color {
        colored::control::set_override(false);
    }
    let style = if output.color {
        env_logger::WriteStyle::Auto
    } else {
        env_logger::WriteStyle::Never
    };
    env_logger::Builder::new()
        .filter_level(output.level)
        .write_style(style)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(submission: Submission) -> Result<i32> {
    let Submission { tool, mut legacy } = submission;

    let script = script::load(&mut legacy)?;

    let bin = match which::which(SBATCH) {
        Ok(path) => path.display().to_string(),
        Err(_) if tool.dry_run => {
            log::warn!("`{}` is not found on PATH; previewing anyway.", SBATCH);
            SBATCH.to_string()
        }
        Err(_) => bail!("`{}` command is not found.", SBATCH),
    };

    let home = dirs::home_dir().context("could not determine home directory")?;
    let ctx = MapperContext {
        bin,
        dry_run: tool.dry_run,
        home,
        memory_resources: &tool.memory_resources,
        cpu_environments: &tool.cpu_environments,
        partition_overrides: &tool.partition_overrides,
        wrapper_path: wrapper_path()?,
        inspector: &SlurmCli,
    };
    let command = CommandMapper::new(ctx).convert(&legacy, &script)?;

    if tool.dry_run {
        Presenter::new(tool.output.color).print_preview(&command);
        return Ok(0);
    }

    let (binary, args) = command
        .split_first()
        .context("converted command is empty")?;
    let code = executor::run_inherited(Path::new(binary), args)?;
    Ok(code)
}

/// The wrapper script ships next to the installed binary.
fn wrapper_path() -> Result<PathBuf> {
    let exe = env::current_exe().context("could not locate the qslurm binary")?;
    let dir = exe
        .parent()
        .context("the qslurm binary has no parent directory")?;
    Ok(dir.join(WRAPPER_FILENAME))
}
