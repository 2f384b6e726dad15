// src/core/preview.rs

use colored::Colorize;

/// Flags that never consume a following value. Everything else starting
/// with `--` is rendered together with its value token.
const BOOLEAN_FLAGS: &[&str] = &[
    "--hold",
    "--requeue",
    "--no-requeue",
    "--parsable",
    "--test-only",
];

/// Renders the converted command for dry runs, one flag per line so long
/// submissions stay readable.
pub struct Presenter {
    color: bool,
}

impl Presenter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    pub fn print_preview(&self, command: &[String]) {
        println!("{}", self.render(command));
    }

    /// Multi-line shell-style rendering: the binary, one `--flag value`
    /// per continuation line, then the wrapper/interpreter/script tail.
    pub fn render(&self, command: &[String]) -> String {
        let Some((binary, rest)) = command.split_first() else {
            return String::new();
        };

        let mut flag_lines = Vec::new();
        let mut i = 0;
        while i < rest.len() {
            let token = &rest[i];
            if BOOLEAN_FLAGS.contains(&token.as_str()) {
                flag_lines.push(self.paint(token));
                i += 1;
            } else if token.starts_with("--") && i + 1 < rest.len() {
                flag_lines.push(format!("{} {}", self.paint(token), rest[i + 1]));
                i += 2;
            } else {
                break;
            }
        }
        let trailing = rest[i..].join(" ");

        let mut out = String::new();
        out.push_str(&self.paint_binary(binary));
        for line in &flag_lines {
            out.push_str(" \\\n\t");
            out.push_str(line);
        }
        if !trailing.is_empty() {
            out.push_str(" \\\n\t");
            out.push_str(&trailing);
        }
        out
    }

    fn paint(&self, flag: &str) -> String {
        if self.color {
            flag.cyan().to_string()
        } else {
            flag.to_string()
        }
    }

    fn paint_binary(&self, binary: &str) -> String {
        if self.color {
            binary.bold().to_string()
        } else {
            binary.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_pairs_flags_with_values() {
        let presenter = Presenter::new(false);
        let rendered = presenter.render(&command(&[
            "sbatch",
            "--job-name",
            "myjob",
            "--export",
            "NONE",
            "/opt/qslurm-wrapper.sh",
            "/bin/sh",
            "job.sh",
        ]));
        assert_eq!(
            rendered,
            "sbatch \\\n\
             \t--job-name myjob \\\n\
             \t--export NONE \\\n\
             \t/opt/qslurm-wrapper.sh /bin/sh job.sh"
        );
    }

    #[test]
    fn test_render_keeps_boolean_flags_alone() {
        let presenter = Presenter::new(false);
        let rendered = presenter.render(&command(&[
            "sbatch",
            "--hold",
            "--nice",
            "-100",
            "--no-requeue",
            "wrapper.sh",
            "/bin/sh",
            "job.sh",
        ]));
        assert_eq!(
            rendered,
            "sbatch \\\n\
             \t--hold \\\n\
             \t--nice -100 \\\n\
             \t--no-requeue \\\n\
             \twrapper.sh /bin/sh job.sh"
        );
    }

    #[test]
    fn test_render_empty_command() {
        assert_eq!(Presenter::new(false).render(&[]), "");
    }
}
