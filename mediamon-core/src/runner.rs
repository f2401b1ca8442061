//! Subprocess invocation for matched files.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use async_trait::async_trait;
use tokio::process::Command;

/// Runs one shell command line to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command_line: &str) -> io::Result<ExitStatus>;
}

/// Hands command lines to `<shell> -c`, inheriting stdio.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: PathBuf,
}

impl ShellRunner {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command_line: &str) -> io::Result<ExitStatus> {
        Command::new(&self.shell)
            .arg("-c")
            .arg(command_line)
            .status()
            .await
    }
}

/// Builds `"<program> <file>"`, quoting the file only when the shell would
/// otherwise split or expand it.
pub fn command_line(program: &str, file: &Path) -> String {
    format!("{} {}", program, shell_quote(&file.to_string_lossy()))
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || matches!(c, '/' | '.' | '_' | '-' | '+' | ',' | ':' | '@' | '%')
        });
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
