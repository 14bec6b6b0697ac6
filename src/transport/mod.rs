//! Process execution: shell lines and program-module commands.
//!
//! Build commands run with the terminal attached ([`run_attached`]); the
//! `output()` expression builtin captures stdout instead ([`capture`]).

pub mod local;

use std::path::Path;

/// Output from a captured command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a shell line with inherited stdio and return its exit code.
pub fn run_attached(command: &str) -> Result<i32, String> {
    log::debug!("sh -c {:?}", command);
    local::exec_attached(command)
}

/// Run a shell script and capture its output.
pub fn capture(script: &str) -> Result<ExecOutput, String> {
    log::debug!("capturing {:?}", script);
    local::exec_local(script)
}

/// Quote a word for POSIX `sh` using single quotes.
pub fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Command line for a program module: the quoted program path, named
/// arguments as `--key=value` (quoted), then the positional text verbatim
/// so the shell can expand it.
pub fn program_command(program: &Path, named: &[(String, String)], positional: &str) -> String {
    let mut line = shell_quote(&program.to_string_lossy());
    for (key, value) in named {
        line.push(' ');
        line.push_str(&shell_quote(&format!("--{}={}", key, value)));
    }
    if !positional.is_empty() {
        line.push(' ');
        line.push_str(positional);
    }
    line
}
