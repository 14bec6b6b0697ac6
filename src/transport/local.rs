//! Local execution through `sh`.

use super::ExecOutput;
use std::io::Write;
use std::process::{Command, Stdio};

const SHELL: &str = "sh";

/// Pipe a script into `sh` and capture stdout/stderr.
pub fn exec_local(script: &str) -> Result<ExecOutput, String> {
    let mut child = Command::new(SHELL)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn {}: {}", SHELL, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(script.as_bytes())
            .map_err(|e| format!("stdin write error: {}", e))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| format!("wait error: {}", e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `sh -c command` with the caller's stdin/stdout/stderr.
/// A signal-terminated child reports -1.
pub fn exec_attached(command: &str) -> Result<i32, String> {
    let status = Command::new(SHELL)
        .arg("-c")
        .arg(command)
        .status()
        .map_err(|e| format!("failed to spawn {}: {}", SHELL, e))?;
    Ok(status.code().unwrap_or(-1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_capture_echo() {
        let out = exec_local("echo hello").unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_local_capture_exit_code() {
        let out = exec_local("exit 42").unwrap();
        assert_eq!(out.exit_code, 42);
    }

    #[test]
    fn test_local_capture_stderr() {
        let out = exec_local("echo oops >&2").unwrap();
        assert!(out.stderr.contains("oops"));
        assert!(out.stdout.is_empty());
    }

    #[test]
    fn test_local_capture_multiline() {
        let out = exec_local("echo one\necho two").unwrap();
        assert_eq!(out.stdout.lines().collect::<Vec<_>>(), vec!["one", "two"]);
    }

    #[test]
    fn test_local_signal_is_minus_one() {
        assert_eq!(exec_attached("kill -9 $$").unwrap(), -1);
    }

    #[test]
    fn test_local_attached_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let cmd = format!("echo data > '{}'", path.display());
        assert_eq!(exec_attached(&cmd).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "data\n");
    }
}
