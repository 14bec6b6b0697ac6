//! Commands that run code: `sh`, `eval`, `log`, and program modules.

use super::Args;
use crate::core::error::VellumError;
use crate::core::expr;
use crate::core::scribe::Scribe;
use crate::core::types::{Scope, Value};
use crate::transport;
use std::path::Path;

pub const SH_HELP: &str = "\
Runs the given string (or list of strings, joined) as a shell command,
failing the target if it exits non-zero.

Usage: sh 'echo \"test\"'";

pub const LOG_HELP: &str = "\
Logs the string to the user.

Usage: log \"hi there user\"";

pub const EVAL_HELP: &str = "\
Runs the given statements (a string or list of strings, joined) in the
expression language. Options are visible as variables; assignments last
until the command ends. The current target is bound to __target__.

Usage: eval \"print 'building', name\"";

fn text_or_die(
    scribe: &mut Scribe,
    command: &str,
    args: Args<'_>,
) -> Result<Option<String>, VellumError> {
    match Args::text(args.positional()) {
        Some(text) => Ok(Some(text)),
        None => {
            scribe.die(
                command,
                format!(
                    "expected a string or a list of strings, got {}",
                    args.positional().repr()
                ),
            )?;
            Ok(None)
        }
    }
}

pub fn sh(scribe: &mut Scribe, args: Args<'_>) -> Result<bool, VellumError> {
    let Some(text) = text_or_die(scribe, "sh", args)? else {
        return Ok(false);
    };
    let Some(command) = scribe.interpolate("sh", &text)? else {
        return Ok(false);
    };
    scribe.log(format!(" sh: {}", Value::str(command.as_str()).repr()));
    if scribe.flag("dry_run") {
        return Ok(false);
    }
    run_checked(scribe, "sh", &command)?;
    Ok(false)
}

fn run_checked(scribe: &mut Scribe, name: &str, command: &str) -> Result<(), VellumError> {
    match transport::run_attached(command) {
        Ok(0) => Ok(()),
        Ok(code) => scribe.die(name, format!("exit code {}", code)),
        Err(e) => scribe.die(name, e),
    }
}

pub fn log(scribe: &mut Scribe, args: Args<'_>) -> Result<bool, VellumError> {
    let Some(text) = text_or_die(scribe, "log", args)? else {
        return Ok(false);
    };
    if let Some(message) = scribe.interpolate("log", &text)? {
        scribe.log(format!(" {}", message));
    }
    Ok(false)
}

pub fn eval(scribe: &mut Scribe, args: Args<'_>) -> Result<bool, VellumError> {
    let Some(text) = text_or_die(scribe, "eval", args)? else {
        return Ok(false);
    };
    let Some(code) = scribe.interpolate("eval", &text)? else {
        return Ok(false);
    };
    let shown = Value::str(code.as_str()).repr();
    scribe.log(format!(" eval: {}", shown));
    if scribe.flag("dry_run") {
        return Ok(false);
    }

    let mut vars = Scope::new();
    vars.insert("__target__".to_string(), Value::str(scribe.target()));
    let outcome = scribe.with_scope(vars, |inner| {
        let mut stdout = std::io::stdout().lock();
        Ok(expr::exec(&code, inner.scope_mut(), &mut stdout))
    })?;
    if let Err(e) = outcome {
        scribe.die(format!("eval {}", shown), e.message)?;
    }
    Ok(false)
}

/// Run an executable from a program module.
///
/// Named parameters become `--key=value` options; a positional string (or
/// list of strings, space separated) is appended for the shell to expand.
pub fn program(scribe: &mut Scribe, path: &Path, args: Args<'_>) -> Result<bool, VellumError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut named = Vec::new();
    let mut positional = String::new();
    match args.positional() {
        Value::Map(params) => {
            for (key, value) in params {
                let raw = match value {
                    Value::Str(s) => s.clone(),
                    Value::Int(_) | Value::Bool(_) => value.to_string(),
                    other => {
                        scribe.die(
                            name.as_str(),
                            format!(
                                "parameter {} must be a string or number, got a {}",
                                key,
                                other.kind()
                            ),
                        )?;
                        return Ok(false);
                    }
                };
                let Some(rendered) = scribe.interpolate(&name, &raw)? else {
                    return Ok(false);
                };
                named.push((key.clone(), rendered));
            }
        }
        Value::Str(s) => positional = s.clone(),
        Value::Seq(items) if items.iter().all(|i| i.as_str().is_some()) => {
            let words: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            positional = words.join(" ");
        }
        other => {
            scribe.die(
                name.as_str(),
                format!(
                    "expected a string, list of strings or named parameters, got {}",
                    other.repr()
                ),
            )?;
            return Ok(false);
        }
    }
    if !positional.is_empty() {
        match scribe.interpolate(&name, &positional)? {
            Some(rendered) => positional = rendered,
            None => return Ok(false),
        }
    }

    let command = transport::program_command(path, &named, &positional);
    scribe.log(format!(" {}: {}", name, command));
    if scribe.flag("dry_run") {
        return Ok(false);
    }
    run_checked(scribe, &name, &command)?;
    Ok(false)
}
