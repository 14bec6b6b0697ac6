//! Control flow: `needs`, `given`, `unless`.

use super::Args;
use crate::core::error::VellumError;
use crate::core::expr;
use crate::core::scribe::Scribe;
use crate::core::types::Value;

pub const NEEDS_HELP: &str = "\
Runs the listed targets before the rest of this target continues.
Use it for dependencies that don't belong in the depends stanza.

Usage: needs ['clean' 'build' 'dist']";

pub const GIVEN_HELP: &str = "\
Evaluates the expression and stops this target unless it is true.
Read it as: given X is true, continue. Ignored with --force.

Usage: given 'exists(\"/etc/passwd\")'";

pub const UNLESS_HELP: &str = "\
The inverse of given: stops this target if the expression is true.
Ignored with --force.

Usage: unless 'isdir(\"build\")'";

pub fn needs(scribe: &mut Scribe, args: Args<'_>) -> Result<bool, VellumError> {
    let names: &[Value] = match args.positional() {
        Value::Seq(items) => items,
        single @ Value::Str(_) => std::slice::from_ref(single),
        other => {
            scribe.die(
                "needs",
                format!("expected a list of target names, got {}", other.repr()),
            )?;
            return Ok(false);
        }
    };

    for item in names {
        match item {
            Value::Str(target) if scribe.is_target(target) => {
                scribe.transition_nested(target)?;
            }
            Value::Str(target) => {
                scribe.die(
                    target.as_str(),
                    format!("target {} isn't in the targets list", target),
                )?;
            }
            other => {
                scribe.die(
                    "needs",
                    format!("target names must be strings, got {}", other.repr()),
                )?;
            }
        }
    }
    Ok(false)
}

/// Evaluate the condition. `None` means no decision: `force` is set, or a
/// failure was swallowed by `keep_going`.
fn condition(
    scribe: &mut Scribe,
    name: &str,
    args: Args<'_>,
) -> Result<Option<bool>, VellumError> {
    let Some(text) = Args::text(args.positional()) else {
        scribe.die(
            name,
            format!(
                "expected an expression string, got {}",
                args.positional().repr()
            ),
        )?;
        return Ok(None);
    };
    let Some(formatted) = scribe.interpolate(name, &text)? else {
        return Ok(None);
    };
    let shown = Value::str(formatted.as_str()).repr();
    scribe.log(format!(" {}: {}", name, shown));

    if scribe.flag("force") {
        return Ok(None);
    }
    match expr::eval_expr(&formatted, scribe.scope()) {
        Ok(value) => Ok(Some(value.is_truthy())),
        Err(e) => {
            scribe.die(format!("{} {}", name, shown), e.message)?;
            Ok(None)
        }
    }
}

pub fn given(scribe: &mut Scribe, args: Args<'_>) -> Result<bool, VellumError> {
    Ok(condition(scribe, "given", args)? == Some(false))
}

pub fn unless(scribe: &mut Scribe, args: Args<'_>) -> Result<bool, VellumError> {
    Ok(condition(scribe, "unless", args)? == Some(true))
}
