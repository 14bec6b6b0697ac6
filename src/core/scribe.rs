//! Execution engine: walks the resolved build order and runs target bodies.
//!
//! The engine owns the variable scope. `push_scope` saves the current scope
//! and overlays new bindings on a copy; `pop_scope` moves the saved scope
//! back. Commands that run nested bodies go through [`Scribe::with_scope`]
//! so the stack stays balanced on every exit path.

use super::error::{Diagnostic, VellumError};
use super::eventlog;
use super::script::Script;
use super::settings::SearchPaths;
use super::template;
use super::types::{BuildEvent, BuildReport, Scope, Value};
use crate::commands::{shell, Command};
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

/// Options the engine always defines.
pub const ENGINE_OPTIONS: &[&str] = &["verbose", "dry_run", "keep_going", "force"];

pub struct Scribe {
    script: Script,
    options: Scope,
    stack: Vec<Scope>,
    target: String,
    line: usize,
    bodies: HashMap<String, Rc<[Value]>>,
    paths: SearchPaths,
    journal: Option<PathBuf>,
    run_id: String,
}

/// Split a target body into executable units.
///
/// Lists are used as-is, a lone reference becomes a one-element list and a
/// string is split on newlines. Anything else is malformed.
pub fn normalize_body(body: &Value) -> Option<Vec<Value>> {
    match body {
        Value::Seq(items) => Some(items.clone()),
        Value::Reference(_) => Some(vec![body.clone()]),
        Value::Str(s) => Some(s.split('\n').map(Value::str).collect()),
        _ => None,
    }
}

impl Scribe {
    pub fn new(script: Script, paths: SearchPaths) -> Scribe {
        let mut options = script.options().clone();
        for name in ENGINE_OPTIONS {
            options
                .entry(name.to_string())
                .or_insert(Value::Bool(false));
        }
        Scribe {
            script,
            options,
            stack: Vec::new(),
            target: String::new(),
            line: 1,
            bodies: HashMap::new(),
            paths,
            journal: None,
            run_id: eventlog::generate_run_id(),
        }
    }

    /// Append build events to `path` as JSONL.
    pub fn with_journal(mut self, path: Option<PathBuf>) -> Scribe {
        self.journal = path;
        self
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn paths(&self) -> &SearchPaths {
        &self.paths
    }

    pub fn scope(&self) -> &Scope {
        &self.options
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        &mut self.options
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.option(name).map(Value::is_truthy).unwrap_or(false)
    }

    pub fn set_option(&mut self, name: &str, value: impl Into<Value>) {
        self.options.insert(name.to_string(), value.into());
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn is_target(&self, name: &str) -> bool {
        self.script.is_target(name)
    }

    /// Print `msg` when `verbose` is set.
    pub fn log(&self, msg: impl AsRef<str>) {
        if self.flag("verbose") {
            println!("{}", msg.as_ref());
        }
    }

    /// Report a command failure at the current target and line.
    ///
    /// Returns the diagnostic as an error, unless `keep_going` is set, in
    /// which case it is logged as a warning and `Ok(())` is returned.
    pub fn die(
        &mut self,
        command: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), VellumError> {
        let diagnostic = Diagnostic {
            target: self.target.clone(),
            line: self.line,
            command: command.into(),
            message: message.into(),
        };
        let error = VellumError::from(diagnostic.clone());
        let suppressed = self.flag("keep_going") && error.is_suppressible();
        self.record(BuildEvent::CommandFailed {
            target: diagnostic.target,
            line: diagnostic.line,
            command: diagnostic.command,
            message: diagnostic.message,
            suppressed,
        });
        if suppressed {
            log::warn!("{}", error);
            Ok(())
        } else {
            Err(error)
        }
    }

    /// Render `text` against the current scope. A rendering failure goes
    /// through [`Scribe::die`]; `Ok(None)` means it was suppressed.
    pub fn interpolate(
        &mut self,
        command: &str,
        text: &str,
    ) -> Result<Option<String>, VellumError> {
        match template::render(text, &self.options) {
            Ok(rendered) => Ok(Some(rendered)),
            Err(e) => {
                let name = format!("{} {}", command, Value::str(text).repr());
                self.die(name, e.to_string())?;
                Ok(None)
            }
        }
    }

    pub fn push_scope(&mut self, vars: Scope) {
        let mut next = self.options.clone();
        next.extend(vars);
        let previous = std::mem::replace(&mut self.options, next);
        self.stack.push(previous);
    }

    pub fn pop_scope(&mut self) -> Result<(), VellumError> {
        self.options = self.stack.pop().ok_or_else(|| {
            VellumError::Internal("pop_scope called without a matching push_scope".to_string())
        })?;
        Ok(())
    }

    /// Run `f` with `vars` pushed, popping afterwards whatever `f` returns.
    pub fn with_scope<T>(
        &mut self,
        vars: Scope,
        f: impl FnOnce(&mut Scribe) -> Result<T, VellumError>,
    ) -> Result<T, VellumError> {
        self.push_scope(vars);
        let result = f(self);
        let popped = self.pop_scope();
        let value = result?;
        popped?;
        Ok(value)
    }

    /// Execute a body (string, reference or list). Returns whether a command
    /// stopped it.
    pub fn execute(&mut self, body: &Value) -> Result<bool, VellumError> {
        match normalize_body(body) {
            Some(units) => Ok(self.run_units(&units)?.is_some()),
            None => {
                self.die(
                    "execute",
                    "Definition of target isn't a list, command, or string.",
                )?;
                Ok(false)
            }
        }
    }

    // Returns the name of the command that stopped the body, if any.
    fn run_units(&mut self, units: &[Value]) -> Result<Option<String>, VellumError> {
        for unit in units {
            self.line += 1;
            self.check_leaks()?;
            match unit {
                Value::Str(text) => {
                    let line = text.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let sh = self
                        .script
                        .spec
                        .commands
                        .get("sh")
                        .cloned()
                        .unwrap_or_else(|| Command::builtin(shell::sh, shell::SH_HELP));
                    if sh.invoke(self, &Value::str(line))? {
                        self.log(format!("<-- sh({})", Value::str(line).repr()));
                        return Ok(Some("sh".to_string()));
                    }
                }
                Value::Reference(reference) => {
                    match self.script.spec.commands.get(&reference.name).cloned() {
                        Some(command) => {
                            if command.invoke(self, &reference.expr)? {
                                self.log(format!("<-- {}", reference));
                                return Ok(Some(reference.name.clone()));
                            }
                        }
                        None => {
                            let available = self.command_names().join(", ");
                            self.die(
                                reference.to_string(),
                                format!(
                                    "Invalid command reference, available commands are: [{}]",
                                    available
                                ),
                            )?;
                        }
                    }
                }
                other => {
                    self.die(
                        other.repr(),
                        format!(
                            "expected a shell line or a command reference, got a {}",
                            other.kind()
                        ),
                    )?;
                }
            }
        }
        Ok(None)
    }

    fn check_leaks(&self) -> Result<(), VellumError> {
        let leaked: Vec<&str> = self
            .options
            .keys()
            .filter(|k| k.starts_with("__"))
            .map(String::as_str)
            .collect();
        if leaked.is_empty() {
            Ok(())
        } else {
            Err(VellumError::Internal(format!(
                "leaked globals [{}] into target {}, use push_scope and pop_scope",
                leaked.join(", "),
                self.target
            )))
        }
    }

    /// Sorted names of every loaded command.
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.script.spec.commands.keys().cloned().collect();
        names.sort();
        names
    }

    fn body_of(&mut self, target: &str) -> Option<Rc<[Value]>> {
        if let Some(units) = self.bodies.get(target) {
            return Some(Rc::clone(units));
        }
        let units: Rc<[Value]> = normalize_body(self.script.spec.targets.get(target)?)?.into();
        self.bodies.insert(target.to_string(), Rc::clone(&units));
        Some(units)
    }

    /// Make `target` current and run its body. Returns whether it stopped.
    pub fn transition(&mut self, target: &str) -> Result<bool, VellumError> {
        if !self.is_target(target) {
            return Err(VellumError::Internal(format!(
                "cannot transition to '{}', it has no body",
                target
            )));
        }
        self.line = 0;
        self.target = target.to_string();

        let Some(units) = self.body_of(target) else {
            self.die(
                "parse_target",
                "Definition of target isn't a list, command, or string.",
            )?;
            return Ok(false);
        };

        let started = Instant::now();
        self.record(BuildEvent::TargetStarted {
            target: target.to_string(),
        });
        match self.run_units(&units)? {
            Some(command) => {
                self.record(BuildEvent::TargetStopped {
                    target: target.to_string(),
                    line: self.line,
                    command,
                });
                Ok(true)
            }
            None => {
                self.record(BuildEvent::TargetCompleted {
                    target: target.to_string(),
                    duration_seconds: started.elapsed().as_secs_f64(),
                });
                Ok(false)
            }
        }
    }

    /// [`Scribe::transition`] from inside another target; the caller's target
    /// and line are restored afterwards.
    pub fn transition_nested(&mut self, target: &str) -> Result<bool, VellumError> {
        let caller = std::mem::take(&mut self.target);
        let line = self.line;
        let result = self.transition(target);
        self.target = caller;
        self.line = line;
        result
    }

    /// Resolve `requested` (or the default) and run every real target.
    pub fn build(&mut self, requested: &[String]) -> Result<BuildReport, VellumError> {
        let started = Instant::now();
        let building = self.script.resolve_targets(requested)?;
        let listing = Value::Seq(building.iter().map(|t| Value::str(t.as_str())).collect());
        self.log(format!("BUILDING: {}", listing));
        self.record(BuildEvent::BuildStarted {
            run_id: self.run_id.clone(),
            targets: building.clone(),
            vellum_version: env!("CARGO_PKG_VERSION").to_string(),
        });

        let mut report = BuildReport {
            building: building.clone(),
            ..BuildReport::default()
        };
        let result = self.run_targets(&building, &mut report);
        report.total_duration = started.elapsed();

        self.record(BuildEvent::BuildCompleted {
            run_id: self.run_id.clone(),
            targets_run: report.targets_run,
            targets_stopped: report.targets_stopped,
            success: result.is_ok(),
            total_seconds: report.total_duration.as_secs_f64(),
        });
        result.map(|()| report)
    }

    fn run_targets(
        &mut self,
        building: &[String],
        report: &mut BuildReport,
    ) -> Result<(), VellumError> {
        for target in building {
            if !self.is_target(target) {
                log::debug!("skipping virtual target {}", target);
                continue;
            }
            self.log(format!("-->: {}", target));
            let stopped = self.transition(target)?;
            report.targets_run += 1;
            if stopped {
                report.targets_stopped += 1;
            }
        }
        Ok(())
    }

    fn record(&self, event: BuildEvent) {
        if let Some(path) = &self.journal {
            if let Err(e) = eventlog::append_event(path, event) {
                log::warn!("build journal: {}", e);
            }
        }
    }
}
