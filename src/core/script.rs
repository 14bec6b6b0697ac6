//! Dependency resolution over a merged spec.
//!
//! `resolve_depends` expands a target's `depends` entry depth-first into a
//! linear order ending with the target itself. Dependencies without their
//! own entry are leaves. Duplicates across branches are kept; only
//! `resolve_targets` collapses adjacent repeats.

use super::error::VellumError;
use super::types::{Scope, Spec, Value};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct Script {
    pub spec: Spec,
}

/// Drop each entry equal to its immediate predecessor.
pub fn reduce_targets(building: &[String]) -> Vec<String> {
    let mut reduced: Vec<String> = Vec::with_capacity(building.len());
    for target in building {
        if reduced.last() != Some(target) {
            reduced.push(target.clone());
        }
    }
    reduced
}

impl Script {
    pub fn new(spec: Spec) -> Script {
        Script { spec }
    }

    pub fn options(&self) -> &Scope {
        &self.spec.options
    }

    /// A real target has a non-empty body; names only in `depends` are virtual.
    pub fn is_target(&self, name: &str) -> bool {
        self.spec
            .targets
            .get(name)
            .map(Value::is_truthy)
            .unwrap_or(false)
    }

    /// Build order for `root`: its dependencies, then `root`.
    pub fn resolve_depends(&self, root: &str) -> Result<Vec<String>, VellumError> {
        let mut active = Vec::new();
        self.expand(root, &mut active)
    }

    fn expand(&self, root: &str, active: &mut Vec<String>) -> Result<Vec<String>, VellumError> {
        active.push(root.to_string());
        let mut building: Vec<String> = Vec::new();
        if let Some(deps) = self.spec.depends.get(root) {
            for dep in deps {
                if self.spec.depends.contains_key(dep) && !building.contains(dep) {
                    if let Some(start) = active.iter().position(|a| a == dep) {
                        let mut cycle = active[start..].to_vec();
                        cycle.push(dep.clone());
                        return Err(VellumError::Config(format!(
                            "dependency cycle: {}",
                            cycle.join(" -> ")
                        )));
                    }
                    building.extend(self.expand(dep, active)?);
                } else {
                    building.push(dep.clone());
                }
            }
        }
        active.pop();
        building.push(root.to_string());
        Ok(building)
    }

    /// Full build order for the requested targets, or for the default.
    pub fn resolve_targets(&self, requested: &[String]) -> Result<Vec<String>, VellumError> {
        if requested.is_empty() {
            let default = match self.spec.options.get("default") {
                Some(Value::Str(name)) => name.clone(),
                Some(other) => {
                    return Err(VellumError::Config(format!(
                        "the default target must be a name, got {}",
                        other.repr()
                    )))
                }
                None => {
                    return Err(VellumError::Config(
                        "You forgot to specify a default target and didn't give one on the command line."
                            .to_string(),
                    ))
                }
            };
            return self.resolve_depends(&default);
        }

        let mut building = Vec::new();
        for target in requested {
            building.extend(self.resolve_depends(target)?);
        }
        Ok(reduce_targets(&building))
    }

    /// Every known target (real or virtual), sorted.
    pub fn target_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .spec
            .targets
            .keys()
            .chain(self.spec.depends.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Options, every target with its build order, and the default target.
    pub fn show(&self) -> Result<String, VellumError> {
        let mut out = String::from("OPTIONS:\n");
        for (key, value) in &self.spec.options {
            out.push_str(&format!("    {}: {}\n", key, value.repr()));
        }
        out.push_str("\nTARGETS:\n");
        for target in self.target_names() {
            let order: Vec<String> = self
                .resolve_depends(target)?
                .iter()
                .map(|t| Value::str(t.as_str()).repr())
                .collect();
            out.push_str(&format!("{}:\t[{}]\n", target, order.join(", ")));
        }
        let default = self
            .spec
            .options
            .get("default")
            .map(Value::to_string)
            .unwrap_or_else(|| "None".to_string());
        out.push_str(&format!("\nDEFAULT: {}\n", default));
        Ok(out)
    }

    /// Commands, imports, depends entries and targets whose rendering
    /// matches `pattern`.
    pub fn search(&self, pattern: &str) -> Result<Vec<String>, VellumError> {
        let re = Regex::new(pattern)
            .map_err(|e| VellumError::Config(format!("invalid search pattern: {}", e)))?;

        let mut names: Vec<&String> = self.spec.commands.keys().collect();
        names.sort();
        let candidates = names
            .into_iter()
            .map(|name| format!("command {}", name))
            .chain(self.spec.imports.iter().map(|r| format!("import {}", r)))
            .chain(self.spec.depends.iter().map(|(name, deps)| {
                let quoted: Vec<String> = deps
                    .iter()
                    .map(|d| Value::str(d.as_str()).repr())
                    .collect();
                format!("depends {}: [{}]", name, quoted.join(", "))
            }))
            .chain(
                self.spec
                    .targets
                    .iter()
                    .map(|(name, body)| format!("target {}: {}", name, body.repr())),
            );
        Ok(candidates.filter(|line| re.is_match(line)).collect())
    }
}
