//! Core types: the parsed value tree, the merged build spec, and build events.
//!
//! The parser produces [`Value`] trees; the loader folds them into a [`Spec`];
//! the engine reads and writes [`Scope`]s and appends [`BuildEvent`]s to the
//! optional JSONL journal.

use crate::commands::CommandSet;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Variable bindings visible to interpolation and scripted commands.
pub type Scope = IndexMap<String, Value>;

// ============================================================================
// Value tree
// ============================================================================

/// A node of the parsed spec tree.
///
/// `Bool` never comes out of the parser; it is used for engine options such
/// as `dry_run` and by the expression language.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Seq(Vec<Value>),
    Map(IndexMap<String, Value>),
    Reference(Box<Reference>),
}

/// "Invoke command (or stanza) `name` with argument `expr`".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reference {
    pub name: String,
    pub expr: Value,
}

impl Reference {
    pub fn new(name: impl Into<String>, expr: Value) -> Self {
        Reference {
            name: name.into(),
            expr,
        }
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn reference(name: impl Into<String>, expr: Value) -> Value {
        Value::Reference(Box::new(Reference::new(name, expr)))
    }

    /// Truthiness: zero, `False`, and empty strings/sequences/maps are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Seq(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Reference(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Seq(_) => "list",
            Value::Map(_) => "mapping",
            Value::Reference(_) => "reference",
        }
    }

    /// Quoted rendering used for `%(key)r` and inside containers.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => quote(s),
            other => other.to_string(),
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Str(s) => write!(f, "{}", s),
            Value::Seq(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", quote(k), v.repr()))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Reference(r) => write!(f, "{}", r),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.expr.repr())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Convert a YAML value (from the settings file) into a spec value.
pub fn value_from_yaml(val: &serde_yaml_ng::Value) -> Value {
    match val {
        serde_yaml_ng::Value::Null => Value::Str(String::new()),
        serde_yaml_ng::Value::Bool(b) => Value::Bool(*b),
        serde_yaml_ng::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Str(n.to_string()),
        },
        serde_yaml_ng::Value::String(s) => Value::Str(s.clone()),
        serde_yaml_ng::Value::Sequence(items) => {
            Value::Seq(items.iter().map(value_from_yaml).collect())
        }
        serde_yaml_ng::Value::Mapping(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (yaml_key(k), value_from_yaml(v)))
                .collect(),
        ),
        serde_yaml_ng::Value::Tagged(tagged) => value_from_yaml(&tagged.value),
    }
}

fn yaml_key(key: &serde_yaml_ng::Value) -> String {
    match key {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        other => format!("{:?}", other),
    }
}

// ============================================================================
// Spec
// ============================================================================

/// A merged build spec: the root recipe plus everything it imports.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Spec {
    /// Build parameters; `default` names the target built when none is given.
    pub options: Scope,

    /// `recipe(...)` / `module(...)` references, in declared order.
    pub imports: Vec<Reference>,

    /// Target name → prerequisite target names.
    pub depends: IndexMap<String, Vec<String>>,

    /// Target name → body.
    pub targets: IndexMap<String, Value>,

    /// Command name → command. Filled by the loader only.
    #[serde(serialize_with = "command_names")]
    pub commands: CommandSet,
}

fn command_names<S: Serializer>(commands: &CommandSet, s: S) -> Result<S::Ok, S::Error> {
    let mut names: Vec<&String> = commands.keys().collect();
    names.sort();
    s.collect_seq(names)
}

impl Spec {
    /// Build a spec from the stanzas produced by the parser.
    ///
    /// Stanza shapes are checked here; unknown stanzas are ignored.
    pub fn from_stanzas(stanzas: IndexMap<String, Value>) -> Result<Spec, String> {
        let mut spec = Spec::default();
        for (stanza, value) in stanzas {
            match stanza.as_str() {
                "options" => spec.options = expect_map(&stanza, value)?,
                "targets" => spec.targets = expect_map(&stanza, value)?,
                "imports" => spec.imports = parse_imports(value)?,
                "depends" => spec.depends = parse_depends(value)?,
                "commands" => {
                    return Err(
                        "commands cannot be defined in a recipe, import a module instead"
                            .to_string(),
                    )
                }
                other => log::warn!("ignoring unknown stanza '{}'", other),
            }
        }
        Ok(spec)
    }
}

fn expect_map(stanza: &str, value: Value) -> Result<IndexMap<String, Value>, String> {
    match value {
        Value::Map(map) => Ok(map),
        other => Err(format!(
            "stanza '{}' must be a mapping, got a {}",
            stanza,
            other.kind()
        )),
    }
}

fn parse_imports(value: Value) -> Result<Vec<Reference>, String> {
    let items = match value {
        Value::Seq(items) => items,
        other => {
            return Err(format!(
                "stanza 'imports' must be a list, got a {}",
                other.kind()
            ))
        }
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Reference(r) => Ok(*r),
            other => Err(format!(
                "imports must be recipe(...) or module(...) references, got {}",
                other.repr()
            )),
        })
        .collect()
}

fn parse_depends(value: Value) -> Result<IndexMap<String, Vec<String>>, String> {
    let map = expect_map("depends", value)?;
    let mut depends = IndexMap::new();
    for (target, deps) in map {
        let names = match deps {
            Value::Seq(items) => items
                .into_iter()
                .map(|d| match d {
                    Value::Str(s) => Ok(s),
                    other => Err(format!(
                        "dependency of '{}' must be a target name, got {}",
                        target,
                        other.repr()
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => {
                return Err(format!(
                    "dependencies of '{}' must be a list, got a {}",
                    target,
                    other.kind()
                ))
            }
        };
        depends.insert(target, names);
    }
    Ok(depends)
}

// ============================================================================
// Build events
// ============================================================================

/// Build event for the JSONL journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    BuildStarted {
        run_id: String,
        targets: Vec<String>,
        vellum_version: String,
    },
    TargetStarted {
        target: String,
    },
    TargetStopped {
        target: String,
        line: usize,
        command: String,
    },
    TargetCompleted {
        target: String,
        duration_seconds: f64,
    },
    CommandFailed {
        target: String,
        line: usize,
        command: String,
        message: String,
        suppressed: bool,
    },
    BuildCompleted {
        run_id: String,
        targets_run: u32,
        targets_stopped: u32,
        success: bool,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: BuildEvent,
}

/// Summary of one build invocation.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub building: Vec<String>,
    pub targets_run: u32,
    pub targets_stopped: u32,
    pub total_duration: std::time::Duration,
}
