//! Command registry: builtin commands, module tables, program modules.
//!
//! A command receives the engine and an [`Args`] view of the reference's
//! expression. It returns `Ok(true)` to stop the current target, `Ok(false)`
//! to continue, or an error from [`Scribe::die`].

pub mod files;
pub mod flow;
pub mod shell;

use crate::core::error::VellumError;
use crate::core::scribe::Scribe;
use crate::core::types::Value;
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the module every build loads first.
pub const BUILTIN_MODULE: &str = "vellum.commands";

pub type CommandFn = fn(&mut Scribe, Args<'_>) -> Result<bool, VellumError>;

#[derive(Clone)]
pub enum Command {
    Builtin { run: CommandFn, help: &'static str },
    /// An executable from a program module directory.
    Program { path: PathBuf },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Builtin { help, .. } => f
                .debug_struct("Builtin")
                .field("help", &help.lines().next().unwrap_or_default())
                .finish(),
            Command::Program { path } => f.debug_struct("Program").field("path", path).finish(),
        }
    }
}

impl Command {
    pub fn builtin(run: CommandFn, help: &'static str) -> Command {
        Command::Builtin { run, help }
    }

    pub fn invoke(&self, scribe: &mut Scribe, expr: &Value) -> Result<bool, VellumError> {
        match self {
            Command::Builtin { run, .. } => run(scribe, Args(expr)),
            Command::Program { path } => shell::program(scribe, path, Args(expr)),
        }
    }

    pub fn help(&self) -> String {
        match self {
            Command::Builtin { help, .. } => help.to_string(),
            Command::Program { path } => format!("Runs the program {}", path.display()),
        }
    }
}

/// Command name → command.
pub type CommandSet = IndexMap<String, Command>;

/// Argument view over a reference's expression.
///
/// A mapping expression carries named parameters; anything else is a single
/// positional argument.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a>(pub &'a Value);

impl<'a> Args<'a> {
    pub fn is_named(&self) -> bool {
        matches!(self.0, Value::Map(_))
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.0.as_map().and_then(|m| m.get(key))
    }

    pub fn positional(&self) -> &'a Value {
        self.0
    }

    /// Named parameters not in `allowed`, sorted.
    pub fn unknown_keys(&self, allowed: &[&str]) -> Vec<String> {
        let mut extra: Vec<String> = self
            .0
            .as_map()
            .map(|m| {
                m.keys()
                    .filter(|k| !allowed.contains(&k.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        extra.sort();
        extra
    }

    /// Named parameter as a string, when present and a string.
    pub fn string(&self, key: &str) -> Option<&'a str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Text of a string-or-list-of-strings argument, concatenated.
    pub fn text(value: &Value) -> Option<String> {
        match value {
            Value::Str(s) => Some(s.clone()),
            Value::Seq(items) => items
                .iter()
                .map(|i| i.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(|parts| parts.concat()),
            _ => None,
        }
    }
}

/// Reject named parameters outside `allowed` through [`Scribe::die`].
/// Returns `Ok(false)` when the caller should carry on.
pub fn check_params(
    scribe: &mut Scribe,
    command: &str,
    args: Args<'_>,
    allowed: &[&str],
) -> Result<bool, VellumError> {
    let extra = args.unknown_keys(allowed);
    if extra.is_empty() {
        return Ok(false);
    }
    scribe.die(
        command,
        format!(
            "unknown parameter(s) {}, expected {}",
            extra.join(", "),
            allowed.join(", ")
        ),
    )?;
    Ok(true)
}

/// The builtin command set.
pub fn builtins() -> Vec<(&'static str, Command)> {
    vec![
        ("sh", Command::builtin(shell::sh, shell::SH_HELP)),
        ("log", Command::builtin(shell::log, shell::LOG_HELP)),
        ("eval", Command::builtin(shell::eval, shell::EVAL_HELP)),
        ("needs", Command::builtin(flow::needs, flow::NEEDS_HELP)),
        ("given", Command::builtin(flow::given, flow::GIVEN_HELP)),
        ("unless", Command::builtin(flow::unless, flow::UNLESS_HELP)),
        ("mkdirs", Command::builtin(files::mkdirs, files::MKDIRS_HELP)),
        ("install", Command::builtin(files::install, files::INSTALL_HELP)),
        ("forall", Command::builtin(files::forall, files::FORALL_HELP)),
        ("cd", Command::builtin(files::cd, files::CD_HELP)),
        ("gen", Command::builtin(files::gen, files::GEN_HELP)),
    ]
}

pub type ModuleFn = fn() -> Vec<(&'static str, Command)>;

/// Modules compiled into the binary, looked up before program modules.
#[derive(Clone)]
pub struct ModuleTable {
    modules: IndexMap<String, ModuleFn>,
}

impl Default for ModuleTable {
    fn default() -> Self {
        let mut table = ModuleTable {
            modules: IndexMap::new(),
        };
        table.register(BUILTIN_MODULE, builtins);
        table
    }
}

impl ModuleTable {
    pub fn register(&mut self, name: &str, module: ModuleFn) {
        self.modules.insert(name.to_string(), module);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Public commands of a compiled-in module.
    pub fn commands(&self, name: &str) -> Option<CommandSet> {
        let module = self.modules.get(name)?;
        Some(
            module()
                .into_iter()
                .filter(|(n, _)| is_public(n))
                .map(|(n, c)| (n.to_string(), c))
                .collect(),
        )
    }
}

fn is_public(name: &str) -> bool {
    !name.starts_with('_') && !name.starts_with('.')
}

/// Directory of a program module: dots in the name become path separators.
pub fn program_module_dir(module_dir: &Path, name: &str) -> PathBuf {
    name.split('.')
        .fold(module_dir.to_path_buf(), |dir, part| dir.join(part))
}

/// Load the executables of a program module directory as commands.
pub fn load_program_module(dir: &Path) -> Result<CommandSet, String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("cannot read module directory {}: {}", dir.display(), e))?;
    let mut found: Vec<(String, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| format!("cannot read {}: {}", dir.display(), e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        if is_public(&name) && is_executable(&path) {
            found.push((name, path));
        }
    }
    found.sort();
    Ok(found
        .into_iter()
        .map(|(name, path)| (name, Command::Program { path }))
        .collect())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Engine over `recipe` written to `dir/build.vel`; `%(out)s` names `dir`.
#[cfg(test)]
pub(crate) fn test_scribe(dir: &Path, recipe: &str) -> Scribe {
    use crate::core::press::Press;
    use crate::core::script::Script;
    use crate::core::settings::SearchPaths;

    let paths = SearchPaths {
        base_dir: dir.to_path_buf(),
        recipe_dir: dir.join("recipes"),
        module_dir: dir.join("modules"),
    };
    std::fs::write(dir.join("build.vel"), recipe).unwrap();
    let press = Press::new("build", paths.clone()).unwrap();
    let mut scribe = Scribe::new(Script::new(press.into_spec()), paths);
    scribe.set_option("out", dir.to_string_lossy().into_owned());
    scribe
}
