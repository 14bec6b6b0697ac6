//! Recipe and module loading.
//!
//! The press reads the root recipe, then follows its `imports` recursively,
//! folding every imported recipe into the root under a namespace
//! (`<as>.<key>`, or `<file stem>.<key>`) and every imported module's
//! commands into the root's command set. Recipes are memoized by canonical
//! path and modules by name, so import cycles terminate and a recipe shared
//! by several importers is merged once.

use super::error::{LoadError, VellumError};
use super::parser::parse_spec;
use super::settings::SearchPaths;
use super::types::{Reference, Spec, Value};
use crate::commands::{self, CommandSet, ModuleTable, BUILTIN_MODULE};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const RECIPE_EXT: &str = ".vel";

pub struct Press {
    main: Spec,
    paths: SearchPaths,
    table: ModuleTable,
    recipes: HashMap<PathBuf, Spec>,
    modules: HashMap<String, CommandSet>,
}

impl Press {
    /// Load `main` (with or without `.vel`) and everything it imports.
    pub fn new(main: &str, paths: SearchPaths) -> Result<Press, VellumError> {
        Press::with_modules(main, paths, ModuleTable::default())
    }

    pub fn with_modules(
        main: &str,
        paths: SearchPaths,
        table: ModuleTable,
    ) -> Result<Press, VellumError> {
        let mut press = Press {
            main: Spec::default(),
            paths,
            table,
            recipes: HashMap::new(),
            modules: HashMap::new(),
        };
        let root = press.resolve_path(main)?;
        press.main = press.load_recipe(&root)?;
        press.main.commands.clear();
        press.load("module", BUILTIN_MODULE, None)?;
        let imports = press.main.imports.clone();
        press.imports(&imports)?;
        Ok(press)
    }

    pub fn spec(&self) -> &Spec {
        &self.main
    }

    pub fn into_spec(self) -> Spec {
        self.main
    }

    pub fn paths(&self) -> &SearchPaths {
        &self.paths
    }

    /// Number of distinct recipe files read, the root included.
    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }

    /// Find the single recipe file called `name` in the base directory or
    /// the recipe directory.
    pub fn resolve_path(&self, name: &str) -> Result<PathBuf, LoadError> {
        let file = if name.ends_with(RECIPE_EXT) {
            name.to_string()
        } else {
            format!("{}{}", name, RECIPE_EXT)
        };

        let mut candidates: Vec<PathBuf> = Vec::new();
        for dir in [&self.paths.base_dir, &self.paths.recipe_dir] {
            let candidate = dir.join(&file);
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        let found: Vec<&PathBuf> = candidates.iter().filter(|p| p.is_file()).collect();
        match found.as_slice() {
            [one] => Ok((*one).clone()),
            [] => Err(LoadError::new(format!(
                "Did not find file named {} at any of: {}",
                file,
                display_paths(&candidates)
            ))),
            many => Err(LoadError::new(format!(
                "More than one file named {}: {}",
                file,
                display_paths(many.iter().copied())
            ))),
        }
    }

    /// Parse a recipe file, memoized by canonical path.
    pub fn load_recipe(&mut self, path: &Path) -> Result<Spec, VellumError> {
        let key = canonical(path);
        if let Some(spec) = self.recipes.get(&key) {
            return Ok(spec.clone());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| LoadError::new(format!("cannot read {}: {}", path.display(), e)))?;
        let stanzas = parse_spec(&content).map_err(|mut e| {
            e.message = format!("{}: {}", path.display(), e.message);
            e
        })?;
        if stanzas.is_empty() {
            return Err(LoadError::new(format!("no stanzas found in {}", path.display())).into());
        }
        let spec = Spec::from_stanzas(stanzas)
            .map_err(|e| LoadError::new(format!("{}: {}", path.display(), e)))?;

        log::debug!("loaded recipe {}", path.display());
        self.recipes.insert(key, spec.clone());
        Ok(spec)
    }

    /// Commands of a module: the compiled-in table first, then a program
    /// module directory. Memoized by name.
    pub fn load_module(&mut self, name: &str) -> Result<CommandSet, LoadError> {
        if let Some(cmds) = self.modules.get(name) {
            return Ok(cmds.clone());
        }

        let cmds = match self.table.commands(name) {
            Some(cmds) => cmds,
            None => {
                let dir = commands::program_module_dir(&self.paths.module_dir, name);
                if !dir.is_dir() {
                    let compiled: Vec<&str> = self.table.names().collect();
                    return Err(LoadError::new(format!(
                        "no module named {} (compiled in: [{}], no directory {})",
                        name,
                        compiled.join(", "),
                        dir.display()
                    )));
                }
                commands::load_program_module(&dir).map_err(LoadError::new)?
            }
        };

        log::debug!("loaded module {} ({} commands)", name, cmds.len());
        self.modules.insert(name.to_string(), cmds.clone());
        Ok(cmds)
    }

    /// Load a recipe or module into the root spec.
    pub fn load(
        &mut self,
        kind: &str,
        from: &str,
        as_name: Option<&str>,
    ) -> Result<(), VellumError> {
        match kind {
            "recipe" => {
                let path = self.resolve_path(from)?;
                if self.recipes.contains_key(&canonical(&path)) {
                    log::debug!("recipe {} already loaded", path.display());
                    return Ok(());
                }
                let spec = self.load_recipe(&path)?;
                let namespace = match as_name {
                    Some(ns) => ns.to_string(),
                    None => recipe_stem(&path),
                };
                join(&spec, &mut self.main, Some(&namespace));
                self.imports(&spec.imports)
            }
            "module" => {
                if self.modules.contains_key(from) {
                    return Ok(());
                }
                let cmds = self.load_module(from)?;
                merge(&cmds, &mut self.main.commands, as_name);
                Ok(())
            }
            other => Err(LoadError::new(format!(
                "Invalid kind of import {}, use only 'recipe(...)' or 'module(...)'",
                other
            ))
            .into()),
        }
    }

    /// Process `recipe(from ... as ...)` / `module(...)` references.
    pub fn imports(&mut self, imports: &[Reference]) -> Result<(), VellumError> {
        for import in imports {
            let (from, as_name) = import_args(import)?;
            self.load(&import.name, &from, as_name.as_deref())?;
        }
        Ok(())
    }
}

fn import_args(import: &Reference) -> Result<(String, Option<String>), LoadError> {
    let args = import.expr.as_map().ok_or_else(|| {
        LoadError::new(format!(
            "import {} needs (from \"name\" as \"alias\") arguments",
            import
        ))
    })?;
    let from = match args.get("from") {
        Some(Value::Str(s)) => s.clone(),
        _ => {
            return Err(LoadError::new(format!(
                "import {} needs a string 'from'",
                import
            )))
        }
    };
    let as_name = match args.get("as") {
        None => None,
        Some(Value::Str(s)) => Some(s.clone()),
        Some(_) => {
            return Err(LoadError::new(format!(
                "import {} has a non-string 'as'",
                import
            )))
        }
    };
    Ok((from, as_name))
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn recipe_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn display_paths<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> String {
    let shown: Vec<String> = paths
        .into_iter()
        .map(|p| format!("'{}'", p.display()))
        .collect();
    format!("[{}]", shown.join(", "))
}

/// `namespace.key`, or `key` without a namespace.
pub fn scope_name(key: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{}.{}", ns, key),
        _ => key.to_string(),
    }
}

/// Copy every entry of `source` into `target` under `namespace`.
pub fn merge<V: Clone>(
    source: &IndexMap<String, V>,
    target: &mut IndexMap<String, V>,
    namespace: Option<&str>,
) {
    for (key, value) in source {
        target.insert(scope_name(key, namespace), value.clone());
    }
}

/// [`merge`] the targets, options and depends of `source` into `target`.
pub fn join(source: &Spec, target: &mut Spec, namespace: Option<&str>) {
    merge(&source.targets, &mut target.targets, namespace);
    merge(&source.options, &mut target.options, namespace);
    merge(&source.depends, &mut target.depends, namespace);
}
