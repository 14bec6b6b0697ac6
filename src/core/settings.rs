//! User settings from `$VELLUM_HOME/config.yaml` (default `~/.vellum`).
//!
//! Every field is optional; a missing file is the same as an empty one.

use super::types::{value_from_yaml, Scope};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "VELLUM_HOME";
pub const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Shared recipe repository searched after the working directory.
    pub recipe_dir: Option<PathBuf>,

    /// Root of program modules.
    pub module_dir: Option<PathBuf>,

    /// Append build events to this JSONL file.
    pub event_log: Option<PathBuf>,

    /// Default build options, overridden by the recipe's own `options`.
    pub options: IndexMap<String, serde_yaml_ng::Value>,
}

/// Where the loader looks for recipes and program modules.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPaths {
    pub base_dir: PathBuf,
    pub recipe_dir: PathBuf,
    pub module_dir: PathBuf,
}

impl SearchPaths {
    /// Paths rooted at `home` (`<home>/recipes`, `<home>/modules`).
    pub fn under(base_dir: impl Into<PathBuf>, home: &Path) -> SearchPaths {
        SearchPaths {
            base_dir: base_dir.into(),
            recipe_dir: home.join("recipes"),
            module_dir: home.join("modules"),
        }
    }
}

/// `$VELLUM_HOME`, else `~/.vellum`, else `.vellum` in the working directory.
pub fn vellum_home() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .map(|h| h.join(".vellum"))
        .unwrap_or_else(|| PathBuf::from(".vellum"))
}

/// Replace a leading `~` with the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest.trim_start_matches('/')),
        None => PathBuf::from(path),
    }
}

impl Settings {
    /// Load `<home>/config.yaml` if it exists.
    pub fn load(home: &Path) -> Result<Settings, String> {
        let path = home.join(CONFIG_FILE);
        if !path.exists() {
            log::debug!("no settings file at {}", path.display());
            return Ok(Settings::default());
        }
        Settings::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Settings, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        Settings::from_str(&content).map_err(|e| format!("{}: {}", path.display(), e))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(yaml: &str) -> Result<Settings, String> {
        if yaml.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_yaml_ng::from_str(yaml).map_err(|e| format!("invalid settings: {}", e))
    }

    /// Search paths for a build started in `base_dir`.
    pub fn search_paths(&self, base_dir: impl Into<PathBuf>, home: &Path) -> SearchPaths {
        let mut paths = SearchPaths::under(base_dir, home);
        if let Some(dir) = &self.recipe_dir {
            paths.recipe_dir = expand_home(&dir.to_string_lossy());
        }
        if let Some(dir) = &self.module_dir {
            paths.module_dir = expand_home(&dir.to_string_lossy());
        }
        paths
    }

    /// Configured default options as spec values.
    pub fn default_options(&self) -> Scope {
        self.options
            .iter()
            .map(|(k, v)| (k.clone(), value_from_yaml(v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Value;

    #[test]
    fn test_settings_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(dir.path()).unwrap();
        assert!(s.recipe_dir.is_none());
        assert!(s.options.is_empty());
        let paths = s.search_paths("/work", dir.path());
        assert_eq!(paths.base_dir, PathBuf::from("/work"));
        assert_eq!(paths.recipe_dir, dir.path().join("recipes"));
        assert_eq!(paths.module_dir, dir.path().join("modules"));
    }

    #[test]
    fn test_settings_parse_full() {
        let s = Settings::from_str(
            "recipe_dir: /opt/recipes\nmodule_dir: /opt/modules\nevent_log: /tmp/ev.jsonl\noptions:\n  verbose: false\n  jobs: 4\n",
        )
        .unwrap();
        let paths = s.search_paths(".", Path::new("/home/u/.vellum"));
        assert_eq!(paths.recipe_dir, PathBuf::from("/opt/recipes"));
        assert_eq!(paths.module_dir, PathBuf::from("/opt/modules"));
        assert_eq!(s.event_log, Some(PathBuf::from("/tmp/ev.jsonl")));
        let opts = s.default_options();
        assert_eq!(opts["verbose"], Value::Bool(false));
        assert_eq!(opts["jobs"], Value::Int(4));
    }

    #[test]
    fn test_settings_rejects_unknown_field() {
        let err = Settings::from_str("recipes: /x\n").unwrap_err();
        assert!(err.contains("invalid settings"));
    }

    #[test]
    fn test_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "options:\n  default: all\n").unwrap();
        let s = Settings::load(dir.path()).unwrap();
        assert_eq!(s.default_options()["default"], Value::str("all"));
    }

    #[test]
    fn test_settings_empty_file() {
        assert!(Settings::from_str("\n").unwrap().options.is_empty());
    }

    #[test]
    fn test_settings_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("rel"), PathBuf::from("rel"));
        assert_eq!(expand_home("~user/x"), PathBuf::from("~user/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/.vellum"), home.join(".vellum"));
            assert_eq!(expand_home("~"), home);
        }
    }
}
