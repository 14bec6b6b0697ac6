//! Filesystem commands: `mkdirs`, `install`, `forall`, `cd`, `gen`.

use super::{check_params, Args};
use crate::core::error::VellumError;
use crate::core::scribe::Scribe;
use crate::core::settings::expand_home;
use crate::core::template;
use crate::core::types::{Scope, Value};
use std::path::{Path, PathBuf};

pub const MKDIRS_HELP: &str = "\
Creates every directory in paths (and any missing parents) with the
given mode. A leading ~ is expanded. Existing directories are left alone.

Usage: mkdirs(paths ['build' '~/.cache/app'] mode 700)";

pub const INSTALL_HELP: &str = "\
Creates the recipe and module directories under the vellum home.
Same as vellum -I.

Usage: install ''";

pub const FORALL_HELP: &str = "\
Runs the do block once for each file under top (default .) whose path
matches the files glob. The path is bound to var (default file), the
full match list to files.

Usage: forall(files '*.rs' var 'src' do [$ wc -l %(src)s])";

pub const CD_HELP: &str = "\
Runs the do block inside another directory, then changes back. The
previous directory is bound to parent.

Usage: cd(to 'docs' do [$ make html])";

pub const GEN_HELP: &str = "\
Renders the input file as a template and writes the result to output.
Extra parameters are available as keys, after the current options.

Usage: gen(input 'config.in' output 'config.txt' port 8080)";

/// Mode used when none is given.
pub const DEFAULT_MODE: u32 = 0o700;

const MKDIRS_PARAMS: &[&str] = &["paths", "mode"];
const FORALL_PARAMS: &[&str] = &["files", "top", "var", "do"];
const CD_PARAMS: &[&str] = &["to", "do"];

/// Read a mode written as octal digits, either `700` or `'0700'`.
fn parse_mode(value: &Value) -> Option<u32> {
    let digits = match value {
        Value::Int(n) if *n >= 0 => n.to_string(),
        Value::Str(s) => s.trim_start_matches("0o").to_string(),
        _ => return None,
    };
    u32::from_str_radix(&digits, 8).ok().filter(|m| *m <= 0o7777)
}

fn make_dirs(scribe: &mut Scribe, dirs: &[PathBuf], mode: u32) -> Result<(), VellumError> {
    for dir in dirs {
        scribe.log(format!(" mkdir: {}", dir.display()));
        if dir.exists() || scribe.flag("dry_run") {
            continue;
        }
        if let Err(e) = create_dir_all(dir, mode) {
            scribe.die(
                "mkdirs",
                format!("cannot create {}: {}", dir.display(), e),
            )?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn create_dir_all(dir: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(mode).create(dir)
}

#[cfg(not(unix))]
fn create_dir_all(dir: &Path, _mode: u32) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

pub fn mkdirs(scribe: &mut Scribe, args: Args<'_>) -> Result<bool, VellumError> {
    if check_params(scribe, "mkdirs", args, MKDIRS_PARAMS)? {
        return Ok(false);
    }
    let paths: Option<Vec<PathBuf>> = match args.get("paths") {
        Some(Value::Seq(items)) => items
            .iter()
            .map(|p| p.as_str().map(expand_home))
            .collect(),
        _ => None,
    };
    let Some(paths) = paths else {
        scribe.die("mkdirs", "mkdirs expects a list of path strings in 'paths'")?;
        return Ok(false);
    };
    let mode = match args.get("mode") {
        None => DEFAULT_MODE,
        Some(value) => match parse_mode(value) {
            Some(mode) => mode,
            None => {
                scribe.die(
                    "mkdirs",
                    format!("mode must be octal digits, got {}", value.repr()),
                )?;
                return Ok(false);
            }
        },
    };
    make_dirs(scribe, &paths, mode)?;
    Ok(false)
}

pub fn install(scribe: &mut Scribe, _args: Args<'_>) -> Result<bool, VellumError> {
    let dirs = vec![
        scribe.paths().module_dir.clone(),
        scribe.paths().recipe_dir.clone(),
    ];
    make_dirs(scribe, &dirs, DEFAULT_MODE)?;
    Ok(false)
}

/// Every file under `top`, recursively, without following symlinked
/// directories. Unreadable directories are skipped.
fn walk_files(top: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(top) else {
        log::debug!("forall: cannot read {}", top.display());
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(kind) if kind.is_dir() => walk_files(&path, found),
            Ok(_) => found.push(path),
            Err(_) => {}
        }
    }
}

pub fn forall(scribe: &mut Scribe, args: Args<'_>) -> Result<bool, VellumError> {
    if check_params(scribe, "forall", args, FORALL_PARAMS)? {
        return Ok(false);
    }
    let top = args.string("top").unwrap_or(".");
    let var = args.string("var").unwrap_or("file");
    scribe.log(format!(
        "forall: files {} top {} var {}",
        args.get("files").map(Value::repr).unwrap_or_else(|| "None".to_string()),
        Value::str(top).repr(),
        Value::str(var).repr()
    ));

    let pattern = match args.string("files").filter(|f| !f.is_empty()) {
        Some(files) => glob::Pattern::new(files),
        None => {
            scribe.die("forall", "Must give a file matching pattern in parameter 'files'.")?;
            return Ok(false);
        }
    };
    let pattern = match pattern {
        Ok(p) => p,
        Err(e) => {
            scribe.die("forall", format!("invalid files pattern: {}", e))?;
            return Ok(false);
        }
    };

    let mut all = Vec::new();
    walk_files(Path::new(top), &mut all);
    let mut matches: Vec<String> = all
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| pattern.matches(p))
        .collect();
    matches.sort();
    scribe.log(format!("forall: matched {} files.", matches.len()));

    let body = args.get("do").cloned().unwrap_or(Value::Seq(Vec::new()));
    let listing = Value::Seq(matches.iter().map(|m| Value::str(m.as_str())).collect());
    for file in &matches {
        let mut vars = Scope::new();
        vars.insert(var.to_string(), Value::str(file.as_str()));
        vars.insert("files".to_string(), listing.clone());
        vars.insert("var".to_string(), Value::str(var));
        // a stop inside the block ends that iteration only
        scribe.with_scope(vars, |inner| inner.execute(&body))?;
    }
    Ok(false)
}

pub fn cd(scribe: &mut Scribe, args: Args<'_>) -> Result<bool, VellumError> {
    if check_params(scribe, "cd", args, CD_PARAMS)? {
        return Ok(false);
    }
    let Some(raw) = args.string("to").filter(|t| !t.is_empty()) else {
        scribe.die("cd", "Must specify to parameter to cd into.")?;
        return Ok(false);
    };
    scribe.log(format!(" cd: {}", raw));
    let Some(to) = scribe.interpolate("to", raw)? else {
        return Ok(false);
    };
    if !Path::new(&to).exists() {
        scribe.die("cd", format!("Target chdir path '{}' does not exist.", to))?;
        return Ok(false);
    }

    let parent = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            scribe.die("cd", format!("cannot read the working directory: {}", e))?;
            return Ok(false);
        }
    };
    if let Err(e) = std::env::set_current_dir(&to) {
        scribe.die("cd", format!("cannot change to {}: {}", to, e))?;
        return Ok(false);
    }

    let body = args.get("do").cloned().unwrap_or(Value::Seq(Vec::new()));
    let mut vars = Scope::new();
    vars.insert(
        "parent".to_string(),
        Value::str(parent.to_string_lossy().into_owned()),
    );
    let result = scribe.with_scope(vars, |inner| inner.execute(&body));
    let restored = std::env::set_current_dir(&parent);
    result?;
    if let Err(e) = restored {
        scribe.die(
            "cd",
            format!("cannot change back to {}: {}", parent.display(), e),
        )?;
    }
    Ok(false)
}

pub fn gen(scribe: &mut Scribe, args: Args<'_>) -> Result<bool, VellumError> {
    let (Some(input), Some(output)) = (args.string("input"), args.string("output")) else {
        scribe.die("gen", "You must give both input and output for gen.")?;
        return Ok(false);
    };
    scribe.log(format!("gen: input {} output {}", input, output));
    if scribe.flag("dry_run") {
        return Ok(false);
    }

    let mut keys: Scope = args
        .positional()
        .as_map()
        .map(|m| {
            m.iter()
                .filter(|(k, _)| k.as_str() != "input" && k.as_str() != "output")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();
    keys.extend(scribe.scope().iter().map(|(k, v)| (k.clone(), v.clone())));

    let source = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            scribe.die("gen", format!("cannot read {}: {}", input, e))?;
            return Ok(false);
        }
    };
    let rendered = match template::render(&source, &keys) {
        Ok(r) => r,
        Err(e) => {
            scribe.die(format!("gen {}", Value::str(input).repr()), e.to_string())?;
            return Ok(false);
        }
    };
    if let Err(e) = std::fs::write(output, rendered) {
        scribe.die("gen", format!("cannot write {}: {}", output, e))?;
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_scribe;
    use indexmap::IndexMap;

    fn named(pairs: &[(&str, Value)]) -> Value {
        Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<IndexMap<_, _>>(),
        )
    }

    fn strs(items: &[&str]) -> Value {
        Value::Seq(items.iter().map(|s| Value::str(*s)).collect())
    }

    #[test]
    fn test_files_parse_mode() {
        assert_eq!(parse_mode(&Value::Int(700)), Some(0o700));
        assert_eq!(parse_mode(&Value::Int(755)), Some(0o755));
        assert_eq!(parse_mode(&Value::str("0644")), Some(0o644));
        assert_eq!(parse_mode(&Value::Int(789)), None);
        assert_eq!(parse_mode(&Value::Int(-1)), None);
        assert_eq!(parse_mode(&Value::Bool(true)), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_files_mkdirs_with_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let mut s = test_scribe(dir.path(), "options(default 't')");
        let target = dir.path().join("a/b");
        let v = named(&[
            ("paths", strs(&[target.to_str().unwrap()])),
            ("mode", Value::Int(750)),
        ]);
        assert!(!mkdirs(&mut s, Args(&v)).unwrap());
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
        // existing directories are fine
        assert!(!mkdirs(&mut s, Args(&v)).unwrap());
    }

    #[test]
    fn test_files_mkdirs_dry_run_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = test_scribe(dir.path(), "options(default 't')");
        let target = dir.path().join("never");
        s.set_option("dry_run", true);
        let v = named(&[("paths", strs(&[target.to_str().unwrap()]))]);
        mkdirs(&mut s, Args(&v)).unwrap();
        assert!(!target.exists());

        assert!(mkdirs(&mut s, Args(&named(&[("paths", Value::str("x"))]))).is_err());
        assert!(mkdirs(&mut s, Args(&named(&[("bogus", Value::Int(1))]))).is_err());
        let bad_mode = named(&[("paths", strs(&["x"])), ("mode", Value::Int(9))]);
        assert!(mkdirs(&mut s, Args(&bad_mode)).is_err());
    }

    #[test]
    fn test_files_install_creates_home_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = test_scribe(dir.path(), "options(default 't')");
        install(&mut s, Args(&Value::str(""))).unwrap();
        assert!(dir.path().join("recipes").is_dir());
        assert!(dir.path().join("modules").is_dir());
    }

    #[test]
    fn test_files_forall_sorted_matches() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tree");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        for name in ["b.txt", "a.txt", "sub/c.txt", "skip.md"] {
            std::fs::write(root.join(name), "").unwrap();
        }
        let mut s = test_scribe(dir.path(), "options(default 't')");
        let before = s.scope().clone();
        let v = named(&[
            ("files", Value::str("*.txt")),
            ("top", Value::str(root.to_str().unwrap())),
            ("var", Value::str("f")),
            ("do", Value::str("echo %(f)s >> %(out)s/seen")),
        ]);
        assert!(!forall(&mut s, Args(&v)).unwrap());
        let root = root.display();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("seen")).unwrap(),
            format!("{0}/a.txt\n{0}/b.txt\n{0}/sub/c.txt\n", root)
        );
        assert_eq!(s.scope(), &before);
    }

    #[test]
    fn test_files_forall_stop_ends_iteration_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["one.c", "two.c"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let mut s = test_scribe(dir.path(), "options(default 't')");
        let body = Value::Seq(vec![
            Value::str("echo %(file)s >> %(out)s/seen"),
            Value::reference("given", Value::str("False")),
            Value::str("echo stopped >> %(out)s/seen"),
        ]);
        let v = named(&[
            ("files", Value::str("*.c")),
            ("top", Value::str(dir.path().to_str().unwrap())),
            ("do", body),
        ]);
        assert!(!forall(&mut s, Args(&v)).unwrap());
        let seen = std::fs::read_to_string(dir.path().join("seen")).unwrap();
        assert_eq!(seen.lines().count(), 2);
        assert!(!seen.contains("stopped"));
    }

    #[test]
    fn test_files_forall_requires_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = test_scribe(dir.path(), "options(default 't')");
        let err = forall(&mut s, Args(&named(&[("do", Value::str("true"))]))).unwrap_err();
        assert!(err.to_string().contains("parameter 'files'"));
        let bad = named(&[("files", Value::str("[")), ("top", Value::str("."))]);
        assert!(forall(&mut s, Args(&bad)).is_err());
    }

    #[test]
    fn test_files_cd_runs_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner");
        std::fs::create_dir(&inner).unwrap();
        let mut s = test_scribe(dir.path(), "options(default 't' sub 'inner')");
        let start = std::env::current_dir().unwrap();

        let v = named(&[
            ("to", Value::str("%(out)s/%(sub)s")),
            ("do", Value::str("pwd > here\necho %(parent)s > parent")),
        ]);
        assert!(!cd(&mut s, Args(&v)).unwrap());
        assert_eq!(std::env::current_dir().unwrap(), start);
        let here = std::fs::read_to_string(inner.join("here")).unwrap();
        assert_eq!(
            std::fs::canonicalize(here.trim()).unwrap(),
            std::fs::canonicalize(&inner).unwrap()
        );
        let parent = std::fs::read_to_string(inner.join("parent")).unwrap();
        assert_eq!(parent.trim(), start.to_string_lossy());

        // a failing body still changes back
        let failing = named(&[("to", Value::str("%(out)s")), ("do", Value::str("exit 1"))]);
        assert!(cd(&mut s, Args(&failing)).is_err());
        assert_eq!(std::env::current_dir().unwrap(), start);

        let missing = named(&[("to", Value::str("%(out)s/nowhere"))]);
        let err = cd(&mut s, Args(&missing)).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(cd(&mut s, Args(&named(&[]))).is_err());
    }

    #[test]
    fn test_files_gen_scope_overrides_args() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "%(name)s on %(port)d, 100%%\n").unwrap();
        let mut s = test_scribe(dir.path(), "options(default 't' name 'web')");
        let v = named(&[
            ("input", Value::str(input.to_str().unwrap())),
            ("output", Value::str(output.to_str().unwrap())),
            ("name", Value::str("ignored")),
            ("port", Value::Int(8080)),
        ]);
        gen(&mut s, Args(&v)).unwrap();
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "web on 8080, 100%\n"
        );
    }

    #[test]
    fn test_files_gen_failures() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        std::fs::write(&input, "%(missing)s").unwrap();
        let mut s = test_scribe(dir.path(), "options(default 't')");

        let only_input = named(&[("input", Value::str(input.to_str().unwrap()))]);
        assert!(gen(&mut s, Args(&only_input)).is_err());

        let output = dir.path().join("out.txt");
        let v = named(&[
            ("input", Value::str(input.to_str().unwrap())),
            ("output", Value::str(output.to_str().unwrap())),
        ]);
        let err = gen(&mut s, Args(&v)).unwrap_err();
        assert!(err.to_string().contains("No key 'missing'"));
        assert!(!output.exists());

        s.set_option("dry_run", true);
        gen(&mut s, Args(&v)).unwrap();
        assert!(!output.exists());
    }
}
