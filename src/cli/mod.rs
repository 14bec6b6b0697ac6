//! Command line front end: flags, settings layering, and the build entry point.

use crate::commands::{files, Args};
use crate::core::error::VellumError;
use crate::core::press::Press;
use crate::core::script::Script;
use crate::core::scribe::Scribe;
use crate::core::settings::{self, SearchPaths, Settings};
use crate::core::types::{Spec, Value};
use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "vellum",
    version,
    disable_version_flag = true,
    about = "Build targets described in a .vel recipe"
)]
pub struct Cli {
    /// Print the version
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: (),

    /// Recipe to read the build from (the .vel extension is optional)
    #[arg(short, long, default_value = "build")]
    pub file: String,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Show what would run without running it
    #[arg(short, long)]
    pub dry_run: bool,

    /// Log command failures as warnings and keep building
    #[arg(short, long)]
    pub keep_going: bool,

    /// Treat every given/unless condition as passing
    #[arg(short = 'F', long)]
    pub force: bool,

    /// Show options, every target with its build order, and the default
    #[arg(short = 'T', long)]
    pub targets: bool,

    /// Print the merged recipe as YAML
    #[arg(short = 'D', long)]
    pub dump: bool,

    /// Create the recipe and module directories
    #[arg(short = 'I', long)]
    pub install: bool,

    /// List commands with their help (all, or the names given as arguments)
    #[arg(short = 'C', long)]
    pub commands: bool,

    /// Search commands, imports, depends, and targets with a regex
    #[arg(short = 'S', long, value_name = "REGEX")]
    pub search: Option<String>,

    /// Append build events to this JSONL file
    #[arg(long, value_name = "PATH")]
    pub event_log: Option<PathBuf>,

    /// Targets to build (command names with -C)
    #[arg(value_name = "TARGETS")]
    pub names: Vec<String>,
}

/// Run the command line from the working directory and the vellum home.
pub fn dispatch(cli: Cli) -> Result<(), VellumError> {
    let base_dir = std::env::current_dir()
        .map_err(|e| VellumError::Config(format!("cannot read working directory: {}", e)))?;
    run(&cli, &base_dir, &settings::vellum_home())
}

/// [`dispatch`] with explicit directories.
pub fn run(cli: &Cli, base_dir: &Path, home: &Path) -> Result<(), VellumError> {
    let config = Settings::load(home).map_err(VellumError::Config)?;
    let paths = config.search_paths(base_dir, home);

    if cli.install {
        return cmd_install(cli, paths);
    }

    let spec = load_spec(cli, &config, paths.clone())?;
    if cli.dump {
        return cmd_dump(&spec);
    }

    let script = Script::new(spec);
    if cli.targets {
        print!("{}", script.show()?);
        return Ok(());
    }
    if cli.commands {
        return cmd_commands(&script, &cli.names);
    }
    if let Some(pattern) = &cli.search {
        return cmd_search(&script, pattern);
    }

    let journal = cli.event_log.clone().or(config.event_log.clone());
    cmd_build(cli, script, paths, journal)
}

/// Load the recipe tree and layer options: settings defaults under the
/// recipe's options, then CLI flags that were given.
fn load_spec(cli: &Cli, config: &Settings, paths: SearchPaths) -> Result<Spec, VellumError> {
    let mut spec = Press::new(&cli.file, paths)?.into_spec();
    for (key, value) in config.default_options() {
        spec.options.entry(key).or_insert(value);
    }
    apply_flags(cli, &mut spec);
    Ok(spec)
}

fn apply_flags(cli: &Cli, spec: &mut Spec) {
    spec.options
        .insert("verbose".to_string(), Value::Bool(!cli.quiet));
    for (name, set) in [
        ("dry_run", cli.dry_run),
        ("keep_going", cli.keep_going),
        ("force", cli.force),
    ] {
        if set {
            spec.options.insert(name.to_string(), Value::Bool(true));
        }
    }
}

fn cmd_install(cli: &Cli, paths: SearchPaths) -> Result<(), VellumError> {
    let mut spec = Spec::default();
    apply_flags(cli, &mut spec);
    let mut scribe = Scribe::new(Script::new(spec), paths);
    scribe.log("Installing the vellum recipe and module directories.");
    files::install(&mut scribe, Args(&Value::str("")))?;
    Ok(())
}

fn cmd_dump(spec: &Spec) -> Result<(), VellumError> {
    let yaml = serde_yaml_ng::to_string(spec)
        .map_err(|e| VellumError::Internal(format!("cannot serialize recipe: {}", e)))?;
    print!("{}", yaml);
    Ok(())
}

/// Help text for `names`, or for every command when empty.
fn command_help(script: &Script, names: &[String]) -> Result<String, VellumError> {
    let commands = &script.spec.commands;
    let mut wanted: Vec<&str> = if names.is_empty() {
        commands.keys().map(String::as_str).collect()
    } else {
        names.iter().map(String::as_str).collect()
    };
    if names.is_empty() {
        wanted.sort_unstable();
    }

    let mut out = String::new();
    for name in wanted {
        let command = commands.get(name).ok_or_else(|| {
            VellumError::Config(format!("no command named '{}' is loaded", name))
        })?;
        out.push_str(&format!("{}:\n", name));
        for line in command.help().lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                out.push_str(&format!("    {}\n", line));
            }
        }
        out.push('\n');
    }
    Ok(out)
}

fn cmd_commands(script: &Script, names: &[String]) -> Result<(), VellumError> {
    print!("{}", command_help(script, names)?);
    Ok(())
}

fn cmd_search(script: &Script, pattern: &str) -> Result<(), VellumError> {
    println!("SEARCH FOR: {}", pattern);
    let hits = script.search(pattern)?;
    if hits.is_empty() {
        println!("\tFound nothing.");
    }
    for hit in hits {
        println!("- {}", hit);
    }
    Ok(())
}

fn cmd_build(
    cli: &Cli,
    script: Script,
    paths: SearchPaths,
    journal: Option<PathBuf>,
) -> Result<(), VellumError> {
    let mut scribe = Scribe::new(script, paths).with_journal(journal);
    let report = scribe.build(&cli.names)?;
    scribe.log(format!(
        "Build complete: {} target(s) run, {} stopped ({:.1}s).",
        report.targets_run,
        report.targets_stopped,
        report.total_duration.as_secs_f64()
    ));
    Ok(())
}
