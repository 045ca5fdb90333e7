use anyhow::Context;
use clap::Parser;
use php_guard::Targets;
use php_guard::batch::{
    self, BatchReport, DEFAULT_BACKUP_SUFFIX, FileStatus, InPlaceBatch, WhitelistReport,
    WhitelistRun,
};
use php_guard::cli::{Args, BatchArgs, Command, CommonArgs, OutputFormat, WhitelistArgs};
use php_guard::config::{self, PhpGuardConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const RULE: &str = "==================================================";

fn main() -> ExitCode {
    php_guard::telemetry::init_tracing();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    match args.command {
        Command::Batch(batch) => batch_command(batch),
        Command::Whitelist(whitelist) => whitelist_command(whitelist),
    }
}

fn load_config(common: &CommonArgs, start_dir: &Path) -> anyhow::Result<PhpGuardConfig> {
    let loaded = config::load_config(common.config.as_deref(), start_dir)?;
    Ok(match loaded {
        Some((path, cfg)) => {
            tracing::debug!(config = %path.display(), "loaded config");
            cfg
        }
        None => PhpGuardConfig::default(),
    })
}

fn batch_command(args: BatchArgs) -> anyhow::Result<ExitCode> {
    let hint = args
        .root
        .as_deref()
        .or(args.paths.first().map(PathBuf::as_path));
    let start_dir = infer_start_dir(hint)?;
    let cfg = load_config(&args.common, &start_dir)?;

    let mut options = cfg.guard.to_options();
    options.match_indented |= args.common.match_indented;

    let backup_suffix = args
        .backup_suffix
        .or(cfg.batch.backup_suffix)
        .unwrap_or_else(|| DEFAULT_BACKUP_SUFFIX.to_string());

    let (root, files) = if args.paths.is_empty() {
        let root = args.root.or(cfg.batch.root).unwrap_or(start_dir);
        let files = batch::expand_inputs(&root, &cfg.batch.files, &backup_suffix);
        (root, files)
    } else {
        let root = match args.root {
            Some(root) => root,
            None => std::env::current_dir()?,
        };
        let files = batch::expand_inputs(&root, &args.paths, &backup_suffix);
        (root, files)
    };

    if files.is_empty() {
        anyhow::bail!("no input files: pass PATH arguments or set [batch].files in the config");
    }

    let only = if args.only.is_empty() {
        cfg.batch.only
    } else {
        args.only
    };
    let targets = if only.is_empty() {
        Targets::All
    } else {
        Targets::only(&only)?
    };

    let plan = InPlaceBatch {
        root,
        files,
        backup_suffix,
        targets,
        options,
        dry_run: args.common.dry_run,
    };

    if args.common.format == OutputFormat::Pretty {
        println!("Guarding {} file(s)...", plan.files.len());
        println!("{RULE}");
    }

    let report = batch::run_in_place(&plan);

    match args.common.format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Pretty => print_batch_report(&report),
    }

    if report.has_failures() {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_batch_report(report: &BatchReport) {
    for file in &report.files {
        let path = file.path.display();
        match &file.status {
            FileStatus::Missing => println!("File not found: {path}"),
            FileStatus::Failed { error } => println!("Failed: {path}: {error}"),
            FileStatus::Unchanged => println!("Unchanged: {path}"),
            FileStatus::Fixed => {
                if let Some(backup) = &file.backup {
                    println!("Created backup: {}", backup.display());
                }
                let verb = if report.dry_run { "Would fix" } else { "Fixed" };
                println!(
                    "{verb}: {path} ({} function(s) guarded)",
                    file.declarations.guarded.len()
                );
            }
        }
        for name in &file.declarations.unterminated {
            println!("  warning: body of {name} never closes; left unguarded");
        }
    }

    println!("{RULE}");
    println!(
        "Completed: {}/{} files fixed",
        report.succeeded(),
        report.total()
    );
    if report.missing() > 0 {
        println!("{} file(s) not found", report.missing());
    }
    if report.failed() > 0 {
        println!("{} file(s) failed", report.failed());
    }
}

fn whitelist_command(args: WhitelistArgs) -> anyhow::Result<ExitCode> {
    let start_dir = infer_start_dir(args.source.as_deref())?;
    let cfg = load_config(&args.common, &start_dir)?;

    let mut options = cfg.guard.to_options();
    options.match_indented |= args.common.match_indented;

    let source = args
        .source
        .or(cfg.whitelist.source)
        .unwrap_or_else(|| PathBuf::from("functions.php"));
    let output = args
        .output
        .or(cfg.whitelist.output)
        .unwrap_or_else(|| default_output(&source));

    let functions = if args.functions.is_empty() {
        cfg.whitelist.functions
    } else {
        args.functions
    };
    if functions.is_empty() {
        anyhow::bail!("no functions to guard: pass --function or set [whitelist].functions");
    }

    let run = WhitelistRun {
        source,
        output,
        functions: Targets::only(&functions)?,
        options,
        dry_run: args.common.dry_run,
    };
    let report = batch::run_whitelist(&run)
        .with_context(|| format!("failed to guard {}", run.source.display()))?;

    match args.common.format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Pretty => print_whitelist_report(&report),
    }

    Ok(ExitCode::SUCCESS)
}

fn print_whitelist_report(report: &WhitelistReport) {
    for name in &report.declarations.guarded {
        println!("Fixed: {name}");
    }
    for name in &report.declarations.skipped {
        println!("Already guarded: {name}");
    }
    for name in &report.not_found {
        println!("Not found: {name}");
    }
    for name in &report.call_sites.guarded {
        println!("Guarded registration: {name}");
    }

    if report.written {
        println!("\nSaved to {}", report.output.display());
        println!(
            "Please review the changes before replacing {}",
            report.source.display()
        );
    } else {
        println!("\nDry run: {} was not written", report.output.display());
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `functions.php` -> `functions-fixed.php`, next to the source.
fn default_output(source: &Path) -> PathBuf {
    batch::backup_path(source, "-fixed")
}

fn infer_start_dir(hint: Option<&Path>) -> anyhow::Result<PathBuf> {
    let base = match hint {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir()?,
    };

    let base = if base.is_dir() {
        base
    } else {
        base.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    };

    Ok(base)
}
