//! Batch drivers: guard a list of files in place, or guard a whitelist of
//! functions in one file and write the result next to it.

use crate::callsite::{CallSiteGuard, CallSiteOutcome};
use crate::error::{GuardError, GuardResult, IoResultExt};
use crate::guard::{GuardOptions, GuardOutcome, GuardTransformer};
use crate::targets::Targets;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const DEFAULT_BACKUP_SUFFIX: &str = "-original";

/// Per-file variant: every listed file is rewritten in place.
#[derive(Debug, Clone)]
pub struct InPlaceBatch {
    /// Base directory for relative entries in `files`.
    pub root: PathBuf,
    pub files: Vec<PathBuf>,
    pub backup_suffix: String,
    pub targets: Targets,
    pub options: GuardOptions,
    pub dry_run: bool,
}

impl InPlaceBatch {
    pub fn new(root: impl Into<PathBuf>, files: Vec<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files,
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
            targets: Targets::All,
            options: GuardOptions::default(),
            dry_run: false,
        }
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_relative() {
            self.root.join(file)
        } else {
            file.to_path_buf()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Fixed,
    Unchanged,
    Missing,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: FileStatus,
    /// Backup created by this run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    #[serde(flatten)]
    pub declarations: GuardOutcome,
}

impl FileReport {
    fn new(path: PathBuf, status: FileStatus) -> Self {
        Self {
            path,
            status,
            backup: None,
            declarations: GuardOutcome::default(),
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.status, FileStatus::Fixed | FileStatus::Unchanged)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub dry_run: bool,
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.files.len()
    }

    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.succeeded()).count()
    }

    pub fn fixed(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Fixed))
    }

    pub fn missing(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Missing))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.status)).count()
    }
}

/// `dir/name.php` -> `dir/name<suffix>.php`.
pub fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    path.with_file_name(name)
}

/// True when `path` looks like a backup produced with `suffix`.
pub fn is_backup_file(path: &Path, suffix: &str) -> bool {
    !suffix.is_empty()
        && path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem.ends_with(suffix))
}

/// Copy `path` to its backup location unless a backup already exists.
///
/// Returns the backup path when one was created by this call.
pub fn ensure_backup(path: &Path, suffix: &str) -> GuardResult<Option<PathBuf>> {
    let backup = backup_path(path, suffix);
    let mut dest = match OpenOptions::new().write(true).create_new(true).open(&backup) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
        Err(err) => return Err(GuardError::io(&backup, err)),
    };
    let copied = File::open(path)
        .at_path(path)
        .and_then(|mut src| io::copy(&mut src, &mut dest).at_path(&backup));
    if let Err(err) = copied {
        // Never leave an empty or partial backup behind.
        drop(dest);
        let _ = fs::remove_file(&backup);
        return Err(err);
    }
    Ok(Some(backup))
}

/// Run the per-file variant over every configured file.
pub fn run_in_place(batch: &InPlaceBatch) -> BatchReport {
    let transformer = GuardTransformer::new(batch.options.clone());
    let mut report = BatchReport {
        dry_run: batch.dry_run,
        files: Vec::with_capacity(batch.files.len()),
    };

    for file in &batch.files {
        let path = batch.resolve(file);
        let file_report = crate::instrument_block!("in_place", {
            if !path.is_file() {
                tracing::warn!(path = %path.display(), "file not found, skipping");
                return FileReport::new(path.clone(), FileStatus::Missing);
            }
            match process_file(&path, batch, &transformer) {
                Ok(done) => done,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to guard file");
                    FileReport::new(path.clone(), FileStatus::Failed { error: err.to_string() })
                }
            }
        });
        report.files.push(file_report);
    }

    tracing::info!(
        fixed = report.fixed(),
        succeeded = report.succeeded(),
        total = report.total(),
        "batch finished"
    );
    report
}

fn process_file(
    path: &Path,
    batch: &InPlaceBatch,
    transformer: &GuardTransformer,
) -> GuardResult<FileReport> {
    let content = fs::read_to_string(path).at_path(path)?;
    let outcome = transformer.guard_declarations(&content, &batch.targets);

    if !outcome.changed() {
        let mut report = FileReport::new(path.to_path_buf(), FileStatus::Unchanged);
        report.declarations = outcome;
        return Ok(report);
    }

    let mut report = FileReport::new(path.to_path_buf(), FileStatus::Fixed);
    if !batch.dry_run {
        report.backup = ensure_backup(path, &batch.backup_suffix)?;
        if let Some(backup) = &report.backup {
            tracing::info!(backup = %backup.display(), "created backup");
        }
        fs::write(path, &outcome.text).at_path(path)?;
        tracing::info!(path = %path.display(), guarded = outcome.guarded.len(), "rewrote file");
    }
    report.declarations = outcome;
    Ok(report)
}

/// Expand CLI inputs: files are kept as given, directories are walked for `*.php`.
///
/// Backups (stem ending in `backup_suffix`) and vendored trees are skipped.
pub fn collect_php_files(paths: &[PathBuf], backup_suffix: &str) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if !path.is_dir() {
            out.push(path.clone());
            continue;
        }

        let walker = WalkDir::new(path).into_iter().filter_entry(|e| {
            e.depth() == 0 || !(e.file_type().is_dir() && should_skip_dir(e.path()))
        });
        for entry in walker.filter_map(Result::ok) {
            let p = entry.path();
            if entry.file_type().is_file()
                && p.extension().and_then(|e| e.to_str()) == Some("php")
                && !is_backup_file(p, backup_suffix)
            {
                out.push(p.to_path_buf());
            }
        }
    }

    out.sort();
    out.dedup();
    out
}

/// Like [`collect_php_files`], but relative inputs are taken from `root`.
pub fn expand_inputs(root: &Path, paths: &[PathBuf], backup_suffix: &str) -> Vec<PathBuf> {
    let rooted: Vec<PathBuf> = paths
        .iter()
        .map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
        .collect();
    collect_php_files(&rooted, backup_suffix)
}

fn should_skip_dir(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
        return false;
    };

    matches!(name, ".git" | "vendor" | "node_modules")
}

/// Whitelist variant: one source file, explicit functions, separate output.
#[derive(Debug, Clone)]
pub struct WhitelistRun {
    pub source: PathBuf,
    pub output: PathBuf,
    pub functions: Targets,
    pub options: GuardOptions,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WhitelistReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub written: bool,
    pub declarations: GuardOutcome,
    pub call_sites: CallSiteOutcome,
    /// Requested functions with no declaration in the source.
    pub not_found: Vec<String>,
}

/// Guard the whitelisted declarations and their registrations, writing to `output`.
pub fn run_whitelist(run: &WhitelistRun) -> GuardResult<WhitelistReport> {
    if !run.source.is_file() {
        return Err(GuardError::MissingSource(run.source.clone()));
    }
    if same_path(&run.source, &run.output) {
        return Err(GuardError::OutputIsSource(run.output.clone()));
    }

    let content = fs::read_to_string(&run.source).at_path(&run.source)?;
    let declarations =
        GuardTransformer::new(run.options.clone()).guard_declarations(&content, &run.functions);
    let call_sites =
        CallSiteGuard::new(&run.options).guard_call_sites(&declarations.text, &run.functions);

    let not_found: Vec<String> = run
        .functions
        .names()
        .into_iter()
        .filter(|name| {
            !declarations.guarded.iter().any(|g| g.as_str() == *name)
                && !declarations.skipped.iter().any(|s| s.as_str() == *name)
        })
        .map(str::to_string)
        .collect();
    for name in &not_found {
        tracing::warn!(function = %name, "no declaration found");
    }

    let written = !run.dry_run;
    if written {
        fs::write(&run.output, &call_sites.text).at_path(&run.output)?;
        tracing::info!(output = %run.output.display(), "wrote guarded copy");
    }

    Ok(WhitelistReport {
        source: run.source.clone(),
        output: run.output.clone(),
        written,
        declarations,
        call_sites,
        not_found,
    })
}

/// Compare paths after resolving what can be resolved; `b` may not exist yet.
fn same_path(a: &Path, b: &Path) -> bool {
    fn resolve(p: &Path) -> PathBuf {
        if let Ok(full) = p.canonicalize() {
            return full;
        }
        match (p.parent(), p.file_name()) {
            (Some(parent), Some(name)) => {
                let parent = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
                parent
                    .canonicalize()
                    .map(|dir| dir.join(name))
                    .unwrap_or_else(|_| p.to_path_buf())
            }
            _ => p.to_path_buf(),
        }
    }
    resolve(a) == resolve(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_name_inserts_suffix_before_extension() {
        assert_eq!(
            backup_path(Path::new("/t/inc/grant-counts.php"), "-original"),
            PathBuf::from("/t/inc/grant-counts-original.php")
        );
        assert_eq!(
            backup_path(Path::new("Makefile"), "-original"),
            PathBuf::from("Makefile-original")
        );
        assert_eq!(
            backup_path(Path::new("a.php.php"), "-original"),
            PathBuf::from("a.php-original.php")
        );
    }

    #[test]
    fn recognises_backups() {
        assert!(is_backup_file(Path::new("x-original.php"), "-original"));
        assert!(!is_backup_file(Path::new("x.php"), "-original"));
        assert!(!is_backup_file(Path::new("x.php"), ""));
    }

    #[test]
    fn relative_files_resolve_against_root() {
        let batch = InPlaceBatch::new("/theme/inc", vec![]);
        assert_eq!(
            batch.resolve(Path::new("a.php")),
            PathBuf::from("/theme/inc/a.php")
        );
        assert_eq!(batch.resolve(Path::new("/abs/b.php")), PathBuf::from("/abs/b.php"));
    }

    #[test]
    fn same_path_handles_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("functions.php");
        fs::write(&src, "<?php\n").unwrap();
        assert!(same_path(&src, &dir.path().join("./functions.php")));
        assert!(!same_path(&src, &dir.path().join("functions-fixed.php")));
    }
}
