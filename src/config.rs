use crate::guard::GuardOptions;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhpGuardConfig {
    #[serde(default)]
    pub guard: GuardSection,

    #[serde(default)]
    pub batch: BatchSection,

    #[serde(default)]
    pub whitelist: WhitelistSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardSection {
    pub indent: Option<String>,

    #[serde(default)]
    pub match_indented: bool,

    pub registration_functions: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchSection {
    pub root: Option<PathBuf>,

    #[serde(default)]
    pub files: Vec<PathBuf>,

    pub backup_suffix: Option<String>,

    /// Restrict the batch to these names; every declaration when empty.
    #[serde(default)]
    pub only: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhitelistSection {
    pub source: Option<PathBuf>,

    pub output: Option<PathBuf>,

    #[serde(default)]
    pub functions: Vec<String>,
}

impl GuardSection {
    pub fn to_options(&self) -> GuardOptions {
        let defaults = GuardOptions::default();
        GuardOptions {
            indent: self.indent.clone().unwrap_or(defaults.indent),
            match_indented: self.match_indented,
            registration_functions: self
                .registration_functions
                .clone()
                .unwrap_or(defaults.registration_functions),
        }
    }
}

impl PhpGuardConfig {
    /// Resolve relative paths against `base` (the directory holding the config file).
    pub fn rebase(mut self, base: &Path) -> Self {
        let join = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };
        self.batch.root = Some(self.batch.root.map_or_else(|| base.to_path_buf(), join));
        self.whitelist.source = self.whitelist.source.map(join);
        self.whitelist.output = self.whitelist.output.map(join);
        self
    }
}

pub const DEFAULT_CONFIG_FILE_NAME: &str = "php-guard.toml";

pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut cur = Some(start_dir);
    while let Some(dir) = cur {
        let candidate = dir.join(DEFAULT_CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        cur = dir.parent();
    }
    None
}

pub fn load_config_file(path: &Path) -> Result<PhpGuardConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let cfg: PhpGuardConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(cfg.rebase(base))
}

pub fn load_config(
    explicit_path: Option<&Path>,
    start_dir: &Path,
) -> Result<Option<(PathBuf, PhpGuardConfig)>> {
    if let Some(p) = explicit_path {
        let cfg = load_config_file(p)?;
        return Ok(Some((p.to_path_buf(), cfg)));
    }

    let Some(p) = find_config_file(start_dir) else {
        return Ok(None);
    };
    let cfg = load_config_file(&p)?;
    Ok(Some((p, cfg)))
}
