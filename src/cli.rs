use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// php-guard CLI options.
#[derive(Debug, Parser)]
#[command(
    name = "php-guard",
    version,
    about = "Wrap PHP function declarations in function_exists guards"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Guard every declaration in a list of files, rewriting them in place.
    Batch(BatchArgs),

    /// Guard selected functions (and their hook registrations) in one file,
    /// writing the result to a separate output file.
    Whitelist(WhitelistArgs),
}

#[derive(Debug, Clone, ClapArgs)]
pub struct CommonArgs {
    /// Config file. Defaults to the nearest php-guard.toml.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also guard declarations that are indented.
    #[arg(long)]
    pub match_indented: bool,

    /// Report what would change without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct BatchArgs {
    /// Files or directories to process. Defaults to `[batch].files` from config.
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Directory that relative config entries are resolved against.
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Suffix inserted before the extension of backup copies.
    #[arg(long, value_name = "SUFFIX")]
    pub backup_suffix: Option<String>,

    /// Only guard these functions (comma-separated). Defaults to all.
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct WhitelistArgs {
    /// File to read. Defaults to `[whitelist].source`, then functions.php.
    #[arg(long, value_name = "FILE")]
    pub source: Option<PathBuf>,

    /// File to write. Defaults to `[whitelist].output`, then <source stem>-fixed.php.
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Functions to guard (comma-separated, repeatable).
    #[arg(long = "function", value_delimiter = ',')]
    pub functions: Vec<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_batch_with_only_list() {
        let args = Args::try_parse_from([
            "php-guard",
            "batch",
            "inc/phase1",
            "--only",
            "gi_a,gi_b",
            "--dry-run",
        ])
        .unwrap();
        let Command::Batch(batch) = args.command else {
            panic!("expected batch");
        };
        assert_eq!(batch.paths, vec![PathBuf::from("inc/phase1")]);
        assert_eq!(batch.only, vec!["gi_a", "gi_b"]);
        assert!(batch.common.dry_run);
        assert_eq!(batch.common.format, OutputFormat::Pretty);
    }

    #[test]
    fn parses_whitelist_functions() {
        let args = Args::try_parse_from([
            "php-guard",
            "whitelist",
            "--source",
            "functions.php",
            "--function",
            "gi_safe_attr,gi_safe_escape",
            "--function",
            "gi_safe_excerpt",
            "--format",
            "json",
        ])
        .unwrap();
        let Command::Whitelist(wl) = args.command else {
            panic!("expected whitelist");
        };
        assert_eq!(wl.source, Some(PathBuf::from("functions.php")));
        assert_eq!(
            wl.functions,
            vec!["gi_safe_attr", "gi_safe_escape", "gi_safe_excerpt"]
        );
        assert_eq!(wl.common.format, OutputFormat::Json);
    }
}
