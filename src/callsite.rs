//! Gates hook registrations on the existence of their callback.
//!
//! Once a declaration is guarded, `add_action('hook', 'name');` must only run
//! when `name` was actually defined, so each matching registration line is
//! wrapped in `if (function_exists('name')) { ... }`.

use crate::guard::{
    EXISTENCE_CHECK, GuardOptions, is_already_guarded, last_non_blank, line_ending_of,
};
use crate::targets::Targets;
use regex::Regex;
use serde::Serialize;

/// Result of one `guard_call_sites` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallSiteOutcome {
    #[serde(skip)]
    pub text: String,
    pub guarded: Vec<String>,
    pub skipped: Vec<String>,
}

impl CallSiteOutcome {
    pub fn changed(&self) -> bool {
        !self.guarded.is_empty()
    }
}

/// Compiled matcher for one set of registration functions.
#[derive(Debug, Clone)]
pub struct CallSiteGuard {
    pattern: Option<Regex>,
    indent: String,
}

impl CallSiteGuard {
    pub fn new(options: &GuardOptions) -> Self {
        Self {
            pattern: registration_regex(&options.registration_functions),
            indent: options.indent.clone(),
        }
    }

    pub fn guard_call_sites(&self, document: &str, targets: &Targets) -> CallSiteOutcome {
        let mut outcome = CallSiteOutcome::default();
        let Some(pattern) = &self.pattern else {
            outcome.text = document.to_string();
            return outcome;
        };

        let mut out: Vec<String> = Vec::new();
        for (idx, line) in document.split('\n').enumerate() {
            let Some(caps) = pattern.captures(line) else {
                out.push(line.to_string());
                continue;
            };
            let (Some(stmt), Some(name)) = (caps.get(0), caps.name("name")) else {
                out.push(line.to_string());
                continue;
            };
            let name = name.as_str();
            if !targets.contains(name) {
                out.push(line.to_string());
                continue;
            }

            let prefix = &line[..stmt.start()];
            let guarded_already = is_already_guarded(name, prefix)
                || last_non_blank(&out).is_some_and(|prev| is_already_guarded(name, prev));
            if guarded_already {
                tracing::debug!(function = name, line = idx + 1, "registration already guarded");
                outcome.skipped.push(name.to_string());
                out.push(line.to_string());
                continue;
            }

            let eol = line_ending_of(line);
            let lead: &str = &line[..line.len() - line.trim_start().len()];
            let rest = line[stmt.end()..].trim();
            let trailer = if rest.is_empty() {
                String::new()
            } else {
                format!(" {rest}")
            };

            out.push(format!("{prefix}if ({EXISTENCE_CHECK}('{name}')) {{{eol}"));
            out.push(format!("{lead}{}{}{eol}", self.indent, stmt.as_str()));
            out.push(format!("{lead}}}{trailer}{eol}"));

            tracing::debug!(function = name, line = idx + 1, "guarded registration");
            outcome.guarded.push(name.to_string());
        }

        outcome.text = out.join("\n");
        outcome
    }
}

/// `register('hook', 'callback'[, priority[, args]]);` for the given register functions.
fn registration_regex(functions: &[String]) -> Option<Regex> {
    let alternatives: Vec<String> = functions
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return None;
    }

    let pattern = format!(
        r#"\b(?:{})\s*\(\s*['"][^'"]+['"]\s*,\s*['"](?P<name>[A-Za-z_\x{{80}}-\x{{10FFFF}}][A-Za-z0-9_\x{{80}}-\x{{10FFFF}}]*)['"](?:\s*,\s*\d+)*\s*\)\s*;"#,
        alternatives.join("|")
    );
    Regex::new(&pattern).ok()
}

/// Guard registration call sites using `options.registration_functions`.
pub fn guard_call_sites(
    document: &str,
    targets: &Targets,
    options: &GuardOptions,
) -> CallSiteOutcome {
    CallSiteGuard::new(options).guard_call_sites(document, targets)
}
