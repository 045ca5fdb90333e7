//! Wraps top-level PHP function declarations in `function_exists` guards.
//!
//! The transformation is line oriented: a declaration header is recognised
//! by [`declaration_regex`], its body end comes from a [`BlockScanner`], and
//! the whole span is re-emitted inside
//! `if (!function_exists('name')) { ... }`. Declarations that already sit
//! directly under such a guard are copied through, so repeated runs are
//! no-ops.

use crate::scanner::{BlockScanner, BraceCounter};
use crate::targets::Targets;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Token used by PHP to test whether a function is already defined.
pub const EXISTENCE_CHECK: &str = "function_exists";

/// Knobs shared by the declaration and call-site guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOptions {
    /// One level of indentation added in front of a wrapped declaration.
    pub indent: String,
    /// Also match declarations that do not start at column zero.
    pub match_indented: bool,
    /// Functions whose `(hook, 'callback')` calls are gated by the call-site guard.
    pub registration_functions: Vec<String>,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            indent: "    ".to_string(),
            match_indented: false,
            registration_functions: vec!["add_action".to_string(), "add_filter".to_string()],
        }
    }
}

/// Result of one `guard_declarations` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GuardOutcome {
    #[serde(skip)]
    pub text: String,
    /// Declarations that received a new guard, in document order.
    pub guarded: Vec<String>,
    /// Declarations that were already guarded.
    pub skipped: Vec<String>,
    /// Declarations whose body never closed; their guard ends at end of file.
    pub unterminated: Vec<String>,
}

impl GuardOutcome {
    pub fn changed(&self) -> bool {
        !self.guarded.is_empty()
    }
}

/// `function name(` at the start of a line, optionally indented and by-reference.
pub fn declaration_regex() -> &'static Regex {
    static DECL_RE: OnceLock<Regex> = OnceLock::new();
    DECL_RE.get_or_init(|| {
        Regex::new(concat!(
            r"^([ \t]*)function\s+(?:&\s*)?",
            r"([A-Za-z_\x{80}-\x{10FFFF}][A-Za-z0-9_\x{80}-\x{10FFFF}]*)\s*\(",
        ))
        .unwrap()
    })
}

/// A declaration header found on a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclarationHeader<'a> {
    /// Leading whitespace before `function`.
    pub lead: &'a str,
    pub name: &'a str,
}

/// Match `line` against the declaration pattern.
pub fn match_declaration<'a>(
    line: &'a str,
    options: &GuardOptions,
) -> Option<DeclarationHeader<'a>> {
    let caps = declaration_regex().captures(line)?;
    let lead = caps.get(1).map_or("", |m| m.as_str());
    if !lead.is_empty() && !options.match_indented {
        return None;
    }
    let name = caps.get(2)?.as_str();
    Some(DeclarationHeader { lead, name })
}

/// Does `preceding_line` already test `function_exists` for `ident`?
///
/// Whitespace is ignored and either quote style is accepted, so both
/// `if (!function_exists('x')) {` and `if ( function_exists( "x" ) ) {` count.
pub fn is_already_guarded(ident: &str, preceding_line: &str) -> bool {
    let compact: String = preceding_line
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if !compact.contains(EXISTENCE_CHECK) {
        return false;
    }
    compact.contains(&format!("{EXISTENCE_CHECK}('{ident}')"))
        || compact.contains(&format!("{EXISTENCE_CHECK}(\"{ident}\")"))
}

/// Last line in `out` that is not blank.
pub(crate) fn last_non_blank(out: &[String]) -> Option<&str> {
    out.iter()
        .rev()
        .map(String::as_str)
        .find(|l| !l.trim().is_empty())
}

/// `"\r"` when the line came from a CRLF file, otherwise empty.
pub(crate) fn line_ending_of(line: &str) -> &'static str {
    if line.ends_with('\r') { "\r" } else { "" }
}

/// Declaration guard parameterised over the block scanner.
#[derive(Debug, Clone, Default)]
pub struct GuardTransformer<S: BlockScanner = BraceCounter> {
    scanner: S,
    options: GuardOptions,
}

impl GuardTransformer<BraceCounter> {
    pub fn new(options: GuardOptions) -> Self {
        Self {
            scanner: BraceCounter,
            options,
        }
    }
}

impl<S: BlockScanner> GuardTransformer<S> {
    pub fn with_scanner(scanner: S, options: GuardOptions) -> Self {
        Self { scanner, options }
    }

    /// Rewrite `document` so every targeted, unguarded declaration is wrapped.
    pub fn guard_declarations(&self, document: &str, targets: &Targets) -> GuardOutcome {
        let lines: Vec<&str> = document.split('\n').collect();
        let mut out: Vec<String> = Vec::with_capacity(lines.len() + 8);
        let mut outcome = GuardOutcome::default();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];

            let Some(header) = match_declaration(line, &self.options) else {
                out.push(line.to_string());
                i += 1;
                continue;
            };

            if !targets.contains(header.name) {
                out.push(line.to_string());
                i += 1;
                continue;
            }

            if last_non_blank(&out).is_some_and(|prev| is_already_guarded(header.name, prev)) {
                tracing::debug!(function = header.name, line = i + 1, "already guarded");
                outcome.skipped.push(header.name.to_string());
                out.push(line.to_string());
                i += 1;
                continue;
            }

            let Some(end) = self.scanner.find_block_end(&lines, i) else {
                tracing::warn!(
                    function = header.name,
                    line = i + 1,
                    "function body never closes; left unguarded"
                );
                outcome.unterminated.push(header.name.to_string());
                out.push(line.to_string());
                i += 1;
                continue;
            };

            let eol = line_ending_of(line);
            let lead = header.lead;
            out.push(format!(
                "{lead}if (!{EXISTENCE_CHECK}('{}')) {{{eol}",
                header.name
            ));
            out.push(format!("{}{line}", self.options.indent));
            out.extend(lines[i + 1..=end].iter().map(|l| l.to_string()));
            out.push(format!("{lead}}}{eol}"));
            i = end + 1;

            tracing::debug!(function = header.name, "guarded declaration");
            outcome.guarded.push(header.name.to_string());
        }

        outcome.text = out.join("\n");
        outcome
    }
}

/// Guard declarations using the default brace-counting scanner.
pub fn guard_declarations(
    document: &str,
    targets: &Targets,
    options: &GuardOptions,
) -> GuardOutcome {
    GuardTransformer::new(options.clone()).guard_declarations(document, targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str, targets: &Targets) -> GuardOutcome {
        guard_declarations(src, targets, &GuardOptions::default())
    }

    #[test]
    fn wraps_simple_declaration() {
        let src = "<?php\nfunction gi_content_width() {\n    $GLOBALS['content_width'] = 800;\n}\n";
        let out = run(src, &Targets::All);
        assert_eq!(
            out.text,
            "<?php\nif (!function_exists('gi_content_width')) {\n    function gi_content_width() {\n    $GLOBALS['content_width'] = 800;\n}\n}\n"
        );
        assert_eq!(out.guarded, vec!["gi_content_width"]);
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn skips_declaration_under_existing_guard() {
        let src = "if (!function_exists('gi_content_width')) {\nfunction gi_content_width() {\n}\n}";
        let out = run(src, &Targets::All);
        assert_eq!(out.text, src);
        assert_eq!(out.skipped, vec!["gi_content_width"]);
        assert!(!out.changed());
    }

    #[test]
    fn guard_for_other_function_does_not_count() {
        let src = "if (!function_exists('gi_other')) {\nfunction gi_content_width() {\n}\n}";
        let out = run(src, &Targets::All);
        assert_eq!(out.guarded, vec!["gi_content_width"]);
    }

    #[test]
    fn blank_lines_between_guard_and_declaration() {
        let src = "if (!function_exists('a')) {\n\n   \nfunction a() {\n}\n}";
        let out = run(src, &Targets::All);
        assert_eq!(out.text, src);
    }

    #[test]
    fn non_targets_untouched() {
        let src = "function a() {\n}\nfunction b() {\n}";
        let targets = Targets::only(["b"]).unwrap();
        let out = run(src, &targets);
        assert_eq!(
            out.text,
            "function a() {\n}\nif (!function_exists('b')) {\n    function b() {\n}\n}"
        );
    }

    #[test]
    fn indented_declarations_need_opt_in() {
        let src = "class X {\n    function method() {\n    }\n}";
        assert_eq!(run(src, &Targets::All).text, src);

        let options = GuardOptions {
            match_indented: true,
            ..GuardOptions::default()
        };
        let src = "  function helper() {\n  }";
        let out = guard_declarations(src, &Targets::All, &options);
        assert_eq!(
            out.text,
            "  if (!function_exists('helper')) {\n      function helper() {\n  }\n  }"
        );
    }

    #[test]
    fn one_line_function() {
        let out = run("function a() { return 1; }\necho a();", &Targets::All);
        assert_eq!(
            out.text,
            "if (!function_exists('a')) {\n    function a() { return 1; }\n}\necho a();"
        );
    }

    #[test]
    fn by_reference_declaration() {
        let header = match_declaration("function &get_ref($a) {", &GuardOptions::default());
        assert_eq!(header.map(|h| h.name), Some("get_ref"));
    }

    #[test]
    fn crlf_lines_keep_their_endings() {
        let src = "function a() {\r\n}\r\n";
        let out = run(src, &Targets::All);
        assert_eq!(
            out.text,
            "if (!function_exists('a')) {\r\n    function a() {\r\n}\r\n}\r\n"
        );
    }

    #[test]
    fn unterminated_body_is_left_unwrapped() {
        let src = "function a() {\n    if (1) {\n}\n";
        let out = run(src, &Targets::All);
        assert_eq!(out.text, src);
        assert!(out.guarded.is_empty());
        assert_eq!(out.unterminated, vec!["a"]);
    }

    #[test]
    fn unterminated_body_does_not_swallow_later_declarations() {
        let src = "<?php\nfunction a() {\n    if (1) {\n}\nfunction b() {\n}\n";
        let once = run(src, &Targets::All);
        assert_eq!(
            once.text,
            "<?php\nfunction a() {\n    if (1) {\n}\nif (!function_exists('b')) {\n    function b() {\n}\n}\n"
        );
        assert_eq!(once.unterminated, vec!["a"]);
        assert_eq!(once.guarded, vec!["b"]);

        let twice = run(&once.text, &Targets::All);
        assert_eq!(twice.text, once.text);
        assert!(twice.guarded.is_empty());
        assert_eq!(twice.unterminated, vec!["a"]);
    }

    struct DeclarationLineOnly;

    impl BlockScanner for DeclarationLineOnly {
        fn find_block_end(&self, _lines: &[&str], start: usize) -> Option<usize> {
            Some(start)
        }
    }

    #[test]
    fn custom_scanner_decides_where_the_guard_closes() {
        let guard = GuardTransformer::with_scanner(DeclarationLineOnly, GuardOptions::default());
        let out = guard.guard_declarations("function a() {\n}\n", &Targets::All);
        assert_eq!(
            out.text,
            "if (!function_exists('a')) {\n    function a() {\n}\n}\n"
        );

        let out = guard.guard_declarations("function a()\n{\n}\n", &Targets::All);
        assert_eq!(
            out.text,
            "if (!function_exists('a')) {\n    function a()\n}\n{\n}\n"
        );
    }

    #[test]
    fn predicate_matches_only_same_identifier() {
        assert!(is_already_guarded("a", "if (!function_exists('a')) {"));
        assert!(is_already_guarded("a", "if ( ! function_exists( \"a\" ) ) {"));
        assert!(is_already_guarded("a", "if (function_exists('a')) {"));
        assert!(!is_already_guarded("a", "if (!function_exists('ab')) {"));
        assert!(!is_already_guarded("a", "// a"));
    }

    #[test]
    fn function_exists_call_is_not_a_declaration() {
        let options = GuardOptions::default();
        assert!(match_declaration("function_exists('x');", &options).is_none());
        assert!(match_declaration("$f = function($x) {", &options).is_none());
    }
}
