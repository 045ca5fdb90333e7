//! Block boundary detection.
//!
//! Callers only see [`BlockScanner::find_block_end`]; the default
//! [`BraceCounter`] counts raw `{` / `}` characters per line and does not know
//! about strings, comments or heredocs. A real tokenizer can be dropped in
//! behind the same trait.

/// Locates the line that closes the block opened at or after `start`.
pub trait BlockScanner {
    /// Return the index of the line on which the block starting at
    /// `lines[start]` closes, or `None` when the document ends first.
    fn find_block_end(&self, lines: &[&str], start: usize) -> Option<usize>;
}

/// Character-counting scanner.
///
/// Depth starts at zero on the declaration line and the block is considered
/// open once the first `{` is seen, so bodies whose brace sits on the
/// following line are handled too.
#[derive(Debug, Default, Clone, Copy)]
pub struct BraceCounter;

impl BlockScanner for BraceCounter {
    fn find_block_end(&self, lines: &[&str], start: usize) -> Option<usize> {
        let mut depth: isize = 0;
        let mut opened = false;

        for (idx, line) in lines.iter().enumerate().skip(start) {
            for ch in line.chars() {
                match ch {
                    '{' => {
                        depth += 1;
                        opened = true;
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }

            if opened && depth <= 0 {
                return Some(idx);
            }
        }

        None
    }
}

/// Net brace change contributed by a single line.
pub fn brace_delta(line: &str) -> isize {
    line.chars().fold(0, |acc, ch| match ch {
        '{' => acc + 1,
        '}' => acc - 1,
        _ => acc,
    })
}

/// Net brace balance of a whole document.
pub fn brace_balance(document: &str) -> isize {
    document.split('\n').map(brace_delta).sum()
}
