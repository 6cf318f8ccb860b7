//! Redis `SCAN MATCH` patterns on top of `globset`.
//!
//! Redis globs differ from shell globs in a few places: `[^..]` negates a
//! class, `\` escapes inside classes, reversed ranges are swapped, an
//! unterminated `[` is a literal and `*` crosses `/`. Patterns are rewritten
//! into `globset` syntax with those rules applied.

use globset::{GlobBuilder, GlobMatcher};
use std::collections::BTreeSet;

/// Characters with a meaning of their own at some position of a `globset`
/// class.
const CLASS_SPECIALS: [char; 4] = ['!', '-', ']', '^'];

/// A compiled Redis glob.
#[derive(Debug, Clone)]
pub struct RedisGlob {
    // `None` for patterns that can never match, such as `[]`
    matcher: Option<GlobMatcher>,
}

impl RedisGlob {
    /// Compile a Redis glob pattern.
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let matcher = translate(pattern).and_then(|translated| {
            GlobBuilder::new(&translated)
                .literal_separator(false)
                .backslash_escape(true)
                .build()
                .map_err(|e| tracing::debug!(pattern, error = %e, "Unusable glob pattern"))
                .ok()
                .map(|glob| glob.compile_matcher())
        });
        Self { matcher }
    }

    /// Returns true if `text` matches.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.as_ref().is_some_and(|m| m.is_match(text))
    }
}

/// Returns true if `text` matches the Redis glob `pattern`.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    RedisGlob::new(pattern).is_match(text)
}

/// Rewrites a Redis glob into `globset` syntax. `None` if nothing can match.
fn translate(pattern: &str) -> Option<String> {
    let p: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut i = 0;

    while i < p.len() {
        match p[i] {
            '*' => {
                // runs of `*` mean the same as one, and `**` is special in globset
                while i + 1 < p.len() && p[i + 1] == '*' {
                    i += 1;
                }
                out.push('*');
            }
            '?' => out.push('?'),
            '\\' if i + 1 < p.len() => {
                i += 1;
                push_literal(&mut out, p[i]);
            }
            '[' => {
                if let Some((class, end)) = Class::parse(&p, i + 1) {
                    out.push_str(&class.render()?);
                    i = end;
                    continue;
                }
                push_literal(&mut out, '[');
            }
            c => push_literal(&mut out, c),
        }
        i += 1;
    }

    Some(out)
}

fn push_literal(out: &mut String, c: char) {
    if matches!(c, '*' | '?' | '[' | ']' | '{' | '}' | '\\' | ',') {
        out.push('\\');
    }
    out.push(c);
}

/// A parsed `[...]` class: inclusive ranges plus the class-special
/// characters it contains, kept apart so they can be placed where
/// `globset` reads them literally.
#[derive(Debug, Default)]
struct Class {
    negated: bool,
    ranges: Vec<(char, char)>,
    specials: BTreeSet<char>,
}

impl Class {
    /// Parses the class body starting after `[`. Returns the class and the
    /// index after `]`, or `None` if the class is never closed.
    fn parse(p: &[char], start: usize) -> Option<(Self, usize)> {
        let mut class = Self::default();
        let mut i = start;
        if i < p.len() && p[i] == '^' {
            class.negated = true;
            i += 1;
        }

        while i < p.len() {
            if p[i] == ']' {
                return Some((class, i + 1));
            }

            if p[i] == '\\' && i + 1 < p.len() {
                class.add(p[i + 1], p[i + 1]);
                i += 2;
            } else if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' {
                class.add(p[i], p[i + 2]);
                i += 3;
            } else {
                class.add(p[i], p[i]);
                i += 1;
            }
        }

        None
    }

    /// Adds an inclusive range, cutting class-special characters out of it.
    fn add(&mut self, a: char, b: char) {
        let (mut lo, hi) = if a <= b { (a, b) } else { (b, a) };

        for special in CLASS_SPECIALS {
            if special < lo || special > hi {
                continue;
            }
            self.specials.insert(special);
            if special > lo {
                self.ranges.push((lo, prev_char(special)));
            }
            match next_char(special) {
                Some(next) if special < hi => lo = next,
                _ => return,
            }
        }

        self.ranges.push((lo, hi));
    }

    fn render(&self) -> Option<String> {
        if self.ranges.is_empty() && self.specials.is_empty() {
            return self.negated.then(|| "?".to_string());
        }

        let bang_or_caret: Vec<char> = ['!', '^']
            .into_iter()
            .filter(|c| self.specials.contains(c))
            .collect();

        // `[!]` and `[^]` would read as negations, so a class holding only
        // those becomes an escaped literal or an alternation
        if !self.negated
            && self.ranges.is_empty()
            && !self.specials.contains(&']')
            && !self.specials.contains(&'-')
        {
            let escaped: Vec<String> = bang_or_caret.iter().map(|c| format!("\\{}", c)).collect();
            return Some(match escaped.as_slice() {
                [one] => one.clone(),
                many => format!("{{{}}}", many.join(",")),
            });
        }

        let mut out = String::from("[");
        if self.negated {
            out.push('!');
        }

        let leading_dash = !self.negated && !self.specials.contains(&']') && self.ranges.is_empty();
        if self.specials.contains(&']') {
            out.push(']');
        } else if leading_dash {
            out.push('-');
        }

        for &(lo, hi) in &self.ranges {
            out.push(lo);
            if hi != lo {
                out.push('-');
                out.push(hi);
            }
        }
        out.extend(bang_or_caret);

        if self.specials.contains(&'-') && !leading_dash {
            out.push('-');
        }
        out.push(']');
        Some(out)
    }
}

fn prev_char(c: char) -> char {
    char::from_u32(u32::from(c) - 1).unwrap_or(c)
}

fn next_char(c: char) -> Option<char> {
    char::from_u32(u32::from(c) + 1)
}
