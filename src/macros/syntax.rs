//! ES5 syntax gate for JS macros.
//!
//! The WPS JSA engine only runs ES5. Template literals, arrow functions,
//! `async` and `class` are rejected before code reaches the task pane.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static ARROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"=>").expect("arrow regex is valid"));
static ASYNC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(async|await)\b").expect("async regex is valid"));
static CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bclass\s+[A-Za-z_$]").expect("class regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedSyntax {
    TemplateLiteral,
    ArrowFunction,
    Async,
    Class,
}

impl UnsupportedSyntax {
    pub fn describe(&self) -> &'static str {
        match self {
            UnsupportedSyntax::TemplateLiteral => "template literal (`...`); use string concatenation",
            UnsupportedSyntax::ArrowFunction => "arrow function (=>); use function () {}",
            UnsupportedSyntax::Async => "async/await; use synchronous calls",
            UnsupportedSyntax::Class => "class declaration; use constructor functions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxIssue {
    pub kind: UnsupportedSyntax,
    /// 1-based line of the first occurrence.
    pub line: usize,
}

impl std::fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind.describe())
    }
}

/// Blank out string literals and comments, keeping line structure.
///
/// Returns the blanked code and the lines where template literals start.
fn blank_strings_and_comments(code: &str) -> (String, Vec<usize>) {
    #[derive(PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Str(char),
    }

    let mut out = String::with_capacity(code.len());
    let mut templates = Vec::new();
    let mut state = State::Code;
    let mut line = 1;
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
            if state == State::LineComment {
                state = State::Code;
            }
            out.push('\n');
            continue;
        }
        match state {
            State::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = State::LineComment;
                    out.push_str("  ");
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                    out.push_str("  ");
                }
                '"' | '\'' | '`' => {
                    if c == '`' {
                        templates.push(line);
                    }
                    state = State::Str(c);
                    out.push(' ');
                }
                _ => out.push(c),
            },
            State::LineComment => out.push(' '),
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                    out.push_str("  ");
                } else {
                    out.push(' ');
                }
            }
            State::Str(quote) => {
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        if escaped == '\n' {
                            line += 1;
                            out.push('\n');
                        } else {
                            out.push(' ');
                        }
                    }
                    out.push(' ');
                } else if c == quote {
                    state = State::Code;
                    out.push(' ');
                } else {
                    out.push(' ');
                }
            }
        }
    }
    (out, templates)
}

fn line_of(text: &str, byte: usize) -> usize {
    text[..byte].matches('\n').count() + 1
}

/// Find ES6+ constructs the macro engine cannot run.
///
/// Strings and comments are ignored, so `"a => b"` or `// class Foo` pass.
/// At most one issue per kind is reported.
pub fn detect_unsupported_syntax(code: &str) -> Vec<SyntaxIssue> {
    let (blanked, templates) = blank_strings_and_comments(code);
    let mut issues = Vec::new();
    if let Some(line) = templates.first() {
        issues.push(SyntaxIssue {
            kind: UnsupportedSyntax::TemplateLiteral,
            line: *line,
        });
    }
    let checks: [(&Lazy<Regex>, UnsupportedSyntax); 3] = [
        (&ARROW_RE, UnsupportedSyntax::ArrowFunction),
        (&ASYNC_RE, UnsupportedSyntax::Async),
        (&CLASS_RE, UnsupportedSyntax::Class),
    ];
    for (re, kind) in checks {
        if let Some(m) = re.find(&blanked) {
            issues.push(SyntaxIssue {
                kind,
                line: line_of(&blanked, m.start()),
            });
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_es5_passes() {
        let code = "var doc = Application.ActiveDocument;\nfunction add(a, b) { return a + b; }\n";
        assert!(detect_unsupported_syntax(code).is_empty());
    }

    #[test]
    fn test_detects_each_kind_with_line() {
        let code = "var f = (x) => x;\nvar s = `hi ${f(1)}`;\nasync function g() {}\nclass Foo {}\n";
        let issues = detect_unsupported_syntax(code);
        let kinds: Vec<_> = issues.iter().map(|i| (i.kind, i.line)).collect();
        assert_eq!(
            kinds,
            vec![
                (UnsupportedSyntax::TemplateLiteral, 2),
                (UnsupportedSyntax::ArrowFunction, 1),
                (UnsupportedSyntax::Async, 3),
                (UnsupportedSyntax::Class, 4),
            ]
        );
    }

    #[test]
    fn test_strings_and_comments_ignored() {
        let code = "var a = \"x => y\"; // class Foo uses async\n/* `template` */ var b = 'async';";
        assert!(detect_unsupported_syntax(code).is_empty());
    }

    #[test]
    fn test_display_mentions_line() {
        let issue = SyntaxIssue {
            kind: UnsupportedSyntax::ArrowFunction,
            line: 3,
        };
        assert_eq!(issue.to_string(), "line 3: arrow function (=>); use function () {}");
    }
}
