//! Script downleveling and minification.
//!
//! A conservative, token-level pass: it understands strings, template
//! literals, comments and regex literals well enough to never rewrite
//! inside them, strips comments, and rewrites `let`/`const` declarations
//! to `var` at statement positions. Anything it is not sure about is left
//! untouched. The [`Transform`] trait is the seam where a full transpiler
//! would plug in.

use super::{Transform, TransformError};
use std::path::Path;

/// Lexer output: one significant chunk of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Code outside any literal, with comments removed
    Code(String),
    /// String, template or regex literal, kept verbatim
    Literal(String),
    /// A run of whitespace; true if it contained a newline
    Space(bool),
}

/// Characters after which a `/` starts a regex literal rather than division.
const REGEX_PRECEDERS: &[char] =
    &['(', ',', '=', ':', '[', '!', '&', '|', '?', '{', ';', '+', '-', '*', '%', '<', '>', '~'];

/// Split source into code, literals and whitespace, dropping comments.
///
/// Fails on unterminated strings, templates or block comments so a broken
/// source file aborts the task instead of producing corrupt output.
fn tokenize(source: &str, path: &Path) -> Result<Vec<Token>, TransformError> {
    let mut tokens = Vec::new();
    let mut code = String::new();
    let mut chars = source.chars().peekable();
    let mut line: u32 = 1;
    // Last significant character seen, for regex-vs-division disambiguation
    let mut last_significant: Option<char> = None;

    macro_rules! flush_code {
        () => {
            if !code.is_empty() {
                tokens.push(Token::Code(std::mem::take(&mut code)));
            }
        };
    }

    while let Some(c) = chars.next() {
        match c {
            '\n' | '\r' | ' ' | '\t' => {
                flush_code!();
                let mut newline = c == '\n' || c == '\r';
                if c == '\n' {
                    line += 1;
                }
                while let Some(&w) = chars.peek() {
                    if !w.is_whitespace() {
                        break;
                    }
                    if w == '\n' {
                        line += 1;
                        newline = true;
                    }
                    chars.next();
                }
                // Merge adjacent whitespace runs (comments in between collapse)
                if let Some(Token::Space(had_newline)) = tokens.last_mut() {
                    *had_newline = *had_newline || newline;
                } else {
                    tokens.push(Token::Space(newline));
                }
            }
            '\'' | '"' => {
                flush_code!();
                let start_line = line;
                let mut lit = String::new();
                lit.push(c);
                let mut closed = false;
                while let Some(n) = chars.next() {
                    lit.push(n);
                    match n {
                        '\\' => {
                            if let Some(esc) = chars.next() {
                                if esc == '\n' {
                                    line += 1;
                                }
                                lit.push(esc);
                            }
                        }
                        '\n' => {
                            return Err(TransformError::with_line(
                                path,
                                start_line,
                                "unterminated string literal",
                            ))
                        }
                        _ if n == c => {
                            closed = true;
                            break;
                        }
                        _ => {}
                    }
                }
                if !closed {
                    return Err(TransformError::with_line(
                        path,
                        start_line,
                        "unterminated string literal",
                    ));
                }
                last_significant = Some(c);
                tokens.push(Token::Literal(lit));
            }
            '`' => {
                flush_code!();
                let start_line = line;
                let mut lit = String::new();
                lit.push(c);
                let mut closed = false;
                while let Some(n) = chars.next() {
                    if n == '\n' {
                        line += 1;
                    }
                    lit.push(n);
                    match n {
                        '\\' => {
                            if let Some(esc) = chars.next() {
                                if esc == '\n' {
                                    line += 1;
                                }
                                lit.push(esc);
                            }
                        }
                        '`' => {
                            closed = true;
                            break;
                        }
                        _ => {}
                    }
                }
                if !closed {
                    return Err(TransformError::with_line(
                        path,
                        start_line,
                        "unterminated template literal",
                    ));
                }
                last_significant = Some('`');
                tokens.push(Token::Literal(lit));
            }
            '/' => match chars.peek().copied() {
                Some('/') => {
                    flush_code!();
                    while let Some(&n) = chars.peek() {
                        if n == '\n' {
                            break;
                        }
                        chars.next();
                    }
                }
                Some('*') => {
                    flush_code!();
                    let start_line = line;
                    chars.next();
                    let mut closed = false;
                    let mut prev = '\0';
                    for n in chars.by_ref() {
                        if n == '\n' {
                            line += 1;
                        }
                        if prev == '*' && n == '/' {
                            closed = true;
                            break;
                        }
                        prev = n;
                    }
                    if !closed {
                        return Err(TransformError::with_line(
                            path,
                            start_line,
                            "unterminated block comment",
                        ));
                    }
                }
                _ if regex_position(last_significant) => {
                    flush_code!();
                    let start_line = line;
                    let mut lit = String::new();
                    lit.push('/');
                    let mut in_class = false;
                    let mut closed = false;
                    while let Some(n) = chars.next() {
                        lit.push(n);
                        match n {
                            '\\' => {
                                if let Some(esc) = chars.next() {
                                    lit.push(esc);
                                }
                            }
                            '[' => in_class = true,
                            ']' => in_class = false,
                            '\n' => {
                                return Err(TransformError::with_line(
                                    path,
                                    start_line,
                                    "unterminated regex literal",
                                ))
                            }
                            '/' if !in_class => {
                                closed = true;
                                break;
                            }
                            _ => {}
                        }
                    }
                    if !closed {
                        return Err(TransformError::with_line(
                            path,
                            start_line,
                            "unterminated regex literal",
                        ));
                    }
                    last_significant = Some('/');
                    tokens.push(Token::Literal(lit));
                }
                _ => {
                    code.push('/');
                    last_significant = Some('/');
                }
            },
            _ => {
                code.push(c);
                last_significant = Some(c);
            }
        }
    }
    flush_code!();

    Ok(tokens)
}

/// Whether a `/` after this character starts a regex literal.
fn regex_position(last_significant: Option<char>) -> bool {
    match last_significant {
        None => true,
        Some(c) => REGEX_PRECEDERS.contains(&c),
    }
}

/// Rewrite `let` and `const` declaration keywords to `var` in a code chunk.
///
/// Only rewrites a keyword that starts a statement within the chunk, which
/// keeps property names like `obj.let` and identifiers intact.
fn downlevel_code(code: &str, at_statement_start: bool) -> String {
    let mut out = String::with_capacity(code.len());
    let mut word = String::new();
    let mut statement_start = at_statement_start;

    let mut flush_word = |word: &mut String, out: &mut String, statement_start: bool| {
        if statement_start && (word == "let" || word == "const") {
            out.push_str("var");
        } else {
            out.push_str(word);
        }
        word.clear();
    };

    for c in code.chars() {
        if c.is_alphanumeric() || c == '_' || c == '$' {
            word.push(c);
        } else {
            if !word.is_empty() {
                flush_word(&mut word, &mut out, statement_start);
                statement_start = false;
            }
            out.push(c);
            statement_start = matches!(c, ';' | '{' | '}' | '(');
        }
    }
    if !word.is_empty() {
        flush_word(&mut word, &mut out, statement_start);
    }

    out
}

/// The script capability used by the compile stage.
#[derive(Debug, Default)]
pub struct ScriptTransform;

impl Transform for ScriptTransform {
    fn apply(&self, source: &str, path: &Path) -> Result<String, TransformError> {
        let tokens = tokenize(source, path)?;
        let mut out = String::with_capacity(source.len());
        // A whitespace run between code chunks keeps statement-start state
        let mut statement_start = true;

        for token in tokens {
            match token {
                Token::Code(code) => {
                    out.push_str(&downlevel_code(&code, statement_start));
                    statement_start = code
                        .chars()
                        .rev()
                        .find(|c| !c.is_whitespace())
                        .map(|c| matches!(c, ';' | '{' | '}' | '('))
                        .unwrap_or(statement_start);
                }
                Token::Literal(lit) => {
                    out.push_str(&lit);
                    statement_start = false;
                }
                Token::Space(newline) => {
                    out.push(if newline { '\n' } else { ' ' });
                    // A newline may end the previous statement
                    statement_start = statement_start || newline;
                }
            }
        }

        Ok(out)
    }
}

/// Minify a script for bundling: drop comments and collapse whitespace.
///
/// Whitespace runs containing a newline collapse to a single newline, not
/// nothing, so automatic semicolon insertion keeps working.
pub fn minify_js(source: &str, path: &Path) -> Result<String, TransformError> {
    let tokens = tokenize(source, path)?;
    let mut out = String::with_capacity(source.len());

    for token in &tokens {
        match token {
            Token::Code(code) => out.push_str(code),
            Token::Literal(lit) => out.push_str(lit),
            Token::Space(newline) => out.push(if *newline { '\n' } else { ' ' }),
        }
    }

    Ok(out.trim().to_string())
}
