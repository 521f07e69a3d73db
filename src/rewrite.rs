//! Rewrite `?` / `:name` templates into the driver's placeholder syntax.
//!
//! The scanner skips single-quoted literals (with `''` escapes), double-quoted identifiers,
//! `--` and nested `/* */` comments, and, for dialects with dollar quoting, `$tag$` blocks.
//! Outside of those, `?` is a positional marker, `:ident` a named marker, and `??` / `::`
//! escape a literal `?` / `:`.

use std::collections::HashMap;

use thiserror::Error;

use crate::args::{Arguments, TypedArgument};
use crate::dialect::DialectProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteErrorKind {
    MixedStyles,
    Mismatch,
    InvalidArgument,
}

/// A rewrite failure before any SQL context is attached.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RewriteError {
    pub kind: RewriteErrorKind,
    pub message: String,
}

impl RewriteError {
    fn mismatch(message: String) -> Self {
        Self {
            kind: RewriteErrorKind::Mismatch,
            message,
        }
    }
}

/// Native SQL plus the values to bind, in placeholder order.
#[derive(Debug)]
pub struct RewrittenStatement {
    sql: String,
    args: Vec<TypedArgument>,
    // Text around each placeholder; always `args.len() + 1` entries.
    fragments: Vec<String>,
    // Trailing whitespace and comments, copied verbatim to the end of `sql`.
    tail_len: usize,
}

impl RewrittenStatement {
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn args(&self) -> &[TypedArgument] {
        &self.args
    }

    /// Append a clause such as `returning id` to the end of the statement.
    ///
    /// The clause goes after the last piece of SQL code: trailing `;` terminators are dropped,
    /// and trailing whitespace and comments stay behind the clause.
    pub fn append_clause(&mut self, clause: &str) {
        append_before_tail(&mut self.sql, self.tail_len, clause);
        if let Some(last) = self.fragments.last_mut() {
            append_before_tail(last, self.tail_len, clause);
        }
    }

    /// Split into the native SQL and the bind values.
    #[must_use]
    pub fn into_parts(self) -> (String, Vec<TypedArgument>) {
        (self.sql, self.args)
    }

    /// The SQL with every bound value substituted as a literal, for diagnostics only.
    #[must_use]
    pub fn debug_sql(&self) -> String {
        let mut out = String::with_capacity(self.sql.len() + self.args.len() * 8);
        for (fragment, arg) in self.fragments.iter().zip(&self.args) {
            out.push_str(fragment);
            out.push_str(&arg.render_literal());
        }
        if let Some(tail) = self.fragments.last() {
            out.push_str(tail);
        }
        out
    }
}

// The tail is the same bytes at the end of both `sql` and the last fragment, so the split
// lands on a char boundary in either.
fn append_before_tail(text: &mut String, tail_len: usize, clause: &str) {
    let tail = text.split_off(text.len().saturating_sub(tail_len));
    let code_len = text
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .len();
    text.truncate(code_len);
    text.push(' ');
    text.push_str(clause.trim());
    text.push_str(&tail);
}

#[derive(Debug, PartialEq, Eq)]
enum Piece<'a> {
    Text(&'a str),
    Escaped(char),
    Positional,
    Named(&'a str),
}

#[derive(Clone, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

struct Scanned<'a> {
    pieces: Vec<Piece<'a>>,
    // Bytes after the last piece of code: whitespace and comments only.
    tail_len: usize,
}

fn scan(sql: &str, dollar_quoting: bool) -> Scanned<'_> {
    let bytes = sql.as_bytes();
    let mut pieces = Vec::new();
    let mut state = State::Normal;
    let mut text_start = 0;
    let mut code_end = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => {
                    state = State::SingleQuoted;
                    code_end = idx + 1;
                }
                b'"' => {
                    state = State::DoubleQuoted;
                    code_end = idx + 1;
                }
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' if dollar_quoting && !follows_identifier(bytes, idx) => {
                    if let Some((tag, end)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = end;
                    }
                    code_end = idx + 1;
                }
                b'?' | b':' if bytes.get(idx + 1) == Some(&b) => {
                    push_text(&mut pieces, sql, text_start, idx);
                    pieces.push(Piece::Escaped(char::from(b)));
                    idx += 2;
                    text_start = idx;
                    code_end = idx;
                    continue;
                }
                b'?' => {
                    push_text(&mut pieces, sql, text_start, idx);
                    pieces.push(Piece::Positional);
                    idx += 1;
                    text_start = idx;
                    code_end = idx;
                    continue;
                }
                b':' if bytes.get(idx + 1).is_some_and(u8::is_ascii_alphabetic) => {
                    let name_end = identifier_end(bytes, idx + 1);
                    push_text(&mut pieces, sql, text_start, idx);
                    pieces.push(Piece::Named(&sql[idx + 1..name_end]));
                    idx = name_end;
                    text_start = idx;
                    code_end = idx;
                    continue;
                }
                _ if b.is_ascii_whitespace() => {}
                _ => code_end = idx + 1,
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
                code_end = idx + 1;
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
                code_end = idx + 1;
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && closes_dollar_quote(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
                code_end = idx + 1;
            }
        }
        idx += 1;
    }

    push_text(&mut pieces, sql, text_start, bytes.len());
    Scanned {
        pieces,
        tail_len: bytes.len() - code_end.min(bytes.len()),
    }
}

// Markers are ASCII, so every index handed in sits on a char boundary.
fn push_text<'a>(pieces: &mut Vec<Piece<'a>>, sql: &'a str, start: usize, end: usize) {
    if start < end {
        pieces.push(Piece::Text(&sql[start..end]));
    }
}

// `a$b$c` is one identifier, not the start of a `$b$` string.
fn follows_identifier(bytes: &[u8], idx: usize) -> bool {
    idx.checked_sub(1).is_some_and(|prev| {
        let b = bytes[prev];
        b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
    })
}

fn identifier_end(bytes: &[u8], start: usize) -> usize {
    let mut idx = start;
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    idx
}

/// Recognise `$$` or `$tag$`, returning the tag and the index of the closing `$`.
fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    if bytes.get(idx).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
        idx += 1;
    }
    if idx < bytes.len() {
        let tag = std::str::from_utf8(&bytes[start + 1..idx]).ok()?;
        Some((tag.to_string(), idx))
    } else {
        None
    }
}

fn closes_dollar_quote(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    end < bytes.len() && &bytes[idx + 1..end] == tag.as_bytes() && bytes[end] == b'$'
}

/// Rewrite `template` for `profile`, resolving `args` into bind order.
///
/// Dialect rewrite markers are spliced into the SQL text and consume no placeholder.
///
/// # Errors
/// * `MixedStyles` when the template uses both `?` and `:name`.
/// * `Mismatch` when the argument count or names disagree with the template, including
///   arguments that are supplied but never referenced.
/// * `InvalidArgument` when a streaming argument is referenced more than once.
pub fn rewrite(
    template: &str,
    args: Arguments,
    profile: &DialectProfile,
) -> Result<RewrittenStatement, RewriteError> {
    let Scanned { pieces, tail_len } = scan(template, profile.dollar_quoting);
    let positional = pieces.iter().filter(|p| matches!(p, Piece::Positional)).count();
    let named = pieces.iter().filter(|p| matches!(p, Piece::Named(_))).count();

    if positional > 0 && named > 0 {
        return Err(RewriteError {
            kind: RewriteErrorKind::MixedStyles,
            message: format!(
                "SQL uses both positional (?) and named (:name) parameters ({positional} positional, {named} named)"
            ),
        });
    }

    let mut resolved = match args {
        Arguments::Named(named_args) => {
            if positional > 0 {
                return Err(RewriteError::mismatch(format!(
                    "SQL uses {positional} positional (?) parameter(s) but named arguments were supplied"
                )));
            }
            resolve_named(&pieces, named_args)?
        }
        Arguments::Positional(list) => {
            if named > 0 {
                return Err(RewriteError::mismatch(format!(
                    "SQL uses {named} named (:name) parameter(s) but positional arguments were supplied"
                )));
            }
            if list.len() != positional {
                return Err(RewriteError::mismatch(format!(
                    "SQL requires {positional} positional argument(s) but {} were supplied",
                    list.len()
                )));
            }
            list
        }
        Arguments::Empty => {
            if positional > 0 || named > 0 {
                return Err(RewriteError::mismatch(format!(
                    "SQL requires {} argument(s) but none were supplied",
                    positional + named
                )));
            }
            Vec::new()
        }
    };

    let mut rewritten = emit(&pieces, &mut resolved, profile);
    rewritten.tail_len = tail_len;
    Ok(rewritten)
}

/// Produce one argument per named marker, in marker order.
fn resolve_named(
    pieces: &[Piece<'_>],
    named_args: Vec<(String, TypedArgument)>,
) -> Result<Vec<TypedArgument>, RewriteError> {
    let mut references: HashMap<&str, usize> = HashMap::new();
    for piece in pieces {
        if let Piece::Named(name) = piece {
            *references.entry(*name).or_default() += 1;
        }
    }

    let mut missing: Vec<&str> = references
        .keys()
        .copied()
        .filter(|name| !named_args.iter().any(|(n, _)| n.as_str() == *name))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(RewriteError::mismatch(format!(
            "SQL references {} but no argument was supplied",
            missing.iter().map(|n| format!(":{n}")).collect::<Vec<_>>().join(", ")
        )));
    }

    let unused: Vec<String> = named_args
        .iter()
        .filter(|(name, _)| !references.contains_key(name.as_str()))
        .map(|(name, _)| format!(":{name}"))
        .collect();
    if !unused.is_empty() {
        return Err(RewriteError::mismatch(format!(
            "argument(s) {} supplied but never referenced by the SQL",
            unused.join(", ")
        )));
    }

    let mut remaining_uses: HashMap<String, (usize, Option<TypedArgument>)> = named_args
        .into_iter()
        .map(|(name, arg)| {
            let uses = references.get(name.as_str()).copied().unwrap_or_default();
            (name, (uses, Some(arg)))
        })
        .collect();

    let mut resolved = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let Piece::Named(name) = piece else {
            continue;
        };
        let Some((uses, slot)) = remaining_uses.get_mut(*name) else {
            return Err(RewriteError::mismatch(format!("no argument supplied for :{name}")));
        };
        *uses -= 1;
        let arg = if *uses == 0 {
            slot.take()
        } else {
            slot.as_ref().and_then(TypedArgument::try_clone)
        };
        match arg {
            Some(arg) => resolved.push(arg),
            None => {
                return Err(RewriteError {
                    kind: RewriteErrorKind::InvalidArgument,
                    message: format!(
                        "streaming argument :{name} is referenced more than once; a stream can only be read once"
                    ),
                });
            }
        }
    }
    Ok(resolved)
}

fn emit(
    pieces: &[Piece<'_>],
    resolved: &mut Vec<TypedArgument>,
    profile: &DialectProfile,
) -> RewrittenStatement {
    let mut sql = String::new();
    let mut fragment = String::new();
    let mut fragments = Vec::new();
    let mut args = Vec::with_capacity(resolved.len());
    let mut markers = resolved.drain(..);

    for piece in pieces {
        match piece {
            Piece::Text(text) => {
                sql.push_str(text);
                fragment.push_str(text);
            }
            Piece::Escaped(c) => {
                sql.push(*c);
                fragment.push(*c);
            }
            Piece::Positional | Piece::Named(_) => {
                // counts were checked by the caller
                let Some(arg) = markers.next() else { break };
                if let Some(spliced) = arg.rewrite_sql(profile) {
                    sql.push_str(&spliced);
                    fragment.push_str(&spliced);
                } else {
                    args.push(arg);
                    sql.push_str(&profile.placeholder.placeholder(args.len()));
                    fragments.push(std::mem::take(&mut fragment));
                }
            }
        }
    }
    fragments.push(fragment);

    RewrittenStatement {
        sql,
        args,
        fragments,
        tail_len: 0,
    }
}
