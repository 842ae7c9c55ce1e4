//! Placeholder handling for scenario SQL.
//!
//! Scenario text always uses `?` placeholders. Postgres wants `$1, $2, ...`
//! instead, and the batched-insert rewrite needs to repeat a `VALUES` tuple.
//! All scanning skips string literals (`'...'`), quoted identifiers
//! (`"..."` and `` `...` ``) and `--` line comments.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

#[derive(Copy, Clone)]
enum Piece {
    /// A character outside quotes and comments, with its byte offset.
    Code(usize, char),
    /// A character of a literal, quoted identifier or comment, including the
    /// delimiters.
    Quoted(char),
    Placeholder,
}

/// Walk `sql`, reporting every `?` outside quotes and comments as a
/// placeholder and everything else verbatim.
fn scan(sql: &str, mut emit: impl FnMut(Piece)) {
    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;
    let mut in_comment = false;
    while let Some((offset, c)) = chars.next() {
        if in_comment {
            emit(Piece::Quoted(c));
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }
        match quote {
            Some(q) => {
                emit(Piece::Quoted(c));
                if c == q {
                    // doubled quote is an escaped quote
                    if chars.peek().map(|&(_, next)| next) == Some(q) {
                        chars.next();
                        emit(Piece::Quoted(q));
                    } else {
                        quote = None;
                    }
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    emit(Piece::Quoted(c));
                }
                '-' if chars.peek().map(|&(_, next)| next) == Some('-') => {
                    in_comment = true;
                    emit(Piece::Quoted(c));
                }
                '?' => emit(Piece::Placeholder),
                _ => emit(Piece::Code(offset, c)),
            },
        }
    }
}

/// Number of `?` placeholders outside quotes and comments.
#[must_use]
pub fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    scan(sql, |piece| {
        if matches!(piece, Piece::Placeholder) {
            count += 1;
        }
    });
    count
}

/// Rewrite `?` placeholders as `$1, $2, ...` in order of appearance.
#[must_use]
pub fn number_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut next = 0usize;
    scan(sql, |piece| match piece {
        Piece::Code(_, c) | Piece::Quoted(c) => out.push(c),
        Piece::Placeholder => {
            next += 1;
            let _ = write!(out, "${next}");
        }
    });
    out
}

const fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Byte range of the parenthesized tuple following the first standalone
/// `VALUES` keyword.
fn values_tuple(sql: &str) -> Option<(usize, usize)> {
    let mut pieces = Vec::new();
    scan(sql, |piece| pieces.push(piece));
    let mut pieces = pieces.into_iter();

    let mut word = String::new();
    let open = loop {
        let mut piece = pieces.next()?;
        if let Piece::Code(_, c) = piece {
            if is_word_char(c) {
                word.push(c);
                continue;
            }
        }
        let keyword = word.eq_ignore_ascii_case("values");
        word.clear();
        if !keyword {
            continue;
        }
        while let Piece::Code(_, c) = piece {
            if !c.is_whitespace() {
                break;
            }
            piece = pieces.next()?;
        }
        match piece {
            Piece::Code(offset, '(') => break offset,
            _ => return None,
        }
    };

    let mut depth = 1usize;
    for piece in pieces {
        match piece {
            Piece::Code(_, '(') => depth += 1,
            Piece::Code(offset, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some((open, offset + 1));
                }
            }
            _ => {}
        }
    }
    None
}

/// Collapse `rows` executions of a single-tuple `INSERT ... VALUES (...)` into
/// one multi-row insert.
///
/// Returns `None` when the statement is not an insert, has more than one
/// tuple already, or `rows` is zero.
#[must_use]
pub fn rewrite_batched_insert(sql: &str, rows: usize) -> Option<String> {
    if rows == 0 || !sql.trim_start().to_ascii_lowercase().starts_with("insert") {
        return None;
    }
    let (start, end) = values_tuple(sql)?;
    let rest = &sql[end..];
    if rest.trim_start().starts_with(',') {
        return None;
    }
    let tuple = &sql[start..end];

    let mut rewritten = String::with_capacity(sql.len() + (tuple.len() + 2) * rows);
    rewritten.push_str(&sql[..start]);
    for row in 0..rows {
        if row > 0 {
            rewritten.push_str(", ");
        }
        rewritten.push_str(tuple);
    }
    rewritten.push_str(rest);
    Some(rewritten)
}
