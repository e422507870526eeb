//! SQL lexing for the safety gate
//!
//! Produces the handful of facts the gate needs: unquoted words, dotted
//! identifier chains, statement separators and whether the text ends in a
//! line comment. String literals, quoted identifiers and comments never
//! contribute words. When the tokenizer gives up (unterminated literal and
//! the like) a regex scan over the raw text is used instead; it sees words
//! inside literals too, so it can only reject more.

use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Location, Token, TokenWithLocation, Tokenizer, Whitespace};
use tracing::warn;

lazy_static! {
    static ref CHAIN_RE: Option<Regex> = Regex::new(
        r"[A-Za-z_][A-Za-z0-9_$]*(?:\s*\.\s*(?:[A-Za-z_][A-Za-z0-9_$]*|\*))*"
    )
    .ok();
}

/// A dotted reference such as `m.title`, `private.movielens_view` or `t.*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentChain {
    /// Parts as written, without quotes.
    pub parts: Vec<String>,
    /// Directly preceded by a clause-level FROM or JOIN.
    pub after_relation_keyword: bool,
}

impl IdentChain {
    pub fn lowered(&self) -> Vec<String> {
        self.parts.iter().map(|p| p.to_lowercase()).collect()
    }

    pub fn is_qualified(&self) -> bool {
        self.parts.len() >= 2
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexedSql {
    /// Lower-cased unquoted words in order.
    pub words: Vec<String>,
    pub chains: Vec<IdentChain>,
    /// `;` tokens followed by another significant token.
    pub statement_separators: usize,
    /// Byte offset of a final `;` followed only by whitespace or comments.
    pub dangling_terminator: Option<usize>,
    pub ends_with_line_comment: bool,
    /// Lower-cased first significant token, if it is an unquoted word.
    pub first_word: Option<String>,
}

impl LexedSql {
    pub fn has_word(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }
}

pub fn lex(sql: &str) -> LexedSql {
    let dialect = GenericDialect {};
    match Tokenizer::new(&dialect, sql).tokenize_with_location() {
        Ok(tokens) => from_tokens(sql, &tokens),
        Err(e) => {
            warn!("SQL tokenizer failed ({}), falling back to word scan", e);
            scan_words(sql)
        }
    }
}

fn unquoted_word(token: Option<&&Token>) -> Option<String> {
    match token {
        Some(Token::Word(w)) if w.quote_style.is_none() => Some(w.value.to_lowercase()),
        _ => None,
    }
}

/// Whether the token at `i` names a relation: it follows a clause-level
/// FROM or JOIN. `FROM` in `IS DISTINCT FROM` is an operator.
fn in_relation_position(significant: &[&Token], i: usize, query_frame: bool) -> bool {
    if !query_frame || i == 0 {
        return false;
    }
    match unquoted_word(significant.get(i - 1)).as_deref() {
        Some("join") => true,
        Some("from") => {
            i < 2 || unquoted_word(significant.get(i - 2)).as_deref() != Some("distinct")
        }
        _ => false,
    }
}

fn opens_query(keyword: Option<String>) -> bool {
    matches!(keyword.as_deref(), Some("select") | Some("with"))
}

/// Byte offset of a 1-based line/column position as the tokenizer counts it.
fn byte_offset(sql: &str, location: &Location) -> Option<usize> {
    let (mut line, mut column) = (1, 1);
    for (offset, ch) in sql.char_indices() {
        if line == location.line && column == location.column {
            return Some(offset);
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    None
}

fn from_tokens(sql: &str, located: &[TokenWithLocation]) -> LexedSql {
    let mut lexed = LexedSql::default();
    let tokens: Vec<&Token> = located.iter().map(|t| &t.token).collect();

    lexed.ends_with_line_comment = tokens
        .iter()
        .rev()
        .find(|t| {
            !matches!(
                t,
                Token::EOF
                    | Token::Whitespace(Whitespace::Space)
                    | Token::Whitespace(Whitespace::Newline)
                    | Token::Whitespace(Whitespace::Tab)
            )
        })
        .map_or(false, |t| {
            matches!(t, Token::Whitespace(Whitespace::SingleLineComment { .. }))
        });

    let significant_located: Vec<&TokenWithLocation> = located
        .iter()
        .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
        .collect();
    let significant: Vec<&Token> = significant_located.iter().map(|t| &t.token).collect();

    lexed.first_word = unquoted_word(significant.first());

    // One entry per open parenthesis: true when it encloses a query.
    let mut frames = vec![true];
    let mut i = 0;
    while i < significant.len() {
        match significant[i] {
            Token::SemiColon => {
                if i + 1 < significant.len() {
                    lexed.statement_separators += 1;
                } else {
                    lexed.dangling_terminator = byte_offset(sql, &significant_located[i].location);
                }
                i += 1;
            }
            Token::LParen => {
                frames.push(opens_query(unquoted_word(significant.get(i + 1))));
                i += 1;
            }
            Token::RParen => {
                if frames.len() > 1 {
                    frames.pop();
                }
                i += 1;
            }
            Token::Word(first) => {
                let query_frame = frames.last().copied().unwrap_or(true);
                let after_relation_keyword = in_relation_position(&significant, i, query_frame);
                let mut parts = vec![first.value.clone()];
                if first.quote_style.is_none() {
                    lexed.words.push(first.value.to_lowercase());
                }
                i += 1;
                while i + 1 < significant.len() && matches!(significant[i], Token::Period) {
                    match significant[i + 1] {
                        Token::Word(next) => {
                            if next.quote_style.is_none() {
                                lexed.words.push(next.value.to_lowercase());
                            }
                            parts.push(next.value.clone());
                        }
                        Token::Mul => parts.push("*".to_string()),
                        _ => break,
                    }
                    i += 2;
                }
                lexed.chains.push(IdentChain {
                    parts,
                    after_relation_keyword,
                });
            }
            _ => i += 1,
        }
    }

    lexed
}

fn scan_words(sql: &str) -> LexedSql {
    let mut lexed = LexedSql {
        statement_separators: sql.matches(';').count(),
        ends_with_line_comment: sql.lines().last().map_or(false, |line| line.contains("--")),
        ..LexedSql::default()
    };

    let trimmed = sql.trim_start();
    let offset = sql.len() - trimmed.len();
    let Some(chain_re) = CHAIN_RE.as_ref() else {
        return lexed;
    };

    let mut frames = vec![true];
    let mut cursor = 0;
    // Last two single-word matches, most recent first.
    let mut previous: [Option<String>; 2] = [None, None];

    for m in chain_re.find_iter(sql) {
        for (idx, ch) in sql[cursor..m.start()].char_indices() {
            match ch {
                '(' => {
                    let rest = sql[cursor + idx + 1..].trim_start().to_lowercase();
                    frames.push(rest.starts_with("select") || rest.starts_with("with"));
                }
                ')' if frames.len() > 1 => {
                    frames.pop();
                }
                _ => {}
            }
        }
        cursor = m.end();

        let parts: Vec<String> = m
            .as_str()
            .split('.')
            .map(|p| p.trim().to_string())
            .collect();
        if m.start() == offset {
            lexed.first_word = parts.first().map(|p| p.to_lowercase());
        }
        lexed
            .words
            .extend(parts.iter().filter(|p| *p != "*").map(|p| p.to_lowercase()));

        let query_frame = frames.last().copied().unwrap_or(true);
        let after_relation_keyword = query_frame
            && match previous[0].as_deref() {
                Some("join") => true,
                Some("from") => previous[1].as_deref() != Some("distinct"),
                _ => false,
            };
        let single = (parts.len() == 1).then(|| parts[0].to_lowercase());
        previous = [single, previous[0].take()];

        lexed.chains.push(IdentChain {
            parts,
            after_relation_keyword,
        });
    }

    lexed
}
