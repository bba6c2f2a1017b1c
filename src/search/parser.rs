//! Parser for the classic query syntax
//!
//! Supported: bare terms, `"phrases"`, `field:value` and `field:(group)`,
//! `+`/`-`/`NOT` modifiers, `AND`/`OR` (also `&&`/`||`), parentheses,
//! trailing `*` prefix terms and `^boost` suffixes. Terms without an operator
//! are optional (OR semantics).

use std::fmt;

pub type ParseResult<T> = std::result::Result<T, QueryParseError>;

/// Typed query syntax failure, positions are byte offsets in the input
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryParseError {
    #[error("Query is empty")]
    Empty,

    #[error("Unbalanced parenthesis at {position}")]
    UnbalancedParenthesis { position: usize },

    #[error("Unterminated phrase starting at {position}")]
    UnterminatedPhrase { position: usize },

    #[error("Operator `{operator}` at {position} has no operand")]
    DanglingOperator { operator: String, position: usize },

    #[error("Field `{field}` at {position} has no value")]
    MissingFieldValue { field: String, position: usize },

    #[error("Invalid boost `{value}` at {position}")]
    InvalidBoost { value: String, position: usize },

    #[error("Scoped query must look like `PROP field: expression`")]
    MissingScopedField,

    #[error("Unexpected `{token}` at {position}")]
    Unexpected { token: String, position: usize },
}

/// How a clause participates in its enclosing group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Should,
    Must,
    MustNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    Term { field: Option<String>, text: String },
    /// Term ending with `*`
    Prefix { field: Option<String>, text: String },
    Phrase { field: Option<String>, text: String },
    Group { clauses: Vec<Clause> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub occur: Occur,
    pub node: QueryNode,
    pub boost: Option<f32>,
}

/// Parsed query: top-level clauses
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub clauses: Vec<Clause>,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    LParen,
    RParen,
    Plus,
    Minus,
    Not,
    And,
    Or,
    Field(String),
    Word { text: String, prefix: bool },
    Phrase(String),
    Boost(f32),
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::LParen => f.write_str("("),
            Tok::RParen => f.write_str(")"),
            Tok::Plus => f.write_str("+"),
            Tok::Minus => f.write_str("-"),
            Tok::Not => f.write_str("NOT"),
            Tok::And => f.write_str("AND"),
            Tok::Or => f.write_str("OR"),
            Tok::Field(name) => write!(f, "{}:", name),
            Tok::Word { text, prefix } => write!(f, "{}{}", text, if *prefix { "*" } else { "" }),
            Tok::Phrase(text) => write!(f, "\"{}\"", text),
            Tok::Boost(boost) => write!(f, "^{}", boost),
        }
    }
}

fn is_word_boundary(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | '^')
}

fn lex(input: &str) -> ParseResult<Vec<(usize, Tok)>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push((pos, Tok::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((pos, Tok::RParen));
            }
            '+' | '-' | '!' => {
                chars.next();
                let tok = match c {
                    '+' => Tok::Plus,
                    '-' => Tok::Minus,
                    _ => Tok::Not,
                };
                tokens.push((pos, tok));
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                text.push(escaped);
                            }
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => text.push(other),
                    }
                }
                if !closed {
                    return Err(QueryParseError::UnterminatedPhrase { position: pos });
                }
                tokens.push((pos, Tok::Phrase(text)));
            }
            '^' => {
                chars.next();
                let mut raw = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        raw.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match raw.parse::<f32>() {
                    Ok(boost) if boost > 0.0 && boost.is_finite() => {
                        tokens.push((pos, Tok::Boost(boost)))
                    }
                    _ => return Err(QueryParseError::InvalidBoost { value: raw, position: pos }),
                }
            }
            _ => {
                let mut text = String::new();
                let mut start = pos;
                let mut trailing_star = false;
                let mut field_emitted = false;

                while let Some(&(p, c)) = chars.peek() {
                    if is_word_boundary(c) {
                        break;
                    }
                    chars.next();
                    trailing_star = false;
                    match c {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                text.push(escaped);
                            }
                        }
                        ':' if !field_emitted && !text.is_empty() => {
                            tokens.push((start, Tok::Field(std::mem::take(&mut text))));
                            field_emitted = true;
                            start = p + 1;
                        }
                        '*' => {
                            text.push('*');
                            trailing_star = true;
                        }
                        other => text.push(other),
                    }
                }

                if text.is_empty() {
                    continue;
                }

                let operator = if field_emitted {
                    None
                } else {
                    match text.as_str() {
                        "AND" | "&&" => Some(Tok::And),
                        "OR" | "||" => Some(Tok::Or),
                        "NOT" => Some(Tok::Not),
                        _ => None,
                    }
                };

                let tok = match operator {
                    Some(tok) => tok,
                    None if trailing_star => {
                        text.pop();
                        if text.is_empty() {
                            return Err(QueryParseError::Unexpected {
                                token: "*".to_string(),
                                position: start,
                            });
                        }
                        Tok::Word { text, prefix: true }
                    }
                    None => Tok::Word { text, prefix: false },
                };
                tokens.push((start, tok));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Tok)>,
    cursor: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Tok)> {
        self.tokens.get(self.cursor)
    }

    fn next(&mut self) -> Option<(usize, Tok)> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn parse_clauses(&mut self, open_paren: Option<usize>, scope: Option<&str>) -> ParseResult<Vec<Clause>> {
        let mut clauses: Vec<Clause> = Vec::new();

        loop {
            match self.peek() {
                None => {
                    if let Some(position) = open_paren {
                        return Err(QueryParseError::UnbalancedParenthesis { position });
                    }
                    break;
                }
                Some((position, Tok::RParen)) => {
                    if open_paren.is_none() {
                        return Err(QueryParseError::UnbalancedParenthesis { position: *position });
                    }
                    self.next();
                    break;
                }
                Some((position, tok @ (Tok::And | Tok::Or))) => {
                    let (position, conjunction) = (*position, tok.clone());
                    if clauses.is_empty() {
                        return Err(QueryParseError::DanglingOperator {
                            operator: conjunction.to_string(),
                            position,
                        });
                    }
                    self.next();

                    let mut clause = match self.peek() {
                        None | Some((_, Tok::RParen | Tok::And | Tok::Or)) => {
                            return Err(QueryParseError::DanglingOperator {
                                operator: conjunction.to_string(),
                                position,
                            })
                        }
                        Some(_) => self.parse_clause(scope)?,
                    };

                    if conjunction == Tok::And {
                        if let Some(previous) = clauses.last_mut() {
                            if previous.occur == Occur::Should {
                                previous.occur = Occur::Must;
                            }
                        }
                        if clause.occur == Occur::Should {
                            clause.occur = Occur::Must;
                        }
                    }
                    clauses.push(clause);
                }
                Some(_) => {
                    let clause = self.parse_clause(scope)?;
                    clauses.push(clause);
                }
            }
        }

        Ok(clauses)
    }

    fn parse_clause(&mut self, scope: Option<&str>) -> ParseResult<Clause> {
        let occur = match self.peek() {
            Some((position, tok @ (Tok::Plus | Tok::Minus | Tok::Not))) => {
                let (position, modifier) = (*position, tok.clone());
                self.next();
                if matches!(
                    self.peek(),
                    None | Some((_, Tok::RParen | Tok::And | Tok::Or | Tok::Plus | Tok::Minus | Tok::Not))
                ) {
                    return Err(QueryParseError::DanglingOperator {
                        operator: modifier.to_string(),
                        position,
                    });
                }
                if modifier == Tok::Plus {
                    Occur::Must
                } else {
                    Occur::MustNot
                }
            }
            _ => Occur::Should,
        };

        let mut field = scope.map(str::to_string);
        if let Some((position, Tok::Field(name))) = self.peek() {
            let (position, name) = (*position, name.clone());
            self.next();
            if !matches!(
                self.peek(),
                Some((_, Tok::Word { .. } | Tok::Phrase(_) | Tok::LParen))
            ) {
                return Err(QueryParseError::MissingFieldValue { field: name, position });
            }
            field = Some(name);
        }

        let node = match self.next() {
            Some((_, Tok::Word { text, prefix: false })) => QueryNode::Term { field, text },
            Some((_, Tok::Word { text, prefix: true })) => QueryNode::Prefix { field, text },
            Some((_, Tok::Phrase(text))) => QueryNode::Phrase { field, text },
            Some((position, Tok::LParen)) => {
                let clauses = self.parse_clauses(Some(position), field.as_deref())?;
                if clauses.is_empty() {
                    return Err(QueryParseError::Unexpected {
                        token: "()".to_string(),
                        position,
                    });
                }
                QueryNode::Group { clauses }
            }
            Some((position, tok)) => {
                return Err(QueryParseError::Unexpected {
                    token: tok.to_string(),
                    position,
                })
            }
            None => {
                return Err(QueryParseError::Unexpected {
                    token: "end of query".to_string(),
                    position: self.end,
                })
            }
        };

        let boost = match self.peek() {
            Some((_, Tok::Boost(boost))) => {
                let boost = *boost;
                self.next();
                Some(boost)
            }
            _ => None,
        };

        Ok(Clause { occur, node, boost })
    }
}

/// Parse a query; unscoped nodes carry `field: None`
pub fn parse_query(input: &str) -> ParseResult<ParsedQuery> {
    if input.trim().is_empty() {
        return Err(QueryParseError::Empty);
    }

    let tokens = lex(input)?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: input.len(),
    };
    let clauses = parser.parse_clauses(None, None)?;
    if let Some((position, tok)) = parser.peek() {
        return Err(QueryParseError::Unexpected {
            token: tok.to_string(),
            position: *position,
        });
    }
    if clauses.is_empty() {
        return Err(QueryParseError::Empty);
    }

    Ok(ParsedQuery { clauses })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(field: Option<&str>, text: &str) -> QueryNode {
        QueryNode::Term {
            field: field.map(str::to_string),
            text: text.to_string(),
        }
    }

    fn occurs(query: &ParsedQuery) -> Vec<Occur> {
        query.clauses.iter().map(|c| c.occur).collect()
    }

    #[test]
    fn test_bare_terms_are_optional() {
        let query = parse_query("hello world").unwrap();
        assert_eq!(occurs(&query), vec![Occur::Should, Occur::Should]);
        assert_eq!(query.clauses[0].node, term(None, "hello"));
    }

    #[test]
    fn test_modifiers_and_conjunctions() {
        let query = parse_query("+a -b NOT c").unwrap();
        assert_eq!(occurs(&query), vec![Occur::Must, Occur::MustNot, Occur::MustNot]);

        let query = parse_query("a AND b OR c").unwrap();
        assert_eq!(occurs(&query), vec![Occur::Must, Occur::Must, Occur::Should]);

        let query = parse_query("a && -b").unwrap();
        assert_eq!(occurs(&query), vec![Occur::Must, Occur::MustNot]);
    }

    #[test]
    fn test_fields_phrases_prefix_and_boost() {
        let query = parse_query(r#"title:"release notes"^2 name:Web*"#).unwrap();
        assert_eq!(
            query.clauses[0].node,
            QueryNode::Phrase {
                field: Some("title".into()),
                text: "release notes".into()
            }
        );
        assert_eq!(query.clauses[0].boost, Some(2.0));
        assert_eq!(
            query.clauses[1].node,
            QueryNode::Prefix {
                field: Some("name".into()),
                text: "Web".into()
            }
        );
    }

    #[test]
    fn test_group_inherits_field() {
        let query = parse_query("Blog.Post.category:(news OR events) -hidden:true").unwrap();
        match &query.clauses[0].node {
            QueryNode::Group { clauses } => {
                assert_eq!(clauses[0].node, term(Some("Blog.Post.category"), "news"));
                assert_eq!(clauses[1].node, term(Some("Blog.Post.category"), "events"));
            }
            other => panic!("expected group, got {:?}", other),
        }
        assert_eq!(query.clauses[1].node, term(Some("hidden"), "true"));
    }

    #[test]
    fn test_space_after_field_colon() {
        let query = parse_query("title: hello").unwrap();
        assert_eq!(query.clauses[0].node, term(Some("title"), "hello"));
    }

    #[test]
    fn test_escapes_and_inner_dashes() {
        let query = parse_query(r"foo-bar a\:b").unwrap();
        assert_eq!(query.clauses[0].node, term(None, "foo-bar"));
        assert_eq!(query.clauses[1].node, term(None, "a:b"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_query("   "), Err(QueryParseError::Empty));
        assert_eq!(
            parse_query("(a b"),
            Err(QueryParseError::UnbalancedParenthesis { position: 0 })
        );
        assert_eq!(
            parse_query("a b)"),
            Err(QueryParseError::UnbalancedParenthesis { position: 3 })
        );
        assert_eq!(
            parse_query("\"open"),
            Err(QueryParseError::UnterminatedPhrase { position: 0 })
        );
        assert!(matches!(
            parse_query("a AND"),
            Err(QueryParseError::DanglingOperator { .. })
        ));
        assert!(matches!(
            parse_query("OR a"),
            Err(QueryParseError::DanglingOperator { .. })
        ));
        assert!(matches!(
            parse_query("title:"),
            Err(QueryParseError::MissingFieldValue { .. })
        ));
        assert!(matches!(
            parse_query("a^x"),
            Err(QueryParseError::InvalidBoost { .. })
        ));
        assert!(matches!(parse_query("()"), Err(QueryParseError::Unexpected { .. })));
    }
}
