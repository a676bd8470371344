//! Line tokenizer for N-Triples style terms.
//!
//! Used by the patch codec, by labels-graph pattern literals, and when
//! converting terms produced by the RDF parsers into the core model.

use crate::error::{CoreError, Result};
use crate::types::{GraphName, Quad, Term, Triple};

/// A token on one line of N-Triples / RDF Patch text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// An IRI, blank node or literal.
    Term(Term),
    /// A bare word such as `TX`, `A` or `id`.
    Word(String),
    /// The statement terminator.
    Dot,
}

/// Split one line into tokens. A `#` outside a term starts a comment.
pub fn tokenize(line: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '#' => break,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '<' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != '>' {
                    if chars[end].is_whitespace() {
                        return Err(syntax_error("whitespace inside IRI", line));
                    }
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(syntax_error("unterminated IRI", line));
                }
                tokens.push(Token::Term(Term::Iri(chars[start..end].iter().collect())));
                i = end + 1;
            }
            '"' => {
                let (term, next) = read_literal(&chars, i, line)?;
                tokens.push(Token::Term(term));
                i = next;
            }
            '_' if chars.get(i + 1) == Some(&':') => {
                let start = i + 2;
                let mut end = start;
                while end < chars.len() && is_name_char(chars[end]) {
                    end += 1;
                }
                // A trailing '.' belongs to the statement, not the label.
                while end > start && chars[end - 1] == '.' {
                    end -= 1;
                }
                if end == start {
                    return Err(syntax_error("empty blank node label", line));
                }
                tokens.push(Token::Term(Term::BlankNode(
                    chars[start..end].iter().collect(),
                )));
                i = end;
            }
            _ => {
                let start = i;
                let mut end = start;
                while end < chars.len() && !chars[end].is_whitespace() {
                    end += 1;
                }
                while end > start + 1 && chars[end - 1] == '.' {
                    end -= 1;
                }
                tokens.push(Token::Word(chars[start..end].iter().collect()));
                i = end;
            }
        }
    }

    Ok(tokens)
}

fn read_literal(chars: &[char], open: usize, line: &str) -> Result<(Term, usize)> {
    let mut value = String::new();
    let mut i = open + 1;
    loop {
        match chars.get(i) {
            None => return Err(syntax_error("unterminated literal", line)),
            Some('"') => {
                i += 1;
                break;
            }
            Some('\\') => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| syntax_error("dangling escape", line))?;
                match escaped {
                    't' => value.push('\t'),
                    'b' => value.push('\u{8}'),
                    'n' => value.push('\n'),
                    'r' => value.push('\r'),
                    'f' => value.push('\u{c}'),
                    '"' => value.push('"'),
                    '\'' => value.push('\''),
                    '\\' => value.push('\\'),
                    'u' | 'U' => {
                        let width = if *escaped == 'u' { 4 } else { 8 };
                        let hex: String = chars.iter().skip(i + 2).take(width).collect();
                        if hex.len() != width {
                            return Err(syntax_error("short unicode escape", line));
                        }
                        let code = u32::from_str_radix(&hex, 16)
                            .map_err(|_| syntax_error("bad unicode escape", line))?;
                        let ch = char::from_u32(code)
                            .ok_or_else(|| syntax_error("invalid code point", line))?;
                        value.push(ch);
                        i += width;
                    }
                    _ => return Err(syntax_error("unknown escape", line)),
                }
                i += 2;
            }
            Some(c) => {
                value.push(*c);
                i += 1;
            }
        }
    }

    if chars.get(i) == Some(&'@') {
        let start = i + 1;
        let mut end = start;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '-') {
            end += 1;
        }
        if end == start {
            return Err(syntax_error("empty language tag", line));
        }
        let lang: String = chars[start..end].iter().collect();
        return Ok((Term::lang_literal(value, lang), end));
    }

    if chars.get(i) == Some(&'^') && chars.get(i + 1) == Some(&'^') {
        if chars.get(i + 2) != Some(&'<') {
            return Err(syntax_error("datatype must be an IRI", line));
        }
        let start = i + 3;
        let mut end = start;
        while end < chars.len() && chars[end] != '>' {
            end += 1;
        }
        if end >= chars.len() {
            return Err(syntax_error("unterminated datatype IRI", line));
        }
        let datatype: String = chars[start..end].iter().collect();
        return Ok((Term::typed_literal(value, datatype), end + 1));
    }

    Ok((Term::literal(value), i))
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn syntax_error(message: &str, line: &str) -> CoreError {
    CoreError::Syntax(format!("{message}: {line}"))
}

/// Escape a literal lexical form for N-Triples output.
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Take a run of term tokens and build a triple, checking term positions.
pub fn triple_from_terms(terms: &[Term]) -> Result<Triple> {
    match terms {
        [s, p, o] => {
            if s.is_literal() {
                return Err(CoreError::Syntax(format!("literal in subject position: {s}")));
            }
            if !p.is_iri() {
                return Err(CoreError::Syntax(format!("predicate must be an IRI: {p}")));
            }
            Ok(Triple::new(s.clone(), p.clone(), o.clone()))
        }
        _ => Err(CoreError::Syntax(format!(
            "expected 3 terms, found {}",
            terms.len()
        ))),
    }
}

/// Take three or four terms and build a quad; the optional fourth term is the graph.
pub fn quad_from_terms(terms: &[Term]) -> Result<Quad> {
    match terms {
        [s, p, o] => Ok(triple_from_terms(&[s.clone(), p.clone(), o.clone()])?.in_default_graph()),
        [s, p, o, g] => {
            if g.is_literal() {
                return Err(CoreError::Syntax(format!("literal graph name: {g}")));
            }
            let triple = triple_from_terms(&[s.clone(), p.clone(), o.clone()])?;
            Ok(triple.in_graph(GraphName::Named(g.clone())))
        }
        _ => Err(CoreError::Syntax(format!(
            "expected 3 or 4 terms, found {}",
            terms.len()
        ))),
    }
}

/// Collect the leading term tokens, stopping at the first non-term.
pub fn leading_terms(tokens: &[Token]) -> (Vec<Term>, &[Token]) {
    let mut terms = Vec::new();
    let mut rest = tokens;
    while let Some((Token::Term(t), tail)) = rest.split_first() {
        terms.push(t.clone());
        rest = tail;
    }
    (terms, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_patch_add_line() {
        let tokens = tokenize(r#"A <http://ex/s> <http://ex/p> "v"@en ."#).unwrap();
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[0], Token::Word("A".into()));
        assert_eq!(tokens[3], Token::Term(Term::lang_literal("v", "en")));
        assert_eq!(tokens[4], Token::Dot);
    }

    #[test]
    fn blank_node_keeps_statement_dot() {
        let tokens = tokenize("_:b0 <http://ex/p> _:b1.").unwrap();
        assert_eq!(tokens[2], Token::Term(Term::blank("b1")));
        assert_eq!(tokens[3], Token::Dot);
    }

    #[test]
    fn literal_escapes_are_decoded() {
        let tokens = tokenize(r#""line\nbreak \"q\" é""#).unwrap();
        assert_eq!(tokens, vec![Token::Term(Term::literal("line\nbreak \"q\" é"))]);
    }

    #[test]
    fn typed_literal_and_comment() {
        let tokens =
            tokenize(r#""1"^^<http://www.w3.org/2001/XMLSchema#integer> . # trailing"#).unwrap();
        assert_eq!(tokens.len(), 2);
        assert!(matches!(&tokens[0], Token::Term(Term::Literal { datatype: Some(_), .. })));
    }

    #[test]
    fn unterminated_iri_is_an_error() {
        assert!(tokenize("<http://ex/s").is_err());
    }

    #[test]
    fn literal_subject_rejected() {
        let terms = vec![Term::literal("x"), Term::iri("http://ex/p"), Term::literal("y")];
        assert!(triple_from_terms(&terms).is_err());
    }

    #[test]
    fn escape_then_tokenize_preserves_value() {
        let original = "tab\there \"quoted\" back\\slash";
        let line = format!("\"{}\"", escape_literal(original));
        let tokens = tokenize(&line).unwrap();
        assert_eq!(tokens, vec![Token::Term(Term::literal(original))]);
    }
}
