//! RDF Patch text codec.
//!
//! ```text
//! H id <urn:uuid:...> .
//! TX .
//! PA "ex" <http://example/> .
//! A <http://example/s> <http://example/p> "o" .
//! D <http://example/s> <http://example/p> "o" <http://example/g> .
//! TC .
//! ```
//!
//! The optional graph term follows the object. Prefixed names are not
//! expanded; every term must be written in full.

use graphsync_core::syntax::{self, Token};
use graphsync_core::Term;

use crate::{validate, Patch, PatchError, PatchOp};

impl Patch {
    /// Parse patch text. Nothing is returned unless the whole patch is valid.
    pub fn parse(text: &str) -> Result<Self, PatchError> {
        let mut ops = Vec::new();
        let mut op_lines = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let tokens =
                syntax::tokenize(line).map_err(|e| PatchError::malformed(line_no, e.to_string()))?;
            if tokens.is_empty() {
                continue;
            }
            ops.push(parse_op(&tokens, line_no)?);
            op_lines.push(line_no);
        }

        // Report structural errors against source lines, not op indices.
        validate(&ops).map_err(|err| match err {
            PatchError::Malformed { line, message } if line > 0 => PatchError::Malformed {
                line: op_lines[line - 1],
                message,
            },
            other => other,
        })?;
        Ok(Self { ops })
    }

    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, PatchError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| PatchError::malformed(0, format!("patch is not UTF-8: {e}")))?;
        Self::parse(text)
    }

    /// Canonical text form, one operation per line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for op in &self.ops {
            out.push_str(&render_op(op));
            out.push('\n');
        }
        out
    }
}

fn parse_op(tokens: &[Token], line: usize) -> Result<PatchOp, PatchError> {
    let (code, args) = match tokens.split_first() {
        Some((Token::Word(code), rest)) => (code.as_str(), rest),
        _ => return Err(PatchError::malformed(line, "expected an operation code")),
    };
    let args = match args.split_last() {
        Some((Token::Dot, rest)) => rest,
        _ => args,
    };

    match code {
        "TX" | "TC" | "TA" => {
            if !args.is_empty() {
                return Err(PatchError::malformed(line, format!("{code} takes no arguments")));
            }
            Ok(match code {
                "TX" => PatchOp::TxnBegin,
                "TC" => PatchOp::TxnCommit,
                _ => PatchOp::TxnAbort,
            })
        }
        "H" => match args {
            [Token::Word(key), Token::Term(value)] => Ok(PatchOp::Header {
                key: key.clone(),
                value: value.clone(),
            }),
            _ => Err(PatchError::malformed(line, "header needs a key and a term")),
        },
        "PA" | "PD" => {
            let (prefix, uri) = match args {
                [prefix, Token::Term(Term::Iri(uri))] => (prefix_name(prefix, line)?, uri.clone()),
                _ => return Err(PatchError::malformed(line, "prefix needs a name and an IRI")),
            };
            Ok(if code == "PA" {
                PatchOp::AddPrefix { prefix, uri }
            } else {
                PatchOp::DeletePrefix { prefix, uri }
            })
        }
        "A" | "D" => {
            let (terms, rest) = syntax::leading_terms(args);
            if let Some(Token::Word(word)) = rest.first() {
                return Err(PatchError::malformed(
                    line,
                    format!("prefixed names are not supported: {word}"),
                ));
            }
            if !rest.is_empty() {
                return Err(PatchError::malformed(line, "unexpected token after terms"));
            }
            let quad = syntax::quad_from_terms(&terms)
                .map_err(|e| PatchError::malformed(line, e.to_string()))?;
            Ok(if code == "A" {
                PatchOp::Add(quad)
            } else {
                PatchOp::Delete(quad)
            })
        }
        other => Err(PatchError::malformed(line, format!("unknown operation: {other}"))),
    }
}

fn prefix_name(token: &Token, line: usize) -> Result<String, PatchError> {
    match token {
        Token::Term(Term::Literal { value, .. }) => Ok(value.clone()),
        Token::Word(word) => Ok(word.trim_end_matches(':').to_string()),
        _ => Err(PatchError::malformed(line, "bad prefix name")),
    }
}

fn render_op(op: &PatchOp) -> String {
    match op {
        PatchOp::Header { key, value } => format!("H {key} {value} ."),
        PatchOp::TxnBegin => "TX .".to_string(),
        PatchOp::TxnCommit => "TC .".to_string(),
        PatchOp::TxnAbort => "TA .".to_string(),
        PatchOp::AddPrefix { prefix, uri } => {
            format!("PA \"{}\" <{uri}> .", syntax::escape_literal(prefix))
        }
        PatchOp::DeletePrefix { prefix, uri } => {
            format!("PD \"{}\" <{uri}> .", syntax::escape_literal(prefix))
        }
        PatchOp::Add(quad) => format!("A {quad} ."),
        PatchOp::Delete(quad) => format!("D {quad} ."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphsync_core::GraphName;

    const SAMPLE: &str = r#"
# a comment
H id <urn:uuid:0b9a3c1e-0000-4000-8000-000000000001> .
TX .
PA "ex" <http://example/> .
A <http://example/s> <http://example/p> "hello"@en .
A _:b0 <http://example/p> <http://example/o> <http://example/g> .
D <http://example/s> <http://example/p> "1"^^<http://www.w3.org/2001/XMLSchema#integer> .
TC .
"#;

    #[test]
    fn parses_sample() {
        let patch = Patch::parse(SAMPLE).unwrap();
        assert_eq!(patch.ops().len(), 7);
        assert!(patch.id().is_some());
        match &patch.ops()[4] {
            PatchOp::Add(quad) => {
                assert_eq!(quad.graph, GraphName::named("http://example/g"));
                assert_eq!(quad.subject, Term::blank("b0"));
            }
            other => panic!("unexpected op {other:?}"),
        }
        let summary = patch.summary();
        assert_eq!((summary.adds, summary.deletes, summary.prefix_ops), (2, 1, 1));
    }

    #[test]
    fn text_form_parses_back() {
        let patch = Patch::parse(SAMPLE).unwrap();
        let again = Patch::parse(&patch.to_text()).unwrap();
        assert_eq!(patch, again);
        assert_eq!(patch.digest(), again.digest());
    }

    #[test]
    fn structural_error_reports_source_line() {
        let err = Patch::parse("TX .\n\nTX .\n").unwrap_err();
        assert!(matches!(err, PatchError::Malformed { line: 3, .. }));
    }

    #[test]
    fn prefixed_names_rejected() {
        let err = Patch::parse("A ex:s <http://example/p> <http://example/o> .").unwrap_err();
        match err {
            PatchError::Malformed { line, message } => {
                assert_eq!(line, 1);
                assert!(message.contains("prefixed"));
            }
        }
    }

    #[test]
    fn bad_lines_rejected() {
        assert!(Patch::parse("X <http://e/s> .").is_err());
        assert!(Patch::parse("A <http://e/s> <http://e/p> .").is_err());
        assert!(Patch::parse("A \"lit\" <http://e/p> <http://e/o> .").is_err());
        assert!(Patch::parse("TX <http://e/s> .").is_err());
        assert!(Patch::parse_bytes(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn terminating_dot_optional_on_markers() {
        let patch = Patch::parse("TX\nTC\n").unwrap();
        assert_eq!(patch.ops(), &[PatchOp::TxnBegin, PatchOp::TxnCommit]);
    }
}
