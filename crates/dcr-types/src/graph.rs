//! RDF graph value type and N-Triples codec.
//!
//! Graphs are immutable values once handed to the object cache; a refresh
//! replaces the whole graph rather than editing it in place.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::vocab;

/// Subject or object position of a triple.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal {
        value: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Iri(value.into())
    }

    /// Plain string literal.
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Self::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "<{iri}>"),
            Self::Blank(label) => write!(f, "_:{label}"),
            Self::Literal {
                value,
                datatype,
                language,
            } => {
                write!(f, "\"{}\"", escape(value))?;
                if let Some(lang) = language {
                    write!(f, "@{lang}")
                } else if let Some(dt) = datatype {
                    write!(f, "^^<{dt}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// A single RDF statement. Predicates are always IRIs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }

    /// Convenience for the common IRI-to-IRI statement.
    pub fn iris(subject: &str, predicate: &str, object: &str) -> Self {
        Self::new(Term::iri(subject), predicate, Term::iri(object))
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {} .", self.subject, self.predicate, self.object)
    }
}

/// Ordered set of triples with value equality.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    triples: BTreeSet<Triple>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Insert a triple. Returns `false` if it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        self.triples.insert(triple)
    }

    pub fn remove(&mut self, triple: &Triple) -> bool {
        self.triples.remove(triple)
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Add every triple of `other` to this graph.
    pub fn merge(&mut self, other: &Graph) {
        self.triples.extend(other.triples.iter().cloned());
    }

    /// Objects of all statements with the given subject and predicate.
    pub fn objects(&self, subject: &str, predicate: &str) -> Vec<&Term> {
        self.triples
            .iter()
            .filter(|t| t.subject.as_iri() == Some(subject) && t.predicate == predicate)
            .map(|t| &t.object)
            .collect()
    }

    /// IRI objects of the given subject and predicate.
    pub fn object_iris(&self, subject: &str, predicate: &str) -> Vec<String> {
        self.objects(subject, predicate)
            .into_iter()
            .filter_map(|o| o.as_iri().map(str::to_string))
            .collect()
    }

    /// First literal value of the given subject and predicate.
    pub fn literal(&self, subject: &str, predicate: &str) -> Option<&str> {
        self.objects(subject, predicate)
            .into_iter()
            .find_map(Term::as_literal)
    }

    /// IRI subjects of all statements `?s predicate <object>`.
    pub fn subjects(&self, predicate: &str, object: &str) -> Vec<String> {
        self.triples
            .iter()
            .filter(|t| t.predicate == predicate && t.object.as_iri() == Some(object))
            .filter_map(|t| t.subject.as_iri().map(str::to_string))
            .collect()
    }

    /// `rdf:type` values asserted for the subject.
    pub fn types_of(&self, subject: &str) -> Vec<String> {
        self.object_iris(subject, vocab::RDF_TYPE)
    }

    /// Distinct IRI subjects, in order.
    pub fn subject_iris(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.triples.iter().filter_map(|t| t.subject.as_iri()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Serialize as N-Triples, one statement per line.
    pub fn to_ntriples(&self) -> String {
        let mut out = String::new();
        for triple in &self.triples {
            out.push_str(&triple.to_string());
            out.push('\n');
        }
        out
    }

    /// Parse an N-Triples document.
    pub fn parse_ntriples(input: &str) -> Result<Self, GraphError> {
        let mut graph = Graph::new();
        for (idx, line) in input.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let triple = LineParser::new(line, idx + 1).triple()?;
            graph.insert(triple);
        }
        Ok(graph)
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        Self {
            triples: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Graph {
    type Item = &'a Triple;
    type IntoIter = std::collections::btree_set::Iter<'a, Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.iter()
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Cursor over a single N-Triples statement.
struct LineParser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> LineParser<'a> {
    fn new(input: &'a str, line: usize) -> Self {
        Self {
            chars: input.chars().peekable(),
            line,
        }
    }

    fn error(&self, reason: impl Into<String>) -> GraphError {
        GraphError::Syntax {
            line: self.line,
            reason: reason.into(),
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn triple(mut self) -> Result<Triple, GraphError> {
        self.skip_ws();
        let subject = match self.chars.peek() {
            Some('<') => Term::Iri(self.iri()?),
            Some('_') => self.blank()?,
            _ => return Err(self.error("expected subject IRI or blank node")),
        };
        self.skip_ws();
        let predicate = match self.chars.peek() {
            Some('<') => self.iri()?,
            _ => return Err(self.error("expected predicate IRI")),
        };
        self.skip_ws();
        let object = match self.chars.peek() {
            Some('<') => Term::Iri(self.iri()?),
            Some('_') => self.blank()?,
            Some('"') => self.literal()?,
            _ => return Err(self.error("expected object term")),
        };
        self.skip_ws();
        if self.chars.next() != Some('.') {
            return Err(self.error("expected '.' terminating statement"));
        }
        self.skip_ws();
        match self.chars.peek() {
            None | Some('#') => Ok(Triple {
                subject,
                predicate,
                object,
            }),
            Some(_) => Err(self.error("trailing content after '.'")),
        }
    }

    fn iri(&mut self) -> Result<String, GraphError> {
        self.chars.next(); // '<'
        let mut iri = String::new();
        loop {
            match self.chars.next() {
                Some('>') => return Ok(iri),
                Some(c) if c.is_whitespace() => return Err(self.error("whitespace inside IRI")),
                Some(c) => iri.push(c),
                None => return Err(self.error("unterminated IRI")),
            }
        }
    }

    fn blank(&mut self) -> Result<Term, GraphError> {
        self.chars.next(); // '_'
        if self.chars.next() != Some(':') {
            return Err(self.error("expected ':' after '_'"));
        }
        let mut label = String::new();
        while let Some(&c) = self.chars.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                break;
            }
            label.push(c);
            self.chars.next();
        }
        if label.is_empty() {
            return Err(self.error("empty blank node label"));
        }
        Ok(Term::Blank(label))
    }

    fn literal(&mut self) -> Result<Term, GraphError> {
        self.chars.next(); // '"'
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some('"') => break,
                Some('\\') => value.push(self.escape()?),
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated literal")),
            }
        }
        match self.chars.peek() {
            Some('@') => {
                self.chars.next();
                let mut lang = String::new();
                while let Some(&c) = self.chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '-' {
                        lang.push(c);
                        self.chars.next();
                    } else {
                        break;
                    }
                }
                if lang.is_empty() {
                    return Err(self.error("empty language tag"));
                }
                Ok(Term::Literal {
                    value,
                    datatype: None,
                    language: Some(lang),
                })
            }
            Some('^') => {
                self.chars.next();
                if self.chars.next() != Some('^') || self.chars.peek() != Some(&'<') {
                    return Err(self.error("expected '^^<datatype>'"));
                }
                let datatype = self.iri()?;
                Ok(Term::typed_literal(value, datatype))
            }
            _ => Ok(Term::literal(value)),
        }
    }

    fn escape(&mut self) -> Result<char, GraphError> {
        match self.chars.next() {
            Some('t') => Ok('\t'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('b') => Ok('\u{8}'),
            Some('f') => Ok('\u{c}'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('\\') => Ok('\\'),
            Some('u') => self.unicode(4),
            Some('U') => self.unicode(8),
            _ => Err(self.error("invalid escape sequence")),
        }
    }

    fn unicode(&mut self, digits: usize) -> Result<char, GraphError> {
        let hex: String = (0..digits).filter_map(|_| self.chars.next()).collect();
        if hex.len() != digits {
            return Err(self.error("truncated unicode escape"));
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error(format!("invalid unicode escape \\u{hex}")))
    }
}
