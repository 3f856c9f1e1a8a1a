//! SPARQL update bodies for incremental metadata changes.
//!
//! Only the ground-data forms are produced and understood:
//!
//! ```text
//! DELETE DATA { <s> <p> <o> . } ;
//! INSERT DATA { <s> <p> <o> . }
//! ```

use std::fmt;

use crate::error::GraphError;
use crate::graph::{Graph, Triple};

const DELETE_DATA: &str = "DELETE DATA";
const INSERT_DATA: &str = "INSERT DATA";

/// A set of triples to remove followed by a set of triples to add.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SparqlUpdate {
    pub deletes: Graph,
    pub inserts: Graph,
}

impl SparqlUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, triple: Triple) -> Self {
        self.inserts.insert(triple);
        self
    }

    pub fn delete(mut self, triple: Triple) -> Self {
        self.deletes.insert(triple);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty()
    }

    /// Apply to a graph: deletions first, then insertions.
    pub fn apply(&self, graph: &mut Graph) {
        for triple in &self.deletes {
            graph.remove(triple);
        }
        graph.merge(&self.inserts);
    }

    /// Parse a body produced by [`SparqlUpdate::to_string`].
    pub fn parse(body: &str) -> Result<Self, GraphError> {
        let mut update = SparqlUpdate::new();
        let mut rest = body.trim();
        while !rest.is_empty() {
            let (keyword, after) = if let Some(after) = rest.strip_prefix(DELETE_DATA) {
                (DELETE_DATA, after)
            } else if let Some(after) = rest.strip_prefix(INSERT_DATA) {
                (INSERT_DATA, after)
            } else {
                return Err(GraphError::UnsupportedUpdate(truncate(rest)));
            };
            let after = after.trim_start();
            let block = after
                .strip_prefix('{')
                .ok_or_else(|| GraphError::UnsupportedUpdate(truncate(after)))?;
            // Closing braces inside literals are tolerated when the block ends on its own line.
            let end = block
                .find("\n}")
                .map(|i| i + 1)
                .or_else(|| block.find('}'))
                .ok_or_else(|| GraphError::UnsupportedUpdate("unterminated data block".into()))?;
            let graph = Graph::parse_ntriples(&block[..end])?;
            if keyword == DELETE_DATA {
                update.deletes.merge(&graph);
            } else {
                update.inserts.merge(&graph);
            }
            rest = block[end + 1..].trim_start();
            rest = rest.strip_prefix(';').unwrap_or(rest).trim_start();
        }
        Ok(update)
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(40).collect()
}

impl fmt::Display for SparqlUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (keyword, graph) in [(DELETE_DATA, &self.deletes), (INSERT_DATA, &self.inserts)] {
            if graph.is_empty() {
                continue;
            }
            if !first {
                writeln!(f, " ;")?;
            }
            first = false;
            writeln!(f, "{keyword} {{")?;
            for triple in graph {
                writeln!(f, "  {triple}")?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab;

    const PARENT: &str = "http://repo/content/aa/bb/cc/dd/parent";
    const CHILD: &str = "http://repo/content/aa/bb/cc/dd/child";

    #[test]
    fn renders_insert_only() {
        let update = SparqlUpdate::new().insert(Triple::iris(PARENT, vocab::PCDM_HAS_MEMBER, CHILD));
        let body = update.to_string();
        assert!(body.starts_with("INSERT DATA {"));
        assert!(!body.contains("DELETE"));
    }

    #[test]
    fn parse_roundtrip() {
        let update = SparqlUpdate::new()
            .delete(Triple::iris(CHILD, vocab::RDF_TYPE, vocab::WORK))
            .insert(Triple::iris(CHILD, vocab::RDF_TYPE, vocab::TOMBSTONE))
            .insert(Triple::iris(PARENT, vocab::PCDM_HAS_MEMBER, CHILD));
        let parsed = SparqlUpdate::parse(&update.to_string()).unwrap();
        assert_eq!(parsed, update);
    }

    #[test]
    fn apply_deletes_before_inserting() {
        let mut graph = Graph::new();
        graph.insert(Triple::iris(CHILD, vocab::RDF_TYPE, vocab::WORK));
        let update = SparqlUpdate::new()
            .delete(Triple::iris(CHILD, vocab::RDF_TYPE, vocab::WORK))
            .insert(Triple::iris(CHILD, vocab::RDF_TYPE, vocab::TOMBSTONE));
        update.apply(&mut graph);
        assert_eq!(graph.types_of(CHILD), vec![vocab::TOMBSTONE.to_string()]);
    }

    #[test]
    fn rejects_other_statements() {
        assert!(SparqlUpdate::parse("DELETE WHERE { ?s ?p ?o }").is_err());
        assert!(SparqlUpdate::parse("INSERT DATA { <a> <b> <c> .").is_err());
    }
}
