use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use spargebra::Query;
use spargebra::algebra::{AggregateExpression, Expression, GraphPattern};
use tracing::debug;

use crate::model::{ParsedQuery, QueryAlgebra, QueryKind, Triple};

pub const DEFAULT_PREFIXES: &[(&str, &str)] = &[
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ("dc", "http://purl.org/dc/elements/1.1/"),
    ("foaf", "http://xmlns.com/foaf/0.1/"),
    ("obo", "http://purl.obolibrary.org/obo/"),
];

#[derive(Debug, Clone)]
pub struct SparqlParser {
    prologue: String,
}

impl Default for SparqlParser {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl SparqlParser {
    /// Parser whose default namespaces are `DEFAULT_PREFIXES` plus `extra`;
    /// declarations inside the query text take precedence.
    pub fn new(extra: &[(String, String)]) -> Self {
        let mut prefixes: BTreeMap<String, String> = DEFAULT_PREFIXES
            .iter()
            .map(|(name, iri)| (name.to_string(), iri.to_string()))
            .collect();
        prefixes.extend(extra.iter().cloned());

        let prologue = prefixes
            .iter()
            .map(|(name, iri)| format!("PREFIX {name}: <{iri}>\n"))
            .collect();
        Self { prologue }
    }

    /// SHA-256 of the prefix prologue. Parsed queries are only reusable
    /// under the same fingerprint.
    pub fn fingerprint(&self) -> String {
        format!("{:x}", Sha256::digest(self.prologue.as_bytes()))
    }

    pub fn parse(&self, text: &str) -> ParsedQuery {
        if text.trim().is_empty() {
            return ParsedQuery::SyntaxError {
                message: "empty query".to_string(),
            };
        }

        let full_text = format!("{}{}", self.prologue, text);
        match Query::parse(&full_text, None) {
            Ok(query) => ParsedQuery::Valid(algebra_of(&query)),
            Err(err) => {
                debug!(error = %err, "query failed to parse");
                ParsedQuery::SyntaxError {
                    message: err.to_string(),
                }
            }
        }
    }
}

fn algebra_of(query: &Query) -> QueryAlgebra {
    let (kind, pattern) = match query {
        Query::Select { pattern, .. } => (QueryKind::Select, pattern),
        Query::Construct { pattern, .. } => (QueryKind::Construct, pattern),
        Query::Describe { pattern, .. } => (QueryKind::Describe, pattern),
        Query::Ask { pattern, .. } => (QueryKind::Ask, pattern),
    };

    let mut walker = AlgebraWalker::default();
    walker.walk(pattern);

    let (offset, length) = match walker.slice {
        Some((start, length)) => (Some(start), length),
        None => (None, None),
    };

    QueryAlgebra {
        kind,
        targets: walker.targets.unwrap_or_default(),
        bind_relations: resolve_bind_relations(&walker.extends, &walker.aggregates),
        triples: walker.triples,
        length,
        offset,
    }
}

#[derive(Debug, Default)]
struct AlgebraWalker {
    targets: Option<Vec<String>>,
    triples: Vec<Triple>,
    extends: BTreeMap<String, String>,
    aggregates: BTreeMap<String, String>,
    slice: Option<(usize, Option<usize>)>,
}

impl AlgebraWalker {
    fn walk(&mut self, pattern: &GraphPattern) {
        match pattern {
            GraphPattern::Bgp { patterns } => {
                self.triples.extend(patterns.iter().map(|pattern| {
                    Triple::new(
                        pattern.subject.to_string(),
                        pattern.predicate.to_string(),
                        pattern.object.to_string(),
                    )
                }));
            }
            GraphPattern::Path {
                subject,
                path,
                object,
            } => {
                self.triples.push(Triple::new(
                    subject.to_string(),
                    path.to_string(),
                    object.to_string(),
                ));
            }
            GraphPattern::Join { left, right }
            | GraphPattern::LeftJoin { left, right, .. }
            | GraphPattern::Union { left, right }
            | GraphPattern::Minus { left, right } => {
                self.walk(left);
                self.walk(right);
            }
            GraphPattern::Filter { inner, .. }
            | GraphPattern::Graph { inner, .. }
            | GraphPattern::OrderBy { inner, .. }
            | GraphPattern::Distinct { inner }
            | GraphPattern::Reduced { inner }
            | GraphPattern::Service { inner, .. } => self.walk(inner),
            GraphPattern::Extend {
                inner,
                variable,
                expression,
            } => {
                if let Expression::Variable(source) = expression {
                    self.extends
                        .insert(variable.to_string(), source.to_string());
                }
                self.walk(inner);
            }
            GraphPattern::Project { inner, variables } => {
                if self.targets.is_none() {
                    self.targets = Some(variables.iter().map(ToString::to_string).collect());
                }
                self.walk(inner);
            }
            GraphPattern::Slice {
                inner,
                start,
                length,
            } => {
                if self.slice.is_none() {
                    self.slice = Some((*start, *length));
                }
                self.walk(inner);
            }
            GraphPattern::Group {
                inner, aggregates, ..
            } => {
                for (variable, aggregate) in aggregates {
                    if let AggregateExpression::FunctionCall {
                        expr: Expression::Variable(source),
                        ..
                    } = aggregate
                    {
                        self.aggregates
                            .insert(variable.to_string(), source.to_string());
                    }
                }
                self.walk(inner);
            }
            _ => {}
        }
    }
}

fn resolve_bind_relations(
    extends: &BTreeMap<String, String>,
    aggregates: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut links = aggregates.clone();
    links.extend(extends.iter().map(|(bound, source)| (bound.clone(), source.clone())));

    extends
        .keys()
        .map(|bound| {
            let mut current = bound;
            for _ in 0..links.len() {
                match links.get(current) {
                    Some(next) if next != bound => current = next,
                    _ => break,
                }
            }
            (bound.clone(), current.clone())
        })
        .filter(|(bound, resolved)| bound != resolved)
        .collect()
}
