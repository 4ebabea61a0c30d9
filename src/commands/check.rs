use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::CheckArgs;
use crate::engine::{TripleGraph, classify, resolve_target};
use crate::model::{CandidateResult, HTTP_OK, TRANSPORT_FAILURE_STATUS, Verdict};
use crate::sparql::SparqlParser;

#[derive(Debug, Serialize)]
struct CheckReport {
    verdict: Verdict,
    status: i32,
    origin_valid: bool,
    candidate_valid: bool,
    node_count: usize,
    targets: Vec<TargetLinks>,
    components: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct TargetLinks {
    target: String,
    resolved: String,
    neighbours: Vec<String>,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let parser = SparqlParser::new(&args.prefixes);
    let report = check_pair(&parser, &args.origin, &args.candidate, args.status);
    info!(
        label = report.verdict.label,
        status = report.status,
        bucket = report.verdict.bucket.as_str(),
        "classified candidate query"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &report)
            .context("failed to serialize check report")?;
        writeln!(output)?;
    } else {
        write_text(&mut output, &report)?;
    }
    output.flush()?;
    Ok(())
}

fn check_pair(parser: &SparqlParser, origin: &str, candidate: &str, status: i32) -> CheckReport {
    let origin = parser.parse(origin);
    let candidate = candidate_result(parser, candidate, status);
    let classification = classify(&origin, &candidate);

    let candidate_algebra = match &candidate {
        CandidateResult::Success { query, .. } => query.algebra(),
        _ => None,
    };
    let mut report = CheckReport {
        verdict: Verdict::from(&classification),
        status: candidate.http_status(),
        origin_valid: origin.is_syntax_valid(),
        candidate_valid: candidate_algebra.is_some(),
        node_count: 0,
        targets: Vec::new(),
        components: Vec::new(),
    };

    if let Some(algebra) = candidate_algebra {
        let graph = TripleGraph::build(&algebra.triples);
        report.node_count = graph.nodes().len();
        report.targets = algebra
            .targets
            .iter()
            .map(|target| {
                let resolved = resolve_target(target, &algebra.bind_relations);
                TargetLinks {
                    target: target.clone(),
                    resolved: resolved.to_string(),
                    neighbours: graph
                        .neighbours(resolved)
                        .into_iter()
                        .map(ToOwned::to_owned)
                        .collect(),
                }
            })
            .collect();
        report.components = graph
            .components()
            .into_iter()
            .map(|component| component.into_iter().map(ToOwned::to_owned).collect())
            .collect();
    }
    report
}

fn candidate_result(parser: &SparqlParser, text: &str, status: i32) -> CandidateResult {
    match status {
        TRANSPORT_FAILURE_STATUS => CandidateResult::TransportFailure,
        HTTP_OK => CandidateResult::Success {
            query: parser.parse(text),
            score: None,
            slots: None,
        },
        status => CandidateResult::HttpFailure {
            status,
            message: None,
        },
    }
}

fn write_text<W: Write>(output: &mut W, report: &CheckReport) -> Result<()> {
    writeln!(
        output,
        "{} ({})",
        report.verdict.label,
        report.verdict.bucket.as_str()
    )?;
    if !report.verdict.facts.is_empty() {
        writeln!(output, "  facts: {}", report.verdict.facts.join(", "))?;
    }
    if !report.origin_valid {
        writeln!(output, "  origin query does not parse")?;
    }
    if report.candidate_valid {
        for link in &report.targets {
            if link.neighbours.is_empty() {
                writeln!(output, "  target {} (as {}): not in graph", link.target, link.resolved)?;
            } else {
                writeln!(
                    output,
                    "  target {} (as {}): linked to {}",
                    link.target,
                    link.resolved,
                    link.neighbours.join(" ")
                )?;
            }
        }
        writeln!(
            output,
            "  components: {} over {} nodes",
            report.components.len(),
            report.node_count
        )?;
        for component in &report.components {
            writeln!(output, "    {}", component.join(" "))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Bucket, Label};

    const ORIGIN: &str = "SELECT ?a WHERE { <http://dbpedia.org/resource/Dune> <http://dbpedia.org/ontology/author> ?a }";

    #[test]
    fn connected_candidate_is_good() {
        let report = check_pair(
            &SparqlParser::default(),
            ORIGIN,
            "SELECT ?v1 WHERE { ?v2 ?v3 ?v1 }",
            200,
        );
        assert_eq!(report.verdict.label, Label::Good.name());
        assert_eq!(report.verdict.bucket, Bucket::Ok);
        assert_eq!(report.targets.len(), 1);
        assert_eq!(report.targets[0].resolved, "?v1");
        assert_eq!(report.targets[0].neighbours, vec!["?v2", "?v3"]);
        assert_eq!(report.node_count, 3);
        assert_eq!(report.components.len(), 1);
    }

    #[test]
    fn split_candidate_lists_each_component() {
        let report = check_pair(
            &SparqlParser::default(),
            ORIGIN,
            "SELECT ?v1 WHERE { ?v2 ?v3 ?v1 . ?v4 ?v5 ?v6 }",
            200,
        );
        assert_eq!(report.verdict.label, Label::DisconnectedTriple.name());
        assert_eq!(report.components.len(), 2);
        assert_eq!(report.components[1], vec!["?v4", "?v5", "?v6"]);
    }

    #[test]
    fn counted_target_resolves_through_aggregate() {
        let report = check_pair(
            &SparqlParser::default(),
            "SELECT (COUNT(?a) AS ?n) WHERE { ?a <http://dbpedia.org/ontology/author> ?b }",
            "SELECT (COUNT(?v1) AS ?c) WHERE { ?v1 ?v2 ?v3 }",
            200,
        );
        assert_eq!(report.verdict.label, Label::Good.name());
        assert_eq!(report.targets[0].target, "?c");
        assert_eq!(report.targets[0].resolved, "?v1");
    }

    #[test]
    fn status_drives_failure_labels() {
        let parser = SparqlParser::default();
        let transport = check_pair(&parser, ORIGIN, "", -1);
        let http = check_pair(&parser, ORIGIN, "", 502);
        let syntax = check_pair(&parser, ORIGIN, "SELECT ?x WHERE {", 200);

        assert_eq!(transport.verdict.label, Label::InternalError.name());
        assert_eq!(transport.status, -1);
        assert_eq!(http.status, 502);
        assert_eq!(http.verdict.label, Label::TgmFail.name());
        assert_eq!(syntax.verdict.label, Label::Syntax.name());
        assert!(!syntax.candidate_valid);
        assert!(syntax.components.is_empty());
    }

    #[test]
    fn text_output_names_label_and_facts() {
        let report = check_pair(
            &SparqlParser::default(),
            ORIGIN,
            "ASK WHERE { ?a ?b ?c }",
            200,
        );
        let mut buffer = Vec::new();
        write_text(&mut buffer, &report).expect("text should render");
        let text = String::from_utf8(buffer).expect("text should be utf-8");

        assert!(text.starts_with("question type (factoid) (critical)\n"));
        assert!(text.contains("facts: factoid question"));
    }
}
