use serde::Serialize;

use super::graph::{TripleGraph, all_targets_present, every_component_touches_targets};
use super::tally::{Bucket, Fact, Label};
use crate::model::{CandidateResult, ParsedQuery, QueryAlgebra};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub label: Label,
    pub facts: Vec<Fact>,
}

impl Classification {
    pub fn bucket(&self) -> Bucket {
        self.label.bucket()
    }
}

/// Classifies a candidate against its origin query.
///
/// Candidate-side hard failures (transport, HTTP status, syntax) are reported
/// even when the origin itself failed to parse; every later check needs a
/// valid origin and stops at the first failing step.
pub fn classify(origin: &ParsedQuery, candidate: &CandidateResult) -> Classification {
    let mut facts = Vec::new();

    let origin = origin.algebra();
    if let Some(origin) = origin {
        facts.push(if origin.is_ask() {
            Fact::YesNoQuestion
        } else {
            Fact::FactoidQuestion
        });
        if origin.length.is_some() {
            facts.push(Fact::RangeSpecified);
        }
    }

    let candidate = match candidate {
        CandidateResult::TransportFailure => return finish(Label::InternalError, facts),
        CandidateResult::HttpFailure { .. } => return finish(Label::TgmFail, facts),
        CandidateResult::Success { query, .. } => match query.algebra() {
            Some(algebra) => algebra,
            None => return finish(Label::Syntax, facts),
        },
    };

    let Some(origin) = origin else {
        return finish(Label::BrokenOrigin, facts);
    };

    let label = compare(origin, candidate, &mut facts);
    finish(label, facts)
}

fn compare(origin: &QueryAlgebra, candidate: &QueryAlgebra, facts: &mut Vec<Fact>) -> Label {
    if origin.is_ask() != candidate.is_ask() {
        return if origin.is_ask() {
            Label::QuestionTypeYesNo
        } else {
            Label::QuestionTypeFactoid
        };
    }
    facts.push(Fact::PassedQuestionType);

    let graph = TripleGraph::build(&candidate.triples);
    if !origin.is_ask()
        && !all_targets_present(&graph, &candidate.targets, &candidate.bind_relations)
    {
        return Label::DisconnectedTarget;
    }
    facts.push(Fact::PassedDisconnectedTarget);

    if origin.length.is_some() {
        if candidate.length != origin.length || candidate.offset != origin.offset {
            return Label::WrongRange;
        }
        facts.push(Fact::PassedWrongRange);
    }

    if !origin.is_ask()
        && !every_component_touches_targets(
            &candidate.triples,
            &candidate.targets,
            &candidate.bind_relations,
        )
    {
        return Label::DisconnectedTriple;
    }
    facts.push(Fact::PassedDisconnectedTriple);

    Label::Good
}

fn finish(label: Label, facts: Vec<Fact>) -> Classification {
    Classification { label, facts }
}
