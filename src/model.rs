use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::engine::{Bucket, Classification, TallySnapshot};

pub const TRANSPORT_FAILURE_STATUS: i32 = -1;
pub const HTTP_OK: i32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Ask,
    Select,
    Construct,
    Describe,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple(pub String, pub String, pub String);

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self(subject.into(), predicate.into(), object.into())
    }

    pub fn nodes(&self) -> [&str; 3] {
        [self.0.as_str(), self.1.as_str(), self.2.as_str()]
    }
}

/// Shape of a syntactically valid query, as far as the classifier needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAlgebra {
    pub kind: QueryKind,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub triples: Vec<Triple>,
    #[serde(default)]
    pub bind_relations: BTreeMap<String, String>,
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl QueryAlgebra {
    pub fn is_ask(&self) -> bool {
        self.kind == QueryKind::Ask
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParsedQuery {
    Valid(QueryAlgebra),
    SyntaxError { message: String },
}

impl ParsedQuery {
    pub fn algebra(&self) -> Option<&QueryAlgebra> {
        match self {
            Self::Valid(algebra) => Some(algebra),
            Self::SyntaxError { .. } => None,
        }
    }

    pub fn is_syntax_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question: String,
    #[serde(default)]
    pub answertype: Option<String>,
    pub source: String,
    pub sparql: String,
    pub origin_parsed: ParsedQuery,
}

/// Raw TGM reply as received over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TgmResponse {
    pub status: i32,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub slots: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub length: usize,
}

impl TgmResponse {
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            status: TRANSPORT_FAILURE_STATUS,
            query: None,
            score: None,
            slots: None,
            message: Some(message.into()),
            length: 0,
        }
    }

    pub fn http_failure(status: i32, body: impl Into<String>) -> Self {
        Self {
            status,
            query: None,
            score: None,
            slots: None,
            message: Some(body.into()),
            length: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CandidateResult {
    TransportFailure,
    HttpFailure {
        status: i32,
        message: Option<String>,
    },
    Success {
        query: ParsedQuery,
        score: Option<f64>,
        slots: Option<serde_json::Value>,
    },
}

impl CandidateResult {
    pub fn from_response(response: &TgmResponse, parsed: Option<&ParsedQuery>) -> Result<Self> {
        match response.status {
            TRANSPORT_FAILURE_STATUS => Ok(Self::TransportFailure),
            HTTP_OK => {
                let Some(query) = parsed else {
                    bail!("TGM response with status 200 carries no parsed candidate query");
                };
                Ok(Self::Success {
                    query: query.clone(),
                    score: response.score,
                    slots: response.slots.clone(),
                })
            }
            status => Ok(Self::HttpFailure {
                status,
                message: response.message.clone(),
            }),
        }
    }

    pub fn http_status(&self) -> i32 {
        match self {
            Self::TransportFailure => TRANSPORT_FAILURE_STATUS,
            Self::HttpFailure { status, .. } => *status,
            Self::Success { .. } => HTTP_OK,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgmEntry {
    pub tgm: TgmResponse,
    #[serde(default)]
    pub tgm_parsed: Option<ParsedQuery>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    pub origin: QuestionRecord,
    pub tgm: TgmResponse,
    pub tgm_parsed: Option<ParsedQuery>,
    pub eval: Option<Verdict>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub label: &'static str,
    pub bucket: Bucket,
    pub score: f64,
    pub facts: Vec<&'static str>,
}

impl From<&Classification> for Verdict {
    fn from(classification: &Classification) -> Self {
        Self {
            label: classification.label.name(),
            bucket: classification.bucket(),
            score: classification.label.score(),
            facts: classification.facts.iter().map(|fact| fact.name()).collect(),
        }
    }
}

impl EvaluationRecord {
    pub fn new(origin: QuestionRecord, entry: TgmEntry) -> Self {
        Self {
            origin,
            tgm: entry.tgm,
            tgm_parsed: entry.tgm_parsed,
            eval: None,
        }
    }

    pub fn candidate(&self) -> Result<CandidateResult> {
        CandidateResult::from_response(&self.tgm, self.tgm_parsed.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginCache {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_path: String,
    pub source_sha256: String,
    pub language: String,
    #[serde(default)]
    pub parser_fingerprint: String,
    pub records: Vec<QuestionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgmCache {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_sha256: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub parser_fingerprint: String,
    pub tgm_name: String,
    pub tgm_url: String,
    #[serde(default)]
    pub questions: Vec<String>,
    pub entries: Vec<TgmEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub tgm_name: String,
    pub tgm_url: String,
    pub language: String,
    pub started_at: String,
    pub finished_at: String,
    pub datasets: Vec<String>,
    pub tally: TallySnapshot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaldDataset {
    #[serde(default)]
    pub questions: Vec<QaldQuestion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaldQuestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answertype: Option<String>,
    #[serde(default)]
    pub question: Vec<QaldString>,
    #[serde(default)]
    pub query: QaldQuery,
}

impl QaldQuestion {
    pub fn string_in(&self, language: &str) -> Option<&str> {
        self.question
            .iter()
            .find(|entry| entry.language.as_deref() == Some(language))
            .and_then(|entry| entry.string.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaldString {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub string: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaldQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparql: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select_query() -> ParsedQuery {
        ParsedQuery::Valid(QueryAlgebra {
            kind: QueryKind::Select,
            targets: vec!["?a".to_string()],
            triples: vec![Triple::new("?a", "<p>", "<o>")],
            bind_relations: BTreeMap::new(),
            length: None,
            offset: None,
        })
    }

    #[test]
    fn parsed_query_serializes_with_status_tag() {
        let broken = ParsedQuery::SyntaxError {
            message: "unexpected token".to_string(),
        };
        let value = serde_json::to_value(&broken).expect("parsed query should serialize");
        assert_eq!(value["status"], "syntax_error");

        let value = serde_json::to_value(select_query()).expect("parsed query should serialize");
        assert_eq!(value["status"], "valid");
        assert_eq!(value["kind"], "select");
        assert_eq!(value["triples"][0][0], "?a");
    }

    #[test]
    fn candidate_result_maps_status_codes() {
        let failure = TgmResponse::transport_failure("unencodable question");
        let candidate =
            CandidateResult::from_response(&failure, None).expect("transport failure is valid");
        assert_eq!(candidate, CandidateResult::TransportFailure);
        assert_eq!(candidate.http_status(), -1);

        let not_found = TgmResponse::http_failure(404, "not found");
        let candidate =
            CandidateResult::from_response(&not_found, None).expect("http failure is valid");
        assert_eq!(candidate.http_status(), 404);
    }

    #[test]
    fn successful_response_without_parsed_query_is_rejected() {
        let response = TgmResponse {
            status: 200,
            query: Some("ASK { ?a ?b ?c }".to_string()),
            score: Some(0.5),
            slots: None,
            message: None,
            length: 1,
        };

        let error = CandidateResult::from_response(&response, None)
            .expect_err("missing parsed candidate must fail");
        assert!(error.to_string().contains("no parsed candidate"));

        let parsed = select_query();
        let candidate = CandidateResult::from_response(&response, Some(&parsed))
            .expect("parsed candidate should be accepted");
        assert_eq!(candidate.http_status(), 200);
    }
}
