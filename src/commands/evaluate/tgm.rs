use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::model::{HTTP_OK, QuestionRecord, TgmEntry, TgmResponse};
use crate::sparql::SparqlParser;

pub trait TemplateGenerator {
    fn generate(&self, question: &str) -> TgmResponse;
}

#[derive(Debug)]
pub struct HttpTgmClient {
    client: reqwest::blocking::Client,
    url: String,
    language: String,
}

impl HttpTgmClient {
    pub fn new(url: &str, language: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build TGM HTTP client")?;

        Ok(Self {
            client,
            url: url.to_string(),
            language: language.to_string(),
        })
    }
}

impl TemplateGenerator for HttpTgmClient {
    fn generate(&self, question: &str) -> TgmResponse {
        let payload = json!({ "string": question, "language": self.language });

        let response = match self.client.post(&self.url).json(&payload).send() {
            Ok(response) => response,
            Err(err) => {
                warn!(url = %self.url, error = %err, "TGM request failed");
                return TgmResponse::transport_failure(err.to_string());
            }
        };

        let status = i32::from(response.status().as_u16());
        match response.text() {
            Ok(body) => response_from_body(status, &body),
            Err(err) => {
                warn!(url = %self.url, status, error = %err, "failed to read TGM response body");
                TgmResponse::transport_failure(err.to_string())
            }
        }
    }
}

/// Interprets a TGM reply body. A 200 body is either a list of templates
/// (the first one is evaluated) or a single template object.
pub fn response_from_body(status: i32, body: &str) -> TgmResponse {
    if status != HTTP_OK {
        return TgmResponse::http_failure(status, body);
    }

    let (template, length) = match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(mut templates)) => {
            let length = templates.len();
            if templates.is_empty() {
                (Value::Null, 0)
            } else {
                (templates.swap_remove(0), length)
            }
        }
        Ok(template) => (template, 1),
        Err(err) => {
            debug!(error = %err, "TGM returned a non-json body");
            return TgmResponse {
                status,
                query: None,
                score: None,
                slots: None,
                message: Some(body.to_string()),
                length: 0,
            };
        }
    };

    TgmResponse {
        status,
        query: template
            .get("query")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        score: template.get("score").and_then(score_value),
        slots: template.get("slots").cloned(),
        message: None,
        length,
    }
}

fn score_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

pub fn fetch_entries(
    generator: &dyn TemplateGenerator,
    parser: &SparqlParser,
    questions: &[QuestionRecord],
) -> Vec<TgmEntry> {
    questions
        .iter()
        .map(|record| {
            let tgm = generator.generate(&record.question);
            let tgm_parsed = (tgm.status == HTTP_OK)
                .then(|| parser.parse(tgm.query.as_deref().unwrap_or_default()));
            TgmEntry { tgm, tgm_parsed }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_list_uses_first_entry_and_counts_templates() {
        let body = r#"[
            {"query": "SELECT ?v1 WHERE { ?v1 ?p ?o }", "score": 0.9, "slots": [{"s": "?p"}]},
            {"query": "ASK WHERE { ?a ?b ?c }", "score": 0.1, "slots": []}
        ]"#;

        let response = response_from_body(200, body);
        assert_eq!(response.status, 200);
        assert_eq!(response.length, 2);
        assert_eq!(
            response.query.as_deref(),
            Some("SELECT ?v1 WHERE { ?v1 ?p ?o }")
        );
        assert_eq!(response.score, Some(0.9));
        assert!(response.slots.is_some());
    }

    #[test]
    fn single_template_object_has_length_one() {
        let response = response_from_body(200, r#"{"query": "ASK { ?a ?b ?c }", "score": "0.5"}"#);
        assert_eq!(response.length, 1);
        assert_eq!(response.score, Some(0.5));
    }

    #[test]
    fn non_ok_status_keeps_body_as_message() {
        let response = response_from_body(503, "service unavailable");
        assert_eq!(response.status, 503);
        assert_eq!(response.message.as_deref(), Some("service unavailable"));
        assert!(response.query.is_none());
    }

    #[test]
    fn empty_list_and_invalid_json_carry_no_query() {
        assert!(response_from_body(200, "[]").query.is_none());
        assert!(response_from_body(200, "<html>").query.is_none());
    }

    struct StubGenerator;

    impl TemplateGenerator for StubGenerator {
        fn generate(&self, question: &str) -> TgmResponse {
            match question {
                "fail" => TgmResponse::http_failure(500, "error"),
                "offline" => TgmResponse::transport_failure("connection refused"),
                _ => response_from_body(200, r#"{"query": "ASK WHERE { ?a ?b ?c }"}"#),
            }
        }
    }

    #[test]
    fn fetch_entries_parses_only_successful_replies() {
        let questions: Vec<QuestionRecord> = ["ok", "fail", "offline"]
            .into_iter()
            .map(|question| QuestionRecord {
                question: question.to_string(),
                answertype: None,
                source: "stub".to_string(),
                sparql: "ASK WHERE { ?a ?b ?c }".to_string(),
                origin_parsed: SparqlParser::default().parse("ASK WHERE { ?a ?b ?c }"),
            })
            .collect();

        let entries = fetch_entries(&StubGenerator, &SparqlParser::default(), &questions);
        assert_eq!(entries.len(), 3);
        assert!(
            entries[0]
                .tgm_parsed
                .as_ref()
                .is_some_and(|parsed| parsed.is_syntax_valid())
        );
        assert!(entries[1].tgm_parsed.is_none());
        assert_eq!(entries[2].tgm.status, -1);
        assert!(entries[2].tgm_parsed.is_none());
    }
}
