use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::model::{QaldDataset, QuestionRecord};
use crate::sparql::SparqlParser;
use crate::util::{file_stem, read_json, sha256_file};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSource {
    pub path: PathBuf,
    pub stem: String,
    pub sha256: String,
}

impl DatasetSource {
    pub fn open(path: &Path) -> Result<Option<Self>> {
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if !is_json {
            warn!(path = %path.display(), "input file is not a json file; skipping");
            return Ok(None);
        }

        Ok(Some(Self {
            path: path.to_path_buf(),
            stem: file_stem(path)?,
            sha256: sha256_file(path)?,
        }))
    }
}

/// Reads QALD-style question files. `load` returns every in-language record
/// of one file; `retain_unseen` then keeps each question string once across
/// all files, whether the records came from disk or from the cache.
#[derive(Debug)]
pub struct DatasetLoader {
    language: String,
    seen: HashSet<String>,
}

impl DatasetLoader {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            seen: HashSet::new(),
        }
    }

    pub fn retain_unseen(&mut self, records: Vec<QuestionRecord>) -> Vec<QuestionRecord> {
        let before = records.len();
        let kept: Vec<QuestionRecord> = records
            .into_iter()
            .filter(|record| self.seen.insert(record.question.clone()))
            .collect();
        if kept.len() < before {
            debug!(dropped = before - kept.len(), "dropped duplicate questions");
        }
        kept
    }

    pub fn load(&self, source: &DatasetSource, parser: &SparqlParser) -> Result<Vec<QuestionRecord>> {
        info!(path = %source.path.display(), "loading dataset");
        let dataset: QaldDataset = read_json(&source.path)?;

        let mut records = Vec::new();
        for entry in &dataset.questions {
            let Some(question) = entry.string_in(&self.language) else {
                continue;
            };
            let Some(sparql) = entry.query.sparql.as_deref() else {
                continue;
            };
            if question.is_empty() || sparql.is_empty() {
                continue;
            }

            records.push(QuestionRecord {
                question: question.to_string(),
                answertype: entry.answertype.clone(),
                source: source.stem.clone(),
                sparql: sparql.to_string(),
                origin_parsed: parser.parse(sparql),
            });
        }

        info!(
            path = %source.path.display(),
            questions = records.len(),
            broken = records.iter().filter(|record| !record.origin_parsed.is_syntax_valid()).count(),
            "prepared origin queries"
        );
        Ok(records)
    }
}
