use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use super::dataset::DatasetSource;
use crate::model::{OriginCache, QuestionRecord, TgmCache, TgmEntry};
use crate::util::{now_utc_string, read_json, write_json_pretty};

const CACHE_MANIFEST_VERSION: u32 = 2;

/// Origin and candidate caches for one language and one parser prologue.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    language: String,
    parser_fingerprint: String,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, language: &str, parser_fingerprint: &str) -> Self {
        Self {
            dir: dir.into(),
            language: language.to_string(),
            parser_fingerprint: parser_fingerprint.to_string(),
        }
    }

    pub fn origin_path(&self, source: &DatasetSource) -> PathBuf {
        self.dir.join(format!("{}-origin.json", source.stem))
    }

    pub fn tgm_path(&self, source: &DatasetSource, tgm_name: &str) -> PathBuf {
        self.dir.join(format!("{}-{}.json", source.stem, tgm_name))
    }

    /// Every in-language record of the dataset file, before cross-file
    /// deduplication.
    pub fn load_origin(&self, source: &DatasetSource) -> Option<Vec<QuestionRecord>> {
        let path = self.origin_path(source);
        let cache: OriginCache = load_if_present(&path)?;

        if cache.manifest_version != CACHE_MANIFEST_VERSION
            || cache.source_sha256 != source.sha256
            || cache.language != self.language
            || cache.parser_fingerprint != self.parser_fingerprint
        {
            warn!(path = %path.display(), "origin cache is stale; rebuilding");
            return None;
        }

        info!(path = %path.display(), records = cache.records.len(), "loaded origin cache");
        Some(cache.records)
    }

    pub fn store_origin(&self, source: &DatasetSource, records: &[QuestionRecord]) -> Result<()> {
        let cache = OriginCache {
            manifest_version: CACHE_MANIFEST_VERSION,
            generated_at: now_utc_string(),
            source_path: source.path.display().to_string(),
            source_sha256: source.sha256.clone(),
            language: self.language.clone(),
            parser_fingerprint: self.parser_fingerprint.clone(),
            records: records.to_vec(),
        };
        write_json_pretty(&self.origin_path(source), &cache)
    }

    /// Cached replies are reused only when they were fetched for exactly
    /// `questions`, in order.
    pub fn load_tgm(
        &self,
        source: &DatasetSource,
        tgm_name: &str,
        questions: &[QuestionRecord],
    ) -> Option<Vec<TgmEntry>> {
        let path = self.tgm_path(source, tgm_name);
        let cache: TgmCache = load_if_present(&path)?;

        let same_questions = cache.questions.len() == questions.len()
            && cache
                .questions
                .iter()
                .zip(questions)
                .all(|(cached, record)| *cached == record.question);
        if cache.manifest_version != CACHE_MANIFEST_VERSION
            || cache.source_sha256 != source.sha256
            || cache.language != self.language
            || cache.parser_fingerprint != self.parser_fingerprint
            || cache.entries.len() != questions.len()
            || !same_questions
        {
            warn!(
                path = %path.display(),
                cached = cache.entries.len(),
                expected = questions.len(),
                "TGM cache does not match dataset; refetching"
            );
            return None;
        }

        info!(path = %path.display(), entries = cache.entries.len(), "loaded TGM cache");
        Some(cache.entries)
    }

    pub fn store_tgm(
        &self,
        source: &DatasetSource,
        tgm_name: &str,
        tgm_url: &str,
        questions: &[QuestionRecord],
        entries: &[TgmEntry],
    ) -> Result<()> {
        let cache = TgmCache {
            manifest_version: CACHE_MANIFEST_VERSION,
            generated_at: now_utc_string(),
            source_sha256: source.sha256.clone(),
            language: self.language.clone(),
            parser_fingerprint: self.parser_fingerprint.clone(),
            tgm_name: tgm_name.to_string(),
            tgm_url: tgm_url.to_string(),
            questions: questions
                .iter()
                .map(|record| record.question.clone())
                .collect(),
            entries: entries.to_vec(),
        };
        write_json_pretty(&self.tgm_path(source, tgm_name), &cache)
    }
}

fn load_if_present<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }

    match read_json(path) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(path = %path.display(), error = %format!("{err:#}"), "ignoring unreadable cache file");
            None
        }
    }
}
