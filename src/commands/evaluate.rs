use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{debug, info};

use crate::cli::{EvaluateArgs, TgmEndpoint};
use crate::engine::{Bucket, Tally, classify};
use crate::model::{
    CandidateResult, EvaluationRecord, EvaluationRunManifest, QuestionRecord, Verdict,
};
use crate::sparql::SparqlParser;
use crate::store;
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

mod cache;
mod dataset;
mod report;
mod tgm;

use self::cache::CacheStore;
use self::dataset::{DatasetLoader, DatasetSource};
use self::tgm::{HttpTgmClient, TemplateGenerator, fetch_entries};

const RUN_MANIFEST_VERSION: u32 = 1;

pub fn run(args: EvaluateArgs) -> Result<()> {
    let parser = SparqlParser::new(&args.prefixes);
    let cache = (!args.no_cache).then(|| {
        CacheStore::new(
            args.cache_root.join("cache"),
            &args.language,
            &parser.fingerprint(),
        )
    });
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join(store::DB_FILENAME));
    let mut connection = store::open_run_database(&db_path)?;

    let dataset_paths: Vec<PathBuf> = args.datasets.iter().rev().cloned().collect();
    let origins = load_origins(&dataset_paths, &args.language, &parser, cache.as_ref())?;
    let question_count: usize = origins.iter().map(|(_, records)| records.len()).sum();
    info!(
        datasets = origins.len(),
        questions = question_count,
        "origin queries ready"
    );

    for endpoint in args.endpoints() {
        let started = Utc::now();
        let started_at = now_utc_string();
        let run_id = format!("run-{}-{}", utc_compact_string(started), endpoint.name);
        info!(tgm = %endpoint.name, url = %endpoint.url, run_id = %run_id, "evaluating TGM");

        let client = HttpTgmClient::new(
            &endpoint.url,
            &args.language,
            Duration::from_secs(args.timeout_secs),
        )?;
        let mut records = collect_records(&endpoint, &client, &parser, cache.as_ref(), &origins)?;
        let tally = evaluate_records(&mut records)?;
        let snapshot = tally.snapshot();
        if snapshot.terminal_total() != snapshot.all {
            bail!(
                "terminal labels cover {} of {} records",
                snapshot.terminal_total(),
                snapshot.all
            );
        }

        let mut output = io::BufWriter::new(io::stdout().lock());
        if args.json {
            report::write_json_report(&mut output, &snapshot)?;
        } else {
            report::write_text_report(&mut output, &endpoint.name, &snapshot, !args.no_detail)?;
            writeln!(output)?;
        }
        output.flush()?;

        let dump_dir = args.cache_root.join("dump");
        write_dumps(&dump_dir, &endpoint.name, &records)?;

        let manifest = EvaluationRunManifest {
            manifest_version: RUN_MANIFEST_VERSION,
            run_id: run_id.clone(),
            tgm_name: endpoint.name.clone(),
            tgm_url: endpoint.url.clone(),
            language: args.language.clone(),
            started_at,
            finished_at: now_utc_string(),
            datasets: origins
                .iter()
                .map(|(source, _)| source.path.display().to_string())
                .collect(),
            tally: snapshot,
        };
        let manifest_path = args
            .cache_root
            .join("manifests")
            .join(format!("eval_run_{}_{}.json", utc_compact_string(started), endpoint.name));
        write_json_pretty(&manifest_path, &manifest)?;
        store::record_run(&mut connection, &manifest, &records)?;

        info!(
            tgm = %endpoint.name,
            all = manifest.tally.all,
            manifest = %manifest_path.display(),
            "evaluation completed"
        );
    }

    Ok(())
}

fn load_origins(
    paths: &[PathBuf],
    language: &str,
    parser: &SparqlParser,
    cache: Option<&CacheStore>,
) -> Result<Vec<(DatasetSource, Vec<QuestionRecord>)>> {
    let mut loader = DatasetLoader::new(language);
    let mut origins = Vec::with_capacity(paths.len());

    for path in paths {
        let Some(source) = DatasetSource::open(path)? else {
            continue;
        };

        let cached = cache.and_then(|cache| cache.load_origin(&source));
        let records = match cached {
            Some(records) => records,
            None => {
                let records = loader.load(&source, parser)?;
                if let Some(cache) = cache {
                    cache.store_origin(&source, &records)?;
                }
                records
            }
        };
        origins.push((source, loader.retain_unseen(records)));
    }

    if origins.is_empty() {
        bail!("no usable dataset files among {} inputs", paths.len());
    }
    Ok(origins)
}

fn collect_records(
    endpoint: &TgmEndpoint,
    generator: &dyn TemplateGenerator,
    parser: &SparqlParser,
    cache: Option<&CacheStore>,
    origins: &[(DatasetSource, Vec<QuestionRecord>)],
) -> Result<Vec<EvaluationRecord>> {
    let mut records = Vec::new();

    for (source, questions) in origins {
        let cached = cache.and_then(|cache| cache.load_tgm(source, &endpoint.name, questions));
        let entries = match cached {
            Some(entries) => entries,
            None => {
                let entries = fetch_entries(generator, parser, questions);
                if let Some(cache) = cache {
                    cache.store_tgm(source, &endpoint.name, &endpoint.url, questions, &entries)?;
                }
                entries
            }
        };

        info!(
            tgm = %endpoint.name,
            source = %source.stem,
            queries = entries.len(),
            "prepared candidate queries"
        );
        records.extend(
            questions
                .iter()
                .cloned()
                .zip(entries)
                .map(|(origin, entry)| EvaluationRecord::new(origin, entry)),
        );
    }

    Ok(records)
}

/// Classifies every record in order and returns the aggregated counters.
pub fn evaluate_records(records: &mut [EvaluationRecord]) -> Result<Tally> {
    let mut tally = Tally::new();
    for record in records.iter_mut() {
        let candidate = record.candidate()?;
        match &candidate {
            CandidateResult::Success { score, slots, .. } => debug!(
                question = %record.origin.question,
                score = ?score,
                slots = slots.is_some(),
                "candidate received"
            ),
            CandidateResult::HttpFailure { status, message } => debug!(
                question = %record.origin.question,
                status,
                message = message.as_deref().unwrap_or_default(),
                "TGM rejected question"
            ),
            CandidateResult::TransportFailure => {}
        }
        let classification = classify(&record.origin.origin_parsed, &candidate);
        tally.record(&classification);
        record.eval = Some(Verdict::from(&classification));
    }
    Ok(tally)
}

fn write_dumps(dump_dir: &Path, tgm_name: &str, records: &[EvaluationRecord]) -> Result<()> {
    for bucket in [Bucket::Critical, Bucket::Notice] {
        let subset: Vec<&EvaluationRecord> = records
            .iter()
            .filter(|record| record.eval.as_ref().is_some_and(|eval| eval.bucket == bucket))
            .collect();
        let path = dump_dir.join(format!("{tgm_name}-{}.json", bucket.as_str()));
        write_json_pretty(&path, &subset)?;
    }

    write_json_pretty(&dump_dir.join(format!("{tgm_name}-all.json")), &records)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::engine::Label;
    use crate::model::TgmResponse;
    use crate::util::read_json;

    struct EchoGenerator;

    impl TemplateGenerator for EchoGenerator {
        fn generate(&self, question: &str) -> TgmResponse {
            let body = match question {
                "Is Berlin a city?" => r#"{"query": "ASK WHERE { ?v1 ?v2 ?v3 }", "score": 1.0}"#,
                "Who wrote Dune?" => {
                    r#"[{"query": "SELECT ?v1 WHERE { ?v2 ?v3 ?v4 }", "score": 0.4}]"#
                }
                _ => return TgmResponse::http_failure(500, "unknown question"),
            };
            tgm::response_from_body(200, body)
        }
    }

    struct UnreachableGenerator;

    impl TemplateGenerator for UnreachableGenerator {
        fn generate(&self, question: &str) -> TgmResponse {
            panic!("cached run should not query the TGM for {question:?}");
        }
    }

    const DATASET: &str = r#"
    {
      "questions": [
        {
          "answertype": "boolean",
          "question": [{ "language": "en", "string": "Is Berlin a city?" }],
          "query": { "sparql": "ASK WHERE { <http://dbpedia.org/resource/Berlin> rdf:type ?t }" }
        },
        {
          "question": [{ "language": "en", "string": "Who wrote Dune?" }],
          "query": { "sparql": "SELECT ?a WHERE { <http://dbpedia.org/resource/Dune> <http://dbpedia.org/ontology/author> ?a }" }
        },
        {
          "question": [{ "language": "en", "string": "Where is Tokyo?" }],
          "query": { "sparql": "SELECT ?p WHERE { <http://dbpedia.org/resource/Tokyo> foaf:based_near ?p } LIMIT 1" }
        }
      ]
    }
    "#;

    fn endpoint() -> TgmEndpoint {
        TgmEndpoint {
            name: "echo".to_string(),
            url: "http://localhost:0/tgm".to_string(),
        }
    }

    #[test]
    fn dataset_evaluation_classifies_and_caches_every_question() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let dataset_path = dir.path().join("qald-mini.json");
        fs::write(&dataset_path, DATASET).expect("dataset should be written");

        let parser = SparqlParser::default();
        let cache = CacheStore::new(dir.path().join("cache"), "en", &parser.fingerprint());
        let origins = load_origins(&[dataset_path.clone()], "en", &parser, Some(&cache))
            .expect("origins should load");
        assert_eq!(origins[0].1.len(), 3);

        let mut records = collect_records(&endpoint(), &EchoGenerator, &parser, Some(&cache), &origins)
            .expect("records should be collected");
        let tally = evaluate_records(&mut records).expect("records should be evaluated");
        let snapshot = tally.snapshot();

        let labels: Vec<&str> = records
            .iter()
            .map(|record| record.eval.as_ref().expect("record should be evaluated").label)
            .collect();
        assert_eq!(
            labels,
            vec![
                Label::Good.name(),
                Label::DisconnectedTarget.name(),
                Label::TgmFail.name()
            ]
        );
        assert_eq!(snapshot.all, 3);
        assert_eq!(snapshot.terminal_total(), 3);
        assert_eq!(snapshot.count(Bucket::Info, "range specified"), 1);

        assert!(dir.path().join("cache").join("qald-mini-origin.json").exists());
        assert!(dir.path().join("cache").join("qald-mini-echo.json").exists());

        let cached = collect_records(
            &endpoint(),
            &UnreachableGenerator,
            &parser,
            Some(&cache),
            &origins,
        )
        .expect("cached records should be collected");
        assert_eq!(cached.len(), 3);
    }

    #[test]
    fn dumps_split_records_by_bucket() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let dataset_path = dir.path().join("qald-mini.json");
        fs::write(&dataset_path, DATASET).expect("dataset should be written");

        let parser = SparqlParser::default();
        let origins =
            load_origins(&[dataset_path], "en", &parser, None).expect("origins should load");
        let mut records = collect_records(&endpoint(), &EchoGenerator, &parser, None, &origins)
            .expect("records should be collected");
        evaluate_records(&mut records).expect("records should be evaluated");

        let dump_dir = dir.path().join("dump");
        write_dumps(&dump_dir, "echo", &records).expect("dumps should be written");

        let critical: Vec<serde_json::Value> =
            read_json(&dump_dir.join("echo-critical.json")).expect("critical dump should parse");
        let notice: Vec<serde_json::Value> =
            read_json(&dump_dir.join("echo-notice.json")).expect("notice dump should parse");
        let all: Vec<serde_json::Value> =
            read_json(&dump_dir.join("echo-all.json")).expect("full dump should parse");

        assert_eq!(critical.len(), 2);
        assert!(notice.is_empty());
        assert_eq!(all.len(), 3);
        assert_eq!(all[0]["eval"]["label"], "good");
        assert_eq!(all[0]["eval"]["score"], 1.0);
    }

    const ONE_QUESTION: &str = r#"
    {
      "questions": [
        {
          "question": [{ "language": "en", "string": "Who wrote Dune?" }],
          "query": { "sparql": "SELECT ?a WHERE { <http://dbpedia.org/resource/Dune> <http://dbpedia.org/ontology/author> ?a }" }
        }
      ]
    }
    "#;

    #[test]
    fn duplicates_are_dropped_even_when_later_file_was_cached_alone() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let first = dir.path().join("a.json");
        let second = dir.path().join("b.json");
        fs::write(&first, ONE_QUESTION).expect("dataset should be written");
        fs::write(&second, ONE_QUESTION).expect("dataset should be written");

        let parser = SparqlParser::default();
        let cache = CacheStore::new(dir.path().join("cache"), "en", &parser.fingerprint());
        load_origins(&[second.clone()], "en", &parser, Some(&cache))
            .expect("single dataset should load");
        assert!(dir.path().join("cache").join("b-origin.json").exists());

        let fresh = load_origins(&[first.clone(), second.clone()], "en", &parser, None)
            .expect("uncached origins should load");
        let cached = load_origins(&[first, second], "en", &parser, Some(&cache))
            .expect("cached origins should load");

        let count = |origins: &[(DatasetSource, Vec<QuestionRecord>)]| -> usize {
            origins.iter().map(|(_, records)| records.len()).sum()
        };
        assert_eq!(count(&fresh), 1);
        assert_eq!(count(&cached), 1);
        assert!(cached[1].1.is_empty());
    }

    #[test]
    fn missing_datasets_are_an_error() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let error = load_origins(
            &[dir.path().join("questions.xml")],
            "en",
            &SparqlParser::default(),
            None,
        )
        .expect_err("only non-json inputs should fail");
        assert!(error.to_string().contains("no usable dataset files"));
    }
}
