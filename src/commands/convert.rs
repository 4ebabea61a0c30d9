use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::{ConvertLcquadArgs, ConvertQaldArgs};
use crate::model::{QaldDataset, QaldQuery, QaldQuestion, QaldString};
use crate::util::{file_stem, read_json, write_json_pretty};

const LCQUAD_LANGUAGE: &str = "en";
const COUNT_RESULT_REPLACEMENT: &str = "SELECT (COUNT ${2} AS ?tgm_eval_result) WHERE {";

#[derive(Debug, Deserialize)]
struct LcquadEntry {
    #[serde(default)]
    verbalized_question: String,
    #[serde(default)]
    sparql_query: String,
}

pub fn run_lcquad(args: ConvertLcquadArgs) -> Result<()> {
    if args.chunk_size == 0 {
        bail!("--chunk-size must be greater than zero");
    }

    let count_regex = Regex::new(r"SELECT( DISTINCT|) COUNT(.*) WHERE \{")
        .context("failed to compile COUNT projection regex")?;
    let entries: Vec<LcquadEntry> = read_json(&args.input)?;
    let questions: Vec<QaldQuestion> = entries
        .iter()
        .map(|entry| lcquad_question(&count_regex, entry))
        .collect();

    let written = write_chunks(&args.output_dir, &questions, args.chunk_size)?;
    info!(
        input = %args.input.display(),
        questions = questions.len(),
        files = written.len(),
        "converted LC-QuAD dataset"
    );
    Ok(())
}

fn lcquad_question(count_regex: &Regex, entry: &LcquadEntry) -> QaldQuestion {
    let string = entry.verbalized_question.replace(['<', '>'], "");
    let sparql = count_regex
        .replace_all(&entry.sparql_query, COUNT_RESULT_REPLACEMENT)
        .into_owned();

    QaldQuestion {
        answertype: None,
        question: vec![QaldString {
            language: Some(LCQUAD_LANGUAGE.to_string()),
            string: Some(string),
        }],
        query: QaldQuery {
            sparql: Some(sparql),
        },
    }
}

fn write_chunks(
    output_dir: &Path,
    questions: &[QaldQuestion],
    chunk_size: usize,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (index, chunk) in questions.chunks(chunk_size).enumerate() {
        let path = output_dir.join(format!("lcquad-{:02}.json", index + 1));
        let dataset = QaldDataset {
            questions: chunk.to_vec(),
        };
        write_json_pretty(&path, &dataset)?;
        written.push(path);
    }
    Ok(written)
}

pub fn run_qald(args: ConvertQaldArgs) -> Result<()> {
    let is_json = args
        .input
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        let output = args.output.clone().unwrap_or_else(|| {
            args.output_dir
                .join(args.input.file_name().unwrap_or_default())
        });
        let dataset: Value = read_json(&args.input)?;
        write_json_pretty(&output, &dataset)?;
        info!(input = %args.input.display(), output = %output.display(), "copied QALD json dataset");
        return Ok(());
    }

    let xml = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let dataset = parse_qald_xml(&xml, &args.language)
        .with_context(|| format!("failed to parse QALD XML {}", args.input.display()))?;

    let output = match args.output.clone() {
        Some(output) => output,
        None => args
            .output_dir
            .join(format!("{}.json", file_stem(&args.input)?.replace('_', "-"))),
    };
    write_json_pretty(&output, &dataset)?;
    info!(
        input = %args.input.display(),
        output = %output.display(),
        questions = dataset.questions.len(),
        "converted QALD XML dataset"
    );
    Ok(())
}

#[derive(Debug, Default)]
struct PendingQuestion {
    answertype: Option<String>,
    strings: Vec<(Option<String>, String)>,
    query: Option<String>,
}

impl PendingQuestion {
    fn finish(self, language: &str) -> Option<QaldQuestion> {
        let string = self
            .strings
            .iter()
            .find(|(lang, _)| lang.as_deref() == Some(language))
            .or_else(|| self.strings.iter().find(|(lang, _)| lang.is_none()))
            .map(|(_, text)| text.clone())?;
        let sparql = self.query.filter(|query| !query.is_empty())?;
        if string.is_empty() {
            return None;
        }

        Some(QaldQuestion {
            answertype: self.answertype,
            question: vec![QaldString {
                language: Some(language.to_string()),
                string: Some(string),
            }],
            query: QaldQuery {
                sparql: Some(sparql),
            },
        })
    }
}

#[derive(Debug)]
enum Field {
    String(Option<String>),
    Query,
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    match element.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

/// Reads `<question answertype="..">` elements with their `<string lang="..">`
/// and `<query>` children. Other elements are ignored.
fn parse_qald_xml(xml: &str, language: &str) -> Result<QaldDataset> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut questions = Vec::new();
    let mut skipped = 0_usize;
    let mut pending: Option<PendingQuestion> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(element) => match element.name().as_ref() {
                b"question" => {
                    pending = Some(PendingQuestion {
                        answertype: attribute(&element, "answertype")?,
                        ..PendingQuestion::default()
                    });
                }
                b"string" if pending.is_some() => {
                    field = Some(Field::String(attribute(&element, "lang")?));
                    text.clear();
                }
                b"query" if pending.is_some() => {
                    field = Some(Field::Query);
                    text.clear();
                }
                _ => {}
            },
            Event::Text(content) if field.is_some() => text.push_str(&content.unescape()?),
            Event::CData(content) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(&content.into_inner()));
            }
            Event::End(element) => match element.name().as_ref() {
                b"string" | b"query" => {
                    if let (Some(current), Some(question)) = (field.take(), pending.as_mut()) {
                        let value = text.trim().to_string();
                        match current {
                            Field::String(lang) => question.strings.push((lang, value)),
                            Field::Query => question.query = Some(value),
                        }
                    }
                }
                b"question" => {
                    if let Some(question) = pending.take() {
                        match question.finish(language) {
                            Some(question) => questions.push(question),
                            None => skipped += 1,
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if skipped > 0 {
        warn!(skipped, language, "skipped QALD questions without a query or localized string");
    }
    Ok(QaldDataset { questions })
}
