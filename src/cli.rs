use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_TGMS: &[(&str, &str)] = &[
    (
        "rocknrole",
        "http://ws.okbqa.org:1515/templategeneration/rocknrole",
    ),
    ("lodqa", "http://lodqa.org/template.json"),
];

#[derive(Parser, Debug)]
#[command(
    name = "tgm-eval",
    version,
    about = "Evaluate template-generation modules against benchmark SPARQL queries"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Evaluate(EvaluateArgs),
    Check(CheckArgs),
    ConvertLcquad(ConvertLcquadArgs),
    ConvertQald(ConvertQaldArgs),
    Status(StatusArgs),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TgmEndpoint {
    pub name: String,
    pub url: String,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[arg(long = "dataset", required = true)]
    pub datasets: Vec<PathBuf>,

    #[arg(long = "tgm", value_parser = parse_tgm_endpoint)]
    pub tgms: Vec<TgmEndpoint>,

    #[arg(long, default_value = "en")]
    pub language: String,

    #[arg(long, default_value = ".cache/tgm-eval")]
    pub cache_root: PathBuf,

    #[arg(long, default_value_t = false)]
    pub no_cache: bool,

    #[arg(long = "prefix", value_parser = parse_key_value)]
    pub prefixes: Vec<(String, String)>,

    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(long, default_value_t = false)]
    pub no_detail: bool,
}

impl EvaluateArgs {
    pub fn endpoints(&self) -> Vec<TgmEndpoint> {
        if !self.tgms.is_empty() {
            return self.tgms.clone();
        }

        DEFAULT_TGMS
            .iter()
            .map(|(name, url)| TgmEndpoint {
                name: name.to_string(),
                url: url.to_string(),
            })
            .collect()
    }
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    #[arg(long)]
    pub origin: String,

    #[arg(long)]
    pub candidate: String,

    #[arg(long, default_value_t = 200, allow_negative_numbers = true)]
    pub status: i32,

    #[arg(long = "prefix", value_parser = parse_key_value)]
    pub prefixes: Vec<(String, String)>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ConvertLcquadArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value = "data")]
    pub output_dir: PathBuf,

    #[arg(long, default_value_t = 500)]
    pub chunk_size: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ConvertQaldArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value = "data")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "en")]
    pub language: String,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/tgm-eval")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value_t = 5)]
    pub limit: usize,
}

pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return Err(format!("expected NAME=VALUE, got `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_tgm_endpoint(raw: &str) -> Result<TgmEndpoint, String> {
    let (name, url) = parse_key_value(raw)?;
    if name.contains(['/', '\\']) {
        return Err(format!("TGM name must not contain path separators: `{name}`"));
    }
    Ok(TgmEndpoint { name, url })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn key_value_splits_on_first_equals() {
        assert_eq!(
            parse_key_value("dbo=http://dbpedia.org/ontology/?a=b"),
            Ok((
                "dbo".to_string(),
                "http://dbpedia.org/ontology/?a=b".to_string()
            ))
        );
        assert!(parse_key_value("missing").is_err());
        assert!(parse_key_value("=value").is_err());
    }

    #[test]
    fn evaluate_defaults_to_known_endpoints() {
        let cli = Cli::try_parse_from(["tgm-eval", "evaluate", "--dataset", "qald-6.json"])
            .expect("evaluate args should parse");
        let Commands::Evaluate(args) = cli.command else {
            panic!("expected evaluate command");
        };

        let names: Vec<String> = args.endpoints().into_iter().map(|tgm| tgm.name).collect();
        assert_eq!(names, vec!["rocknrole".to_string(), "lodqa".to_string()]);
        assert_eq!(args.language, "en");
        assert!(!args.no_cache);
    }

    #[test]
    fn explicit_tgm_replaces_defaults() {
        let cli = Cli::try_parse_from([
            "tgm-eval",
            "evaluate",
            "--dataset",
            "a.json",
            "--tgm",
            "local=http://localhost:8080/tgm",
        ])
        .expect("evaluate args should parse");
        let Commands::Evaluate(args) = cli.command else {
            panic!("expected evaluate command");
        };

        assert_eq!(
            args.endpoints(),
            vec![TgmEndpoint {
                name: "local".to_string(),
                url: "http://localhost:8080/tgm".to_string(),
            }]
        );
    }

    #[test]
    fn check_accepts_transport_failure_status() {
        let cli = Cli::try_parse_from([
            "tgm-eval",
            "check",
            "--origin",
            "ASK { ?a ?b ?c }",
            "--candidate",
            "",
            "--status",
            "-1",
        ])
        .expect("check args should parse");
        let Commands::Check(args) = cli.command else {
            panic!("expected check command");
        };
        assert_eq!(args.status, -1);
    }

    #[test]
    fn tgm_name_with_path_separator_is_rejected() {
        assert!(parse_tgm_endpoint("../x=http://localhost").is_err());
    }
}
