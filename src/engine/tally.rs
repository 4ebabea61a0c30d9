use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::classify::Classification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Info,
    Critical,
    Notice,
    Ok,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [Self::Info, Self::Critical, Self::Notice, Self::Ok];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Critical => "critical",
            Self::Notice => "notice",
            Self::Ok => "ok",
        }
    }
}

/// Terminal verdict for one evaluation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    BrokenOrigin,
    InternalError,
    TgmFail,
    Syntax,
    QuestionTypeYesNo,
    QuestionTypeFactoid,
    DisconnectedTarget,
    WrongRange,
    DisconnectedTriple,
    Good,
}

impl Label {
    pub const ALL: [Label; 10] = [
        Self::BrokenOrigin,
        Self::InternalError,
        Self::TgmFail,
        Self::Syntax,
        Self::QuestionTypeYesNo,
        Self::QuestionTypeFactoid,
        Self::DisconnectedTarget,
        Self::WrongRange,
        Self::DisconnectedTriple,
        Self::Good,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::BrokenOrigin => "broken origin",
            Self::InternalError => "internal error",
            Self::TgmFail => "tgm fail",
            Self::Syntax => "syntax",
            Self::QuestionTypeYesNo => "question type (yes-no)",
            Self::QuestionTypeFactoid => "question type (factoid)",
            Self::DisconnectedTarget => "disconnected target",
            Self::WrongRange => "wrong range",
            Self::DisconnectedTriple => "disconnected triple",
            Self::Good => "good",
        }
    }

    pub const fn bucket(self) -> Bucket {
        match self {
            Self::BrokenOrigin | Self::InternalError => Bucket::Info,
            Self::TgmFail
            | Self::Syntax
            | Self::QuestionTypeYesNo
            | Self::QuestionTypeFactoid
            | Self::DisconnectedTarget => Bucket::Critical,
            Self::WrongRange | Self::DisconnectedTriple => Bucket::Notice,
            Self::Good => Bucket::Ok,
        }
    }

    pub fn score(self) -> f64 {
        if self == Self::Good { 1.0 } else { 0.0 }
    }
}

/// Non-terminal observation counted alongside the terminal label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fact {
    YesNoQuestion,
    FactoidQuestion,
    RangeSpecified,
    PassedQuestionType,
    PassedDisconnectedTarget,
    PassedWrongRange,
    PassedDisconnectedTriple,
}

impl Fact {
    pub const ALL: [Fact; 7] = [
        Self::YesNoQuestion,
        Self::FactoidQuestion,
        Self::RangeSpecified,
        Self::PassedQuestionType,
        Self::PassedDisconnectedTarget,
        Self::PassedWrongRange,
        Self::PassedDisconnectedTriple,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::YesNoQuestion => "yes-no question",
            Self::FactoidQuestion => "factoid question",
            Self::RangeSpecified => "range specified",
            Self::PassedQuestionType => "question type",
            Self::PassedDisconnectedTarget => "disconnected target",
            Self::PassedWrongRange => "wrong range",
            Self::PassedDisconnectedTriple => "disconnected triple",
        }
    }

    pub const fn bucket(self) -> Bucket {
        match self {
            Self::YesNoQuestion | Self::FactoidQuestion | Self::RangeSpecified => Bucket::Info,
            Self::PassedQuestionType
            | Self::PassedDisconnectedTarget
            | Self::PassedWrongRange
            | Self::PassedDisconnectedTriple => Bucket::Ok,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TallySnapshot {
    pub all: usize,
    pub info: BTreeMap<&'static str, usize>,
    pub critical: BTreeMap<&'static str, usize>,
    pub notice: BTreeMap<&'static str, usize>,
    pub ok: BTreeMap<&'static str, usize>,
}

impl TallySnapshot {
    pub fn bucket(&self, bucket: Bucket) -> &BTreeMap<&'static str, usize> {
        match bucket {
            Bucket::Info => &self.info,
            Bucket::Critical => &self.critical,
            Bucket::Notice => &self.notice,
            Bucket::Ok => &self.ok,
        }
    }

    pub fn count(&self, bucket: Bucket, name: &str) -> usize {
        self.bucket(bucket).get(name).copied().unwrap_or(0)
    }

    pub fn label_count(&self, label: Label) -> usize {
        self.count(label.bucket(), label.name())
    }

    pub fn share(&self, count: usize) -> f64 {
        if self.all == 0 {
            return 0.0;
        }
        count as f64 / self.all as f64 * 100.0
    }

    pub fn terminal_total(&self) -> usize {
        Label::ALL
            .iter()
            .map(|label| self.label_count(*label))
            .sum()
    }
}

/// Running counters across one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    counters: TallySnapshot,
}

impl Default for Tally {
    fn default() -> Self {
        Self::new()
    }
}

impl Tally {
    pub fn new() -> Self {
        let mut counters = TallySnapshot::default();
        for label in Label::ALL {
            counters.bucket_mut(label.bucket()).insert(label.name(), 0);
        }
        for fact in Fact::ALL {
            counters.bucket_mut(fact.bucket()).insert(fact.name(), 0);
        }
        Self { counters }
    }

    pub fn record(&mut self, classification: &Classification) {
        for fact in &classification.facts {
            self.bump(fact.bucket(), fact.name());
        }
        self.bump(classification.label.bucket(), classification.label.name());
        self.counters.all += 1;
    }

    fn bump(&mut self, bucket: Bucket, name: &'static str) {
        *self.counters.bucket_mut(bucket).entry(name).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> TallySnapshot {
        self.counters.clone()
    }
}

impl TallySnapshot {
    fn bucket_mut(&mut self, bucket: Bucket) -> &mut BTreeMap<&'static str, usize> {
        match bucket {
            Bucket::Info => &mut self.info,
            Bucket::Critical => &mut self.critical,
            Bucket::Notice => &mut self.notice,
            Bucket::Ok => &mut self.ok,
        }
    }
}
