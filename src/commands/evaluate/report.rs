use std::io::Write;

use anyhow::{Context, Result};

use crate::engine::{Bucket, Fact, Label, TallySnapshot};

const INFO_ITEMS: [&str; 5] = [
    Label::BrokenOrigin.name(),
    Label::InternalError.name(),
    Fact::YesNoQuestion.name(),
    Fact::FactoidQuestion.name(),
    Fact::RangeSpecified.name(),
];

const CRITICAL_ITEMS: [&str; 5] = [
    Label::TgmFail.name(),
    Label::Syntax.name(),
    Label::QuestionTypeFactoid.name(),
    Label::QuestionTypeYesNo.name(),
    Label::DisconnectedTarget.name(),
];

const NOTICE_ITEMS: [&str; 2] = [Label::WrongRange.name(), Label::DisconnectedTriple.name()];

pub fn write_text_report<W: Write>(
    output: &mut W,
    tgm_name: &str,
    snapshot: &TallySnapshot,
    detail: bool,
) -> Result<()> {
    writeln!(output, "* Evaluating \"{tgm_name}\"")?;
    writeln!(output, "Information - {} questions", snapshot.all)?;
    for item in INFO_ITEMS {
        let indent = if item == Fact::RangeSpecified.name() {
            "    "
        } else {
            "  "
        };
        writeln!(
            output,
            "{indent}{item}: {}",
            snapshot.count(Bucket::Info, item)
        )?;
    }

    if snapshot.all == 0 {
        return Ok(());
    }

    write_bucket(output, "Critical", Bucket::Critical, &CRITICAL_ITEMS, snapshot, detail)?;
    write_bucket(output, "Notice", Bucket::Notice, &NOTICE_ITEMS, snapshot, detail)?;
    writeln!(
        output,
        "Good - {} queries ({:.2}%)",
        snapshot.label_count(Label::Good),
        snapshot.share(snapshot.label_count(Label::Good))
    )?;
    Ok(())
}

fn write_bucket<W: Write>(
    output: &mut W,
    title: &str,
    bucket: Bucket,
    items: &[&str],
    snapshot: &TallySnapshot,
    detail: bool,
) -> Result<()> {
    let total: usize = items.iter().map(|item| snapshot.count(bucket, item)).sum();
    writeln!(
        output,
        "{title} - {total} queries ({:.2}%)",
        snapshot.share(total)
    )?;

    for item in items {
        let count = snapshot.count(bucket, item);
        let passed = snapshot.ok.get(*item).copied();
        match passed {
            Some(passed) if detail => {
                let checked = passed + count;
                if checked > 0 {
                    writeln!(
                        output,
                        "  {item}: {count} [out of {checked} ({:.2}%)]",
                        count as f64 / checked as f64 * 100.0
                    )?;
                } else {
                    writeln!(output, "  {item}: {count} [out of {checked}]")?;
                }
            }
            _ => writeln!(output, "  {item}: {count}")?,
        }
    }
    Ok(())
}

pub fn write_json_report<W: Write>(output: &mut W, snapshot: &TallySnapshot) -> Result<()> {
    serde_json::to_writer_pretty(&mut *output, snapshot)
        .context("failed to serialize evaluation summary")?;
    writeln!(output)?;
    Ok(())
}
