//! Demo processor: labels each transcript message with a naive cue.

use actors::{JobProcessor, ProcessingFailure, ProgressReporter, RowSink};
use serde_json::Value;

const HEADER: [&str; 3] = ["Content", "Role", "Predicted Label"];

/// Words that strengthen a statement unless negated by the word before.
const BOOSTERS: &[&str] = &[
    "absolutely",
    "always",
    "certainly",
    "clearly",
    "definitely",
    "never",
    "obviously",
    "surely",
];

const HEDGES: &[&str] = &["maybe", "perhaps", "possibly", "probably", "might"];

pub struct TranscriptLabeler;

impl JobProcessor for TranscriptLabeler {
    fn name(&self) -> &str {
        "transcript-labeler"
    }

    fn process(
        &self,
        records: &[Value],
        sink: &mut RowSink<'_>,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<(), ProcessingFailure> {
        progress.report(1)?;
        sink.push_row(&HEADER)?;

        for (i, record) in records.iter().enumerate() {
            let content = field(record, "content")?;
            let role = field(record, "role")?;
            sink.push_row(&[content, role, label(content)])?;
            progress.report_fraction(i + 1, records.len())?;
        }
        Ok(())
    }
}

fn field<'a>(record: &'a Value, name: &str) -> Result<&'a str, ProcessingFailure> {
    record
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ProcessingFailure::new(format!("record without string field {name:?}")))
}

fn label(content: &str) -> &'static str {
    let words: Vec<String> = content
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .collect();

    let boosted = words.iter().enumerate().any(|(i, w)| {
        BOOSTERS.contains(&w.as_str())
            && !matches!(
                i.checked_sub(1).map(|p| words[p].as_str()),
                Some("not" | "without")
            )
    });
    if boosted {
        return "boosting";
    }
    if words.iter().any(|w| HEDGES.contains(&w.as_str())) {
        return "hedging";
    }
    "neutral"
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn labels_follow_cue_words() {
        assert_eq!(label("I am absolutely sure."), "boosting");
        assert_eq!(label("Not always, to be honest"), "neutral");
        assert_eq!(label("Maybe we could try"), "hedging");
        assert_eq!(label("We shipped it on Monday"), "neutral");
    }

    #[test]
    fn negated_booster_falls_through_to_hedge() {
        assert_eq!(label("not certainly, perhaps later"), "hedging");
    }

    #[test]
    fn record_without_content_is_a_failure() {
        let record = serde_json::json!({"role": "user"});
        let err = field(&record, "content").unwrap_err();
        assert_eq!(err.message(), "record without string field \"content\"");
    }
}
