use std::collections::BTreeSet;

use crate::catalog::Catalog;
use crate::formats::CandidateRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoInfo,
    MissingTitle,
    MissingUrl,
    MissingPublisher,
    ExcludedPublisher(String),
    KnownSourceLink,
}

impl SkipReason {
    /// Operator-facing log line, kept stable for people grepping old logs.
    pub fn log_message(&self) -> &'static str {
        match self {
            SkipReason::NoInfo => "No info for url",
            SkipReason::MissingTitle => "missing title.",
            SkipReason::MissingUrl => "missing url.",
            SkipReason::MissingPublisher | SkipReason::ExcludedPublisher(_) => "exist.",
            SkipReason::KnownSourceLink => "exist By URL.",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoInfo => f.write_str("no info"),
            SkipReason::MissingTitle => f.write_str("missing title"),
            SkipReason::MissingUrl => f.write_str("missing url"),
            SkipReason::MissingPublisher => f.write_str("missing publisher"),
            SkipReason::ExcludedPublisher(name) => write!(f, "excluded publisher: {name}"),
            SkipReason::KnownSourceLink => f.write_str("source link already imported"),
        }
    }
}

/// Applies the reject rules in order and returns the first that fires.
/// Reads the catalog but never writes to it.
pub fn check(
    candidate: Option<&CandidateRecord>,
    excluded_publishers: &BTreeSet<String>,
    catalog: &Catalog,
) -> anyhow::Result<Option<SkipReason>> {
    let Some(candidate) = candidate.filter(|c| !c.is_empty()) else {
        return Ok(Some(SkipReason::NoInfo));
    };

    if candidate.title.as_deref().is_none_or(is_blank) {
        return Ok(Some(SkipReason::MissingTitle));
    }
    if candidate.url.is_empty() {
        return Ok(Some(SkipReason::MissingUrl));
    }
    match candidate.publisher.as_deref() {
        None => return Ok(Some(SkipReason::MissingPublisher)),
        Some(publisher) if is_blank(publisher) => return Ok(Some(SkipReason::MissingPublisher)),
        Some(publisher) if excluded_publishers.contains(publisher) => {
            return Ok(Some(SkipReason::ExcludedPublisher(publisher.to_owned())));
        }
        Some(_) => {}
    }
    if catalog.has_source_link(&candidate.url)? {
        return Ok(Some(SkipReason::KnownSourceLink));
    }

    Ok(None)
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
