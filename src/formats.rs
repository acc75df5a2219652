use serde::{Deserialize, Serialize};

/// One scraped book page, as produced by an extractor. Every field may be
/// missing; the importer decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Names>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translator: Option<Names>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_count: Option<PageCount>,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

impl CandidateRecord {
    /// True when the extractor produced nothing at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.as_ref().is_none_or(Names::is_empty)
            && self.translator.as_ref().is_none_or(Names::is_empty)
            && self.isbn.is_none()
            && self.publisher.is_none()
            && self.cover_type.is_none()
            && self.size_type.is_none()
            && self.pages_count.is_none()
            && self.url.is_empty()
            && self.cover_url.is_none()
    }
}

/// A single name or a list of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Names {
    One(String),
    Many(Vec<String>),
}

impl Names {
    pub fn is_empty(&self) -> bool {
        match self {
            Names::One(_) => false,
            Names::Many(names) => names.is_empty(),
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        match self {
            Names::One(name) => vec![name],
            Names::Many(names) => names,
        }
    }
}

/// Page count as scraped: usually text, sometimes already a number.
/// `Other` keeps any JSON value that fits neither, so an odd page count never
/// rejects the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageCount {
    Number(i64),
    Text(String),
    Other(serde_json::Value),
}

impl PageCount {
    /// Lenient parse; anything that is not a plain non-negative integer
    /// (ASCII, Persian or Arabic-Indic digits) yields `None`. Fractional
    /// numbers are truncated toward zero.
    pub fn parse(&self) -> Option<i64> {
        match self {
            PageCount::Number(n) if *n >= 0 => Some(*n),
            PageCount::Number(_) => None,
            PageCount::Other(value) => value
                .as_f64()
                .filter(|n| n.is_finite() && *n >= 0.0 && *n < i64::MAX as f64)
                .map(|n| n.trunc() as i64),
            PageCount::Text(text) => {
                let digits = text
                    .trim()
                    .chars()
                    .map(ascii_digit)
                    .collect::<Option<String>>()?;
                if digits.is_empty() {
                    return None;
                }
                digits.parse().ok()
            }
        }
    }
}

fn ascii_digit(ch: char) -> Option<char> {
    let offset = match ch {
        '0'..='9' => return Some(ch),
        '\u{06F0}'..='\u{06F9}' => ch as u32 - 0x06F0,
        '\u{0660}'..='\u{0669}' => ch as u32 - 0x0660,
        _ => return None,
    };
    char::from_digit(offset, 10)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOutcome {
    Imported,
    Skipped,
    Failed,
}

/// One line of the `--report` JSONL written by `import`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReportRecord {
    pub url: String,
    pub outcome: ReportOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub processed_at: String,
}
