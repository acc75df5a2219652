pub mod admission;
pub mod pipeline;

use std::fs::OpenOptions;
use std::io::{BufRead as _, BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::cli::ImportArgs;
use crate::config::ImportConfig;
use crate::extract::{CommandExtractor, Extractor};
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::formats::{CandidateRecord, ImportReportRecord, ReportOutcome};

pub use admission::SkipReason;
pub use pipeline::{ImportOutcome, ImportPolicy, Importer};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Where candidates come from for one run.
enum Input {
    Urls(Vec<String>),
    Records(Vec<RecordLine>),
}

enum RecordLine {
    Parsed(CandidateRecord),
    Invalid { line_no: usize, error: String },
}

pub async fn run(args: ImportArgs) -> anyhow::Result<()> {
    let config = ImportConfig::from_args(&args).context("load import config")?;
    tracing::debug!(?config, "import config");

    let input = match (args.urls.as_deref(), args.records.as_deref()) {
        (Some(path), None) => Input::Urls(read_url_list(Path::new(path))?),
        (None, Some(path)) => Input::Records(read_records(Path::new(path))?),
        _ => anyhow::bail!("pass exactly one of --urls or --records"),
    };

    let mut report = match args.report.as_deref() {
        Some(path) => Some(ReportWriter::create(Path::new(path))?),
        None => None,
    };

    let mut catalog = Catalog::open(Path::new(&args.db)).context("open catalog")?;
    let http = Arc::new(HttpFetcher::new(&config)?);
    let importer = Importer::new(ImportPolicy::from(&config), http.clone());

    let mut summary = ImportSummary::default();
    match input {
        Input::Urls(urls) => {
            let extractor: Arc<dyn Extractor> =
                Arc::new(CommandExtractor::from_config(&config.extractor)?);
            for url in urls {
                let candidate = collect_candidate(http.as_ref(), &extractor, &url).await;
                let result = match candidate {
                    Ok(candidate) => importer.import(&mut catalog, candidate.as_ref()).await,
                    Err(err) => Err(err),
                };
                record_result(&mut summary, report.as_mut(), &url, result)?;
            }
        }
        Input::Records(lines) => {
            for line in lines {
                match line {
                    RecordLine::Parsed(candidate) => {
                        let url = candidate.url.clone();
                        let result = importer.import(&mut catalog, Some(&candidate)).await;
                        record_result(&mut summary, report.as_mut(), &url, result)?;
                    }
                    RecordLine::Invalid { line_no, error } => {
                        let err = anyhow::anyhow!("line {line_no}: {error}");
                        record_result(&mut summary, report.as_mut(), "", Err(err))?;
                    }
                }
            }
        }
    }

    if let Some(report) = report {
        report.finish()?;
    }

    tracing::info!(
        imported = summary.imported,
        skipped = summary.skipped,
        failed = summary.failed,
        "import finished"
    );
    println!(
        "{}",
        serde_json::to_string(&summary).context("serialize import summary")?
    );
    Ok(())
}

/// Fetches and extracts one page. A fetch failure is logged and treated as
/// "no info" so the admission filter reports it; an extractor failure is an
/// error for this candidate only.
async fn collect_candidate(
    pages: &dyn PageFetcher,
    extractor: &Arc<dyn Extractor>,
    url: &str,
) -> anyhow::Result<Option<CandidateRecord>> {
    let html = match pages.fetch_page(url).await {
        Ok(Some(html)) => html,
        Ok(None) => return Ok(None),
        Err(err) => {
            tracing::warn!(url, ?err, "page fetch failed");
            return Ok(None);
        }
    };

    let extractor = Arc::clone(extractor);
    let page_url = url.to_owned();
    let record = tokio::task::spawn_blocking(move || extractor.extract(&page_url, &html))
        .await
        .context("spawn_blocking join")?
        .with_context(|| format!("extract: {url}"))?;

    Ok(record.map(|mut record| {
        record.url = url.to_owned();
        record
    }))
}

fn record_result(
    summary: &mut ImportSummary,
    report: Option<&mut ReportWriter>,
    url: &str,
    result: anyhow::Result<ImportOutcome>,
) -> anyhow::Result<()> {
    let mut line = ImportReportRecord {
        url: url.to_owned(),
        outcome: ReportOutcome::Skipped,
        book_id: None,
        title: None,
        reason: None,
        processed_at: chrono::Utc::now().to_rfc3339(),
    };

    match result {
        Ok(ImportOutcome::Imported { book_id, title }) => {
            summary.imported += 1;
            line.outcome = ReportOutcome::Imported;
            line.book_id = Some(book_id);
            line.title = Some(title);
        }
        Ok(ImportOutcome::Skipped(reason)) => {
            summary.skipped += 1;
            match &reason {
                SkipReason::NoInfo => tracing::info!("{}: {url}", reason.log_message()),
                _ => tracing::info!(url, %reason, "{}", reason.log_message()),
            }
            line.reason = Some(reason.to_string());
        }
        Err(err) => {
            summary.failed += 1;
            tracing::error!(url, ?err, "import failed");
            line.outcome = ReportOutcome::Failed;
            line.reason = Some(format!("{err:#}"));
        }
    }

    if let Some(report) = report {
        report.write(&line)?;
    }
    Ok(())
}

fn read_url_list(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read url list: {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

fn read_records(path: &Path) -> anyhow::Result<Vec<RecordLine>> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("open records: {}", path.display()))?;

    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("read records jsonl line")?;
        if line.trim().is_empty() {
            continue;
        }
        let record = match serde_json::from_str::<CandidateRecord>(&line) {
            Ok(candidate) => RecordLine::Parsed(candidate),
            Err(err) => RecordLine::Invalid {
                line_no: idx + 1,
                error: err.to_string(),
            },
        };
        records.push(record);
    }
    Ok(records)
}

struct ReportWriter {
    path: PathBuf,
    out: BufWriter<std::fs::File>,
}

impl ReportWriter {
    fn create(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            anyhow::bail!("report output already exists: {}", path.display());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create report dir: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(path)
            .with_context(|| format!("create report: {}", path.display()))?;
        Ok(Self {
            path: path.to_owned(),
            out: BufWriter::new(file),
        })
    }

    fn write(&mut self, record: &ImportReportRecord) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.out, record).context("write report record json")?;
        self.out
            .write_all(b"\n")
            .context("write report record newline")?;
        Ok(())
    }

    fn finish(mut self) -> anyhow::Result<()> {
        self.out
            .flush()
            .with_context(|| format!("flush report: {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_list_skips_blank_lines() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("urls.txt");
        std::fs::write(&path, "http://x/1\n\n  \nhttp://x/2  \r\n")?;

        assert_eq!(read_url_list(&path)?, vec!["http://x/1", "http://x/2"]);
        Ok(())
    }

    #[test]
    fn invalid_record_lines_are_kept_in_order() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("records.jsonl");
        std::fs::write(&path, "{\"url\": \"a\"}\nnot json\n\n{\"url\": \"b\"}\n")?;

        let lines = read_records(&path)?;
        assert_eq!(lines.len(), 3);
        assert!(matches!(&lines[0], RecordLine::Parsed(c) if c.url == "a"));
        assert!(matches!(&lines[1], RecordLine::Invalid { line_no: 2, .. }));
        assert!(matches!(&lines[2], RecordLine::Parsed(c) if c.url == "b"));
        Ok(())
    }

    #[test]
    fn failures_and_skips_are_counted() -> anyhow::Result<()> {
        let mut summary = ImportSummary::default();
        record_result(
            &mut summary,
            None,
            "http://x/1",
            Ok(ImportOutcome::Imported {
                book_id: 1,
                title: "T".to_owned(),
            }),
        )?;
        record_result(
            &mut summary,
            None,
            "http://x/1",
            Ok(ImportOutcome::Skipped(SkipReason::KnownSourceLink)),
        )?;
        record_result(&mut summary, None, "http://x/2", Err(anyhow::anyhow!("boom")))?;

        assert_eq!(
            summary,
            ImportSummary {
                imported: 1,
                skipped: 1,
                failed: 1,
            }
        );
        Ok(())
    }
}
