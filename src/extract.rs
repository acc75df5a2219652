use std::io::Write as _;
use std::process::{Command, Stdio};

use anyhow::Context as _;

use crate::config::ExtractorConfig;
use crate::formats::CandidateRecord;

/// Turns a fetched book page into a candidate record. `Ok(None)` means the
/// page carried nothing usable.
pub trait Extractor: Send + Sync {
    fn extract(&self, url: &str, html: &str) -> anyhow::Result<Option<CandidateRecord>>;
}

/// Runs an external program per page: HTML on stdin, page URL as the last
/// argument, candidate JSON (or `null` / nothing) on stdout.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    bin: String,
    args: Vec<String>,
}

impl CommandExtractor {
    pub fn new(bin: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            bin: bin.into(),
            args,
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> anyhow::Result<Self> {
        let bin = config.bin.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "no extractor configured: pass --extractor-bin or set SHELFIMPORT_EXTRACTOR_BIN"
            )
        })?;
        Ok(Self::new(bin, config.args.clone()))
    }
}

impl Extractor for CommandExtractor {
    fn extract(&self, url: &str, html: &str) -> anyhow::Result<Option<CandidateRecord>> {
        tracing::debug!(bin = %self.bin, url, "extractor exec");

        let mut child = Command::new(&self.bin)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawn extractor: {}", self.bin))?;

        let mut stdin = child.stdin.take().context("open extractor stdin")?;
        let html = html.to_owned();
        let writer = std::thread::spawn(move || stdin.write_all(html.as_bytes()));

        let output = child.wait_with_output().context("wait extractor")?;
        match writer.join() {
            Ok(Ok(())) => {}
            // The extractor may legitimately stop reading early.
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(err)) => return Err(err).context("write extractor stdin"),
            Err(_) => anyhow::bail!("extractor stdin writer panicked"),
        }

        if !output.status.success() {
            anyhow::bail!("extractor failed ({})", output.status);
        }

        let stdout = String::from_utf8(output.stdout).context("extractor output is not utf-8")?;
        parse_extractor_output(&stdout)
    }
}

fn parse_extractor_output(stdout: &str) -> anyhow::Result<Option<CandidateRecord>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let record: Option<CandidateRecord> =
        serde_json::from_str(trimmed).context("parse extractor output as candidate json")?;
    Ok(record.filter(|record| !record.is_empty()))
}
