use std::collections::BTreeSet;
use std::sync::Arc;

use crate::catalog::{Catalog, EntityKind};
use crate::config::ImportConfig;
use crate::fetch::{CoverFetchOutcome, CoverFetcher};
use crate::formats::{CandidateRecord, Names};
use crate::import::admission::{self, SkipReason};
use crate::resolver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPolicy {
    pub excluded_publishers: BTreeSet<String>,
    pub source: String,
}

impl From<&ImportConfig> for ImportPolicy {
    fn from(config: &ImportConfig) -> Self {
        Self {
            excluded_publishers: config.excluded_publishers.clone(),
            source: config.source.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported { book_id: i64, title: String },
    Skipped(SkipReason),
}

pub struct Importer {
    policy: ImportPolicy,
    covers: Arc<dyn CoverFetcher>,
}

impl Importer {
    pub fn new(policy: ImportPolicy, covers: Arc<dyn CoverFetcher>) -> Self {
        Self { policy, covers }
    }

    /// Admits and builds one candidate.
    ///
    /// Rejections come back as [`ImportOutcome::Skipped`]. An `Err` means a
    /// storage failure part-way through; the book row may already exist with
    /// only some fields set, since nothing spans the whole construction.
    pub async fn import(
        &self,
        catalog: &mut Catalog,
        candidate: Option<&CandidateRecord>,
    ) -> anyhow::Result<ImportOutcome> {
        if let Some(reason) =
            admission::check(candidate, &self.policy.excluded_publishers, catalog)?
        {
            return Ok(ImportOutcome::Skipped(reason));
        }
        let Some(candidate) = candidate else {
            return Ok(ImportOutcome::Skipped(SkipReason::NoInfo));
        };
        let (Some(title), Some(publisher)) =
            (candidate.title.as_deref(), candidate.publisher.as_deref())
        else {
            anyhow::bail!("admitted candidate without title or publisher: {}", candidate.url);
        };

        let mut book = catalog.insert_book(title.trim(), candidate.isbn.as_deref().unwrap_or(""))?;

        book.pages = candidate.pages_count.as_ref().and_then(|pages| pages.parse());

        for name in names(candidate.translator.clone()) {
            let translator = resolver::resolve(catalog, EntityKind::Translator, &name)?;
            catalog.link(book.id, EntityKind::Translator, translator.id)?;
        }
        for name in names(candidate.author.clone()) {
            let author = resolver::resolve(catalog, EntityKind::Author, &name)?;
            catalog.link(book.id, EntityKind::Author, author.id)?;
        }

        let publisher = resolver::resolve(catalog, EntityKind::Publisher, publisher)?;
        book.publisher_id = Some(publisher.id);
        catalog.save_book(&book)?;

        if let Some(name) = present(candidate.cover_type.as_deref()) {
            book.cover_type_id = Some(resolver::resolve(catalog, EntityKind::CoverType, name)?.id);
        }
        if let Some(name) = present(candidate.size_type.as_deref()) {
            book.size_id = Some(resolver::resolve(catalog, EntityKind::Size, name)?.id);
        }

        match self.covers.fetch_cover(candidate.cover_url.as_deref()).await {
            CoverFetchOutcome::Fetched(cover) => book.cover = Some(cover),
            CoverFetchOutcome::Skipped(reason) => {
                tracing::warn!(url = %candidate.url, %reason, "cover skipped");
            }
        }

        book.source = self.policy.source.clone();
        book.source_link = candidate.url.clone();
        catalog.save_book(&book)?;

        tracing::info!(book_id = book.id, url = %candidate.url, "New book added: {}", title);
        Ok(ImportOutcome::Imported {
            book_id: book.id,
            title: book.title,
        })
    }
}

/// Scalar or list, minus blank entries.
fn names(value: Option<Names>) -> Vec<String> {
    value
        .map(Names::into_vec)
        .unwrap_or_default()
        .into_iter()
        .filter(|name| !name.trim().is_empty())
        .collect()
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
