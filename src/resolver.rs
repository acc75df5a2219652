//! Name -> row resolution for authors, translators, publishers, sizes and
//! cover types.
//!
//! The catalog does not enforce unique names. Instead every lookup heals the
//! name it touches: when several rows share it, the oldest row survives,
//! absorbs the book associations of the others, and the others are deleted.

use anyhow::Context as _;
use serde::Serialize;

use crate::catalog::{self, Catalog, EntityKind, NamedEntity};
use crate::cli::{DedupeArgs, ResolveArgs};

/// Returns the single row of `kind` named `name`, creating it when absent and
/// merging duplicates when more than one exists.
///
/// Matching is exact and case-sensitive. The lookup, any merge and any insert
/// run in one transaction.
pub fn resolve(catalog: &mut Catalog, kind: EntityKind, name: &str) -> anyhow::Result<NamedEntity> {
    if name.is_empty() {
        anyhow::bail!("cannot resolve {kind} with an empty name");
    }

    let tx = catalog.transaction()?;
    let matches = catalog::find_by_name(&tx, kind, name)?;

    let entity = match matches.split_first() {
        None => {
            let created = catalog::insert_entity(&tx, kind, name)?;
            tracing::debug!(%kind, name, id = created.id, "created entity");
            created
        }
        Some((survivor, [])) => survivor.clone(),
        Some((survivor, losers)) => {
            let mut moved = 0_usize;
            for loser in losers {
                moved += catalog::reassign_books(&tx, kind, loser.id, survivor.id)?;
                catalog::delete_entity(&tx, kind, loser.id)?;
            }
            tracing::info!(
                %kind,
                name,
                survivor = survivor.id,
                merged = losers.len(),
                moved,
                "merged duplicate entities"
            );
            survivor.clone()
        }
    };

    tx.commit()
        .with_context(|| format!("commit {kind} resolution: {name}"))?;
    Ok(entity)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealSummary {
    pub kind: Option<EntityKind>,
    pub names_healed: usize,
    pub rows_removed: usize,
}

/// Resolves every name of `kind` currently held by more than one row.
pub fn heal_all(catalog: &mut Catalog, kind: EntityKind) -> anyhow::Result<HealSummary> {
    let mut summary = HealSummary {
        kind: Some(kind),
        ..HealSummary::default()
    };

    for name in catalog.duplicate_names(kind)? {
        let before = catalog.entities_named(kind, &name)?.len();
        resolve(catalog, kind, &name)?;
        summary.names_healed += 1;
        summary.rows_removed += before.saturating_sub(1);
    }

    Ok(summary)
}

pub fn run(args: ResolveArgs) -> anyhow::Result<()> {
    let mut catalog = Catalog::open(std::path::Path::new(&args.db)).context("open catalog")?;
    let entity = resolve(&mut catalog, args.kind, &args.name)?;
    println!(
        "{}",
        serde_json::to_string(&entity).context("serialize resolved entity")?
    );
    Ok(())
}

pub fn dedupe(args: DedupeArgs) -> anyhow::Result<()> {
    let mut catalog = Catalog::open(std::path::Path::new(&args.db)).context("open catalog")?;
    let kinds = match args.kind {
        Some(kind) => vec![kind],
        None => EntityKind::ALL.to_vec(),
    };

    for kind in kinds {
        let summary = heal_all(&mut catalog, kind).with_context(|| format!("dedupe {kind}"))?;
        tracing::info!(
            %kind,
            names = summary.names_healed,
            removed = summary.rows_removed,
            "dedupe finished"
        );
        println!(
            "{}",
            serde_json::to_string(&summary).context("serialize dedupe summary")?
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_creates_then_reuses() -> anyhow::Result<()> {
        let mut catalog = Catalog::open_in_memory()?;

        let first = resolve(&mut catalog, EntityKind::Author, "Jane Doe")?;
        let second = resolve(&mut catalog, EntityKind::Author, "Jane Doe")?;

        assert_eq!(first.id, second.id);
        assert_eq!(catalog.entities_named(EntityKind::Author, "Jane Doe")?.len(), 1);
        Ok(())
    }

    #[test]
    fn resolve_is_case_sensitive_and_per_kind() -> anyhow::Result<()> {
        let mut catalog = Catalog::open_in_memory()?;

        let author = resolve(&mut catalog, EntityKind::Author, "Jane Doe")?;
        let lower = resolve(&mut catalog, EntityKind::Author, "jane doe")?;
        let translator = resolve(&mut catalog, EntityKind::Translator, "Jane Doe")?;

        assert_ne!(author.id, lower.id);
        assert_eq!(translator.kind, EntityKind::Translator);
        assert_eq!(catalog.entities_named(EntityKind::Author, "Jane Doe")?.len(), 1);
        assert_eq!(
            catalog
                .entities_named(EntityKind::Translator, "Jane Doe")?
                .len(),
            1
        );
        Ok(())
    }

    #[test]
    fn resolve_rejects_empty_name() -> anyhow::Result<()> {
        let mut catalog = Catalog::open_in_memory()?;
        assert!(resolve(&mut catalog, EntityKind::Publisher, "").is_err());
        Ok(())
    }

    #[test]
    fn resolve_merges_many_to_many_duplicates() -> anyhow::Result<()> {
        let mut catalog = Catalog::open_in_memory()?;
        let dupes = [
            catalog.insert_entity(EntityKind::Author, "X")?,
            catalog.insert_entity(EntityKind::Author, "X")?,
            catalog.insert_entity(EntityKind::Author, "X")?,
        ];
        let mut books = Vec::new();
        for (idx, dupe) in dupes.iter().enumerate() {
            let book = catalog.insert_book(&format!("Book {idx}"), "")?;
            catalog.link(book.id, EntityKind::Author, dupe.id)?;
            books.push(book);
        }
        // One book already points at both the survivor and a loser.
        catalog.link(books[0].id, EntityKind::Author, dupes[2].id)?;

        let survivor = resolve(&mut catalog, EntityKind::Author, "X")?;

        assert_eq!(survivor.id, dupes[0].id);
        assert_eq!(
            catalog.entities_named(EntityKind::Author, "X")?,
            vec![survivor.clone()]
        );
        for book in &books {
            assert_eq!(
                catalog.linked(book.id, EntityKind::Author)?,
                vec![survivor.clone()]
            );
        }
        Ok(())
    }

    #[test]
    fn resolve_merges_many_to_one_duplicates() -> anyhow::Result<()> {
        let mut catalog = Catalog::open_in_memory()?;
        let keep = catalog.insert_entity(EntityKind::Publisher, "Pub")?;
        let lose = catalog.insert_entity(EntityKind::Publisher, "Pub")?;
        let other = catalog.insert_entity(EntityKind::Publisher, "Other")?;

        let mut a = catalog.insert_book("A", "")?;
        a.publisher_id = Some(lose.id);
        catalog.save_book(&a)?;
        let mut b = catalog.insert_book("B", "")?;
        b.publisher_id = Some(other.id);
        catalog.save_book(&b)?;

        let survivor = resolve(&mut catalog, EntityKind::Publisher, "Pub")?;

        assert_eq!(survivor.id, keep.id);
        assert_eq!(
            catalog.book(a.id)?.and_then(|book| book.publisher_id),
            Some(keep.id)
        );
        assert_eq!(
            catalog.book(b.id)?.and_then(|book| book.publisher_id),
            Some(other.id)
        );
        assert_eq!(catalog.entities_named(EntityKind::Publisher, "Pub")?.len(), 1);
        Ok(())
    }

    #[test]
    fn heal_all_reports_removed_rows() -> anyhow::Result<()> {
        let mut catalog = Catalog::open_in_memory()?;
        for name in ["A", "A", "A", "B", "B", "C"] {
            catalog.insert_entity(EntityKind::Size, name)?;
        }

        let summary = heal_all(&mut catalog, EntityKind::Size)?;

        assert_eq!(summary.names_healed, 2);
        assert_eq!(summary.rows_removed, 3);
        assert!(catalog.duplicate_names(EntityKind::Size)?.is_empty());
        Ok(())
    }
}
