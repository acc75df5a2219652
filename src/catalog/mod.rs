pub mod model;

use std::path::Path;

use anyhow::Context as _;
use rusqlite::{Connection, OptionalExtension as _, params};

pub use model::{Association, Book, Cover, EntityKind, NamedEntity};

use crate::cli::InitArgs;

const MIGRATION_INITIAL_SQL: &str = "
CREATE TABLE IF NOT EXISTS authors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS translators (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS publishers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sizes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS cover_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    isbn TEXT NOT NULL DEFAULT '',
    pages INTEGER,
    publisher_id INTEGER REFERENCES publishers(id) ON DELETE SET NULL,
    cover_type_id INTEGER REFERENCES cover_types(id) ON DELETE SET NULL,
    size_id INTEGER REFERENCES sizes(id) ON DELETE SET NULL,
    source TEXT NOT NULL DEFAULT '',
    source_link TEXT NOT NULL DEFAULT '',
    cover_name TEXT,
    cover BLOB,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS book_authors (
    book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
    PRIMARY KEY (book_id, author_id)
);
CREATE TABLE IF NOT EXISTS book_translators (
    book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    translator_id INTEGER NOT NULL REFERENCES translators(id) ON DELETE CASCADE,
    PRIMARY KEY (book_id, translator_id)
);
";

const MIGRATION_LOOKUP_INDEXES_SQL: &str = "
CREATE INDEX IF NOT EXISTS idx_books_source_link ON books(source_link);
CREATE INDEX IF NOT EXISTS idx_authors_name ON authors(name);
CREATE INDEX IF NOT EXISTS idx_translators_name ON translators(name);
CREATE INDEX IF NOT EXISTS idx_publishers_name ON publishers(name);
CREATE INDEX IF NOT EXISTS idx_sizes_name ON sizes(name);
CREATE INDEX IF NOT EXISTS idx_cover_types_name ON cover_types(name);
";

const BOOK_COLUMNS: &str = "id, title, isbn, pages, publisher_id, cover_type_id, size_id, \
     source, source_link, cover_name, cover";

/// SQLite-backed catalog of books and the named entities they reference.
///
/// Names are deliberately not unique in the schema; see [`crate::resolver`]
/// for how duplicates are merged.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create catalog dir: {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open catalog: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory catalog")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS schema_migrations (
                id TEXT PRIMARY KEY NOT NULL,
                applied_at INTEGER NOT NULL
             );",
        )
        .context("prepare schema_migrations")?;

        apply_migration(&conn, "0000_initial", MIGRATION_INITIAL_SQL)?;
        apply_migration(&conn, "0001_lookup_indexes", MIGRATION_LOOKUP_INDEXES_SQL)?;

        Ok(Self { conn })
    }

    pub fn transaction(&mut self) -> anyhow::Result<rusqlite::Transaction<'_>> {
        self.conn.transaction().context("begin catalog transaction")
    }

    pub fn insert_book(&self, title: &str, isbn: &str) -> anyhow::Result<Book> {
        let now = now_millis();
        self.conn
            .execute(
                "INSERT INTO books (title, isbn, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![title, isbn, now],
            )
            .with_context(|| format!("insert book: {title}"))?;

        Ok(Book {
            id: self.conn.last_insert_rowid(),
            title: title.to_owned(),
            isbn: isbn.to_owned(),
            ..Book::default()
        })
    }

    pub fn save_book(&self, book: &Book) -> anyhow::Result<()> {
        let (cover_name, cover_bytes) = match book.cover.as_ref() {
            Some(cover) => (Some(cover.file_name.as_str()), Some(cover.bytes.as_slice())),
            None => (None, None),
        };
        let updated = self
            .conn
            .execute(
                "UPDATE books SET title = ?1, isbn = ?2, pages = ?3, publisher_id = ?4, \
                 cover_type_id = ?5, size_id = ?6, source = ?7, source_link = ?8, \
                 cover_name = ?9, cover = ?10, updated_at = ?11 WHERE id = ?12",
                params![
                    book.title,
                    book.isbn,
                    book.pages,
                    book.publisher_id,
                    book.cover_type_id,
                    book.size_id,
                    book.source,
                    book.source_link,
                    cover_name,
                    cover_bytes,
                    now_millis(),
                    book.id,
                ],
            )
            .with_context(|| format!("save book {}", book.id))?;
        if updated == 0 {
            anyhow::bail!("book not found: {}", book.id);
        }
        Ok(())
    }

    pub fn book(&self, id: i64) -> anyhow::Result<Option<Book>> {
        self.conn
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
                params![id],
                book_from_row,
            )
            .optional()
            .with_context(|| format!("load book {id}"))
    }

    pub fn book_by_source_link(&self, source_link: &str) -> anyhow::Result<Option<Book>> {
        self.conn
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM books WHERE source_link = ?1 ORDER BY id LIMIT 1"),
                params![source_link],
                book_from_row,
            )
            .optional()
            .with_context(|| format!("load book by source link: {source_link}"))
    }

    pub fn has_source_link(&self, source_link: &str) -> anyhow::Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM books WHERE source_link = ?1 LIMIT 1",
                params![source_link],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("look up source link: {source_link}"))?;
        Ok(found.is_some())
    }

    pub fn count_books(&self) -> anyhow::Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))
            .context("count books")?;
        Ok(count.max(0) as u64)
    }

    /// Adds `entity_id` to the book's author or translator set.
    pub fn link(&self, book_id: i64, kind: EntityKind, entity_id: i64) -> anyhow::Result<()> {
        let Association::ManyToMany { table, column } = kind.association() else {
            anyhow::bail!("{kind} is a single reference on the book, not a set");
        };
        self.conn
            .execute(
                &format!("INSERT OR IGNORE INTO {table} (book_id, {column}) VALUES (?1, ?2)"),
                params![book_id, entity_id],
            )
            .with_context(|| format!("link {kind} {entity_id} to book {book_id}"))?;
        Ok(())
    }

    /// Entities of `kind` the book refers to, ordered by id.
    pub fn linked(&self, book_id: i64, kind: EntityKind) -> anyhow::Result<Vec<NamedEntity>> {
        let entity_table = kind.table();
        let sql = match kind.association() {
            Association::ManyToMany { table, column } => format!(
                "SELECT e.id, e.name FROM {entity_table} e \
                 JOIN {table} j ON j.{column} = e.id \
                 WHERE j.book_id = ?1 ORDER BY e.id"
            ),
            Association::ManyToOne { column } => format!(
                "SELECT e.id, e.name FROM {entity_table} e \
                 JOIN books b ON b.{column} = e.id \
                 WHERE b.id = ?1 ORDER BY e.id"
            ),
        };
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("prepare linked {kind} query"))?;
        let rows = stmt
            .query_map(params![book_id], |row| entity_from_row(row, kind))
            .with_context(|| format!("query linked {kind} for book {book_id}"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("read linked {kind} for book {book_id}"))
    }

    pub fn entities_named(&self, kind: EntityKind, name: &str) -> anyhow::Result<Vec<NamedEntity>> {
        find_by_name(&self.conn, kind, name)
    }

    pub fn insert_entity(&self, kind: EntityKind, name: &str) -> anyhow::Result<NamedEntity> {
        insert_entity(&self.conn, kind, name)
    }

    /// Names held by more than one row of `kind`, in first-seen order.
    pub fn duplicate_names(&self, kind: EntityKind) -> anyhow::Result<Vec<String>> {
        let table = kind.table();
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT name FROM {table} GROUP BY name HAVING COUNT(*) > 1 ORDER BY MIN(id)"
            ))
            .with_context(|| format!("prepare duplicate {kind} query"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .with_context(|| format!("query duplicate {kind} names"))?;
        rows.collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("read duplicate {kind} names"))
    }
}

pub fn init(args: InitArgs) -> anyhow::Result<()> {
    let path = Path::new(&args.db);
    let catalog = Catalog::open(path)?;
    tracing::info!(
        db = %path.display(),
        books = catalog.count_books()?,
        "catalog ready"
    );
    Ok(())
}

fn apply_migration(conn: &Connection, id: &str, sql: &str) -> anyhow::Result<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM schema_migrations WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("check migration {id}"))?;
    if existing.is_some() {
        return Ok(());
    }

    conn.execute_batch(sql)
        .with_context(|| format!("apply migration {id}"))?;
    conn.execute(
        "INSERT INTO schema_migrations (id, applied_at) VALUES (?1, ?2)",
        params![id, now_millis()],
    )
    .with_context(|| format!("record migration {id}"))?;
    tracing::debug!(migration = id, "applied catalog migration");
    Ok(())
}

/// All rows of `kind` whose name equals `name` exactly, oldest first.
pub(crate) fn find_by_name(
    conn: &Connection,
    kind: EntityKind,
    name: &str,
) -> anyhow::Result<Vec<NamedEntity>> {
    let table = kind.table();
    let mut stmt = conn
        .prepare(&format!("SELECT id, name FROM {table} WHERE name = ?1 ORDER BY id"))
        .with_context(|| format!("prepare {kind} lookup"))?;
    let rows = stmt
        .query_map(params![name], |row| entity_from_row(row, kind))
        .with_context(|| format!("look up {kind}: {name}"))?;
    rows.collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("read {kind} rows: {name}"))
}

pub(crate) fn insert_entity(
    conn: &Connection,
    kind: EntityKind,
    name: &str,
) -> anyhow::Result<NamedEntity> {
    let table = kind.table();
    conn.execute(
        &format!("INSERT INTO {table} (name) VALUES (?1)"),
        params![name],
    )
    .with_context(|| format!("insert {kind}: {name}"))?;
    Ok(NamedEntity {
        id: conn.last_insert_rowid(),
        kind,
        name: name.to_owned(),
    })
}

/// Points every book associated with `from` at `to` instead. Returns the
/// number of book associations moved.
pub(crate) fn reassign_books(
    conn: &Connection,
    kind: EntityKind,
    from: i64,
    to: i64,
) -> anyhow::Result<usize> {
    let now = now_millis();
    match kind.association() {
        Association::ManyToMany { table, column } => {
            conn.execute(
                &format!(
                    "UPDATE books SET updated_at = ?1 \
                     WHERE id IN (SELECT book_id FROM {table} WHERE {column} = ?2)"
                ),
                params![now, from],
            )
            .with_context(|| format!("touch books of {kind} {from}"))?;
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {table} (book_id, {column}) \
                     SELECT book_id, ?1 FROM {table} WHERE {column} = ?2"
                ),
                params![to, from],
            )
            .with_context(|| format!("copy {kind} associations {from} -> {to}"))?;
            let moved = conn
                .execute(
                    &format!("DELETE FROM {table} WHERE {column} = ?1"),
                    params![from],
                )
                .with_context(|| format!("drop {kind} associations of {from}"))?;
            Ok(moved)
        }
        Association::ManyToOne { column } => conn
            .execute(
                &format!("UPDATE books SET {column} = ?1, updated_at = ?2 WHERE {column} = ?3"),
                params![to, now, from],
            )
            .with_context(|| format!("repoint {kind} {from} -> {to}")),
    }
}

pub(crate) fn delete_entity(conn: &Connection, kind: EntityKind, id: i64) -> anyhow::Result<()> {
    let table = kind.table();
    conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])
        .with_context(|| format!("delete {kind} {id}"))?;
    Ok(())
}

fn entity_from_row(row: &rusqlite::Row<'_>, kind: EntityKind) -> rusqlite::Result<NamedEntity> {
    Ok(NamedEntity {
        id: row.get(0)?,
        kind,
        name: row.get(1)?,
    })
}

fn book_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
    let cover_name: Option<String> = row.get(9)?;
    let cover_bytes: Option<Vec<u8>> = row.get(10)?;
    let cover = match (cover_name, cover_bytes) {
        (Some(file_name), Some(bytes)) => Some(Cover { file_name, bytes }),
        _ => None,
    };
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        isbn: row.get(2)?,
        pages: row.get(3)?,
        publisher_id: row.get(4)?,
        cover_type_id: row.get(5)?,
        size_id: row.get(6)?,
        source: row.get(7)?,
        source_link: row.get(8)?,
        cover,
    })
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("nested").join("catalog.sqlite3");

        let catalog = Catalog::open(&path)?;
        catalog.insert_book("First", "")?;
        drop(catalog);

        let catalog = Catalog::open(&path)?;
        assert_eq!(catalog.count_books()?, 1);
        Ok(())
    }

    #[test]
    fn save_book_round_trips_scalar_fields() -> anyhow::Result<()> {
        let catalog = Catalog::open_in_memory()?;
        let publisher = catalog.insert_entity(EntityKind::Publisher, "Pub")?;

        let mut book = catalog.insert_book("Title", "9780000000000")?;
        book.pages = Some(320);
        book.publisher_id = Some(publisher.id);
        book.source = "30book".to_owned();
        book.source_link = "http://example.com/book/1/".to_owned();
        book.cover = Some(Cover {
            file_name: "1.jpg".to_owned(),
            bytes: vec![0xff, 0xd8, 0xff],
        });
        catalog.save_book(&book)?;

        let loaded = catalog.book(book.id)?.expect("book exists");
        assert_eq!(loaded, book);
        assert!(catalog.has_source_link("http://example.com/book/1/")?);
        assert!(!catalog.has_source_link("http://example.com/book/2/")?);
        assert_eq!(
            catalog.linked(book.id, EntityKind::Publisher)?,
            vec![publisher]
        );
        Ok(())
    }

    #[test]
    fn link_keeps_set_semantics() -> anyhow::Result<()> {
        let catalog = Catalog::open_in_memory()?;
        let book = catalog.insert_book("Title", "")?;
        let author = catalog.insert_entity(EntityKind::Author, "A")?;

        catalog.link(book.id, EntityKind::Author, author.id)?;
        catalog.link(book.id, EntityKind::Author, author.id)?;

        assert_eq!(catalog.linked(book.id, EntityKind::Author)?.len(), 1);
        Ok(())
    }

    #[test]
    fn link_rejects_single_reference_kinds() -> anyhow::Result<()> {
        let catalog = Catalog::open_in_memory()?;
        let book = catalog.insert_book("Title", "")?;
        let size = catalog.insert_entity(EntityKind::Size, "Pocket")?;

        let err = catalog
            .link(book.id, EntityKind::Size, size.id)
            .unwrap_err()
            .to_string();
        assert!(err.contains("single reference"));
        Ok(())
    }
}
