use serde::{Deserialize, Serialize};

/// The kinds of name-keyed rows a book refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Author,
    Translator,
    Publisher,
    Size,
    CoverType,
}

/// How books point at an entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// Join table `(book_id, <column>)` with set semantics.
    ManyToMany {
        table: &'static str,
        column: &'static str,
    },
    /// Nullable foreign-key column on `books`.
    ManyToOne { column: &'static str },
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Author,
        EntityKind::Translator,
        EntityKind::Publisher,
        EntityKind::Size,
        EntityKind::CoverType,
    ];

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Author => "authors",
            EntityKind::Translator => "translators",
            EntityKind::Publisher => "publishers",
            EntityKind::Size => "sizes",
            EntityKind::CoverType => "cover_types",
        }
    }

    pub fn association(self) -> Association {
        match self {
            EntityKind::Author => Association::ManyToMany {
                table: "book_authors",
                column: "author_id",
            },
            EntityKind::Translator => Association::ManyToMany {
                table: "book_translators",
                column: "translator_id",
            },
            EntityKind::Publisher => Association::ManyToOne {
                column: "publisher_id",
            },
            EntityKind::Size => Association::ManyToOne { column: "size_id" },
            EntityKind::CoverType => Association::ManyToOne {
                column: "cover_type_id",
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Author => "author",
            EntityKind::Translator => "translator",
            EntityKind::Publisher => "publisher",
            EntityKind::Size => "size",
            EntityKind::CoverType => "cover_type",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub id: i64,
    pub kind: EntityKind,
    pub name: String,
}

/// Scalar and many-to-one state of a catalog book. Author/translator sets
/// live in join tables and are managed through [`super::Catalog::link`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub isbn: String,
    pub pages: Option<i64>,
    pub publisher_id: Option<i64>,
    pub cover_type_id: Option<i64>,
    pub size_id: Option<i64>,
    pub source: String,
    pub source_link: String,
    pub cover: Option<Cover>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    pub file_name: String,
    pub bytes: Vec<u8>,
}
