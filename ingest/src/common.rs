//! Common types, constants and table schemas shared by the ingest pipeline
//! and by readers of the produced dataset.
//!
//! ## Output directory layout
//!
//! ```text
//! <output_dir>/
//!   years.txt                          — one "YYYY" per line, line k = year code k
//!   months.txt                         — one "YYYY-MM" per line, line k = month code k
//!   index_to_tag_<category>.txt        — one string per line, line k = code k
//!   changeset_data/
//!     general_<batch>.parquet          — one row per changeset
//!     imagery_<batch>.parquet          — one row per (changeset, imagery) occurrence
//!     hashtag_<batch>.parquet
//!     source_<batch>.parquet
//!     all_tags_<batch>.parquet
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

// ============================================================================
// Constants
// ============================================================================

/// Number of input lines (global sequence indices) owned by one batch.
pub const DEFAULT_BATCH_SIZE: u32 = 5_000_000;

/// Software-identifier code stored when a changeset has no `created_by` tag.
pub const CREATED_BY_UNSET: u32 = u32::MAX;

/// Quest-type code stored when a changeset carries no quest type.
pub const QUEST_TYPE_UNSET: u16 = u16::MAX;

pub const YEARS_FILE: &str = "years.txt";
pub const MONTHS_FILE: &str = "months.txt";
pub const CHANGESET_DATA_DIR: &str = "changeset_data";
pub const TABLE_EXTENSION: &str = "parquet";

/// Tag keys that are decoded into dedicated columns or relation tables and
/// therefore left out of the `all_tags` relation.
pub const TRACKED_TAGS: [&str; 11] = [
    "created_by",
    "comment",
    "imagery_used",
    "locale",
    "source",
    "host",
    "changesets_count",
    "hashtags",
    "StreetComplete",
    "version",
    "bot",
];

// ============================================================================
// Index NewTypes
// ============================================================================

/// Global sequence index of an input line (0-based line number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SeqIdx(pub u32);

/// Index of a flushed batch; also the `<batch>` suffix of the table files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BatchIdx(pub u32);

impl SeqIdx {
    /// The batch that owns this sequence index.
    pub fn batch(self, batch_size: u32) -> BatchIdx {
        BatchIdx(self.0 / batch_size)
    }

    /// Row offset of this sequence index inside its batch (`i mod B`).
    pub fn offset(self, batch_size: u32) -> u32 {
        self.0 % batch_size
    }
}

impl BatchIdx {
    /// First global sequence index owned by this batch.
    pub fn start(self, batch_size: u32) -> u64 {
        self.0 as u64 * batch_size as u64
    }
}

// ============================================================================
// Dictionary categories
// ============================================================================

/// One independent string dictionary per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Category {
    UserName = 0,
    CreatedBy = 1,
    QuestType = 2,
    Imagery = 3,
    Hashtag = 4,
    Source = 5,
    AllTags = 6,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::UserName,
        Category::CreatedBy,
        Category::QuestType,
        Category::Imagery,
        Category::Hashtag,
        Category::Source,
        Category::AllTags,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::UserName => "user_name",
            Category::CreatedBy => "created_by",
            Category::QuestType => "streetcomplete_quest_type",
            Category::Imagery => "imagery",
            Category::Hashtag => "hashtag",
            Category::Source => "source",
            Category::AllTags => "all_tags",
        }
    }

    /// `index_to_tag_<category>.txt`
    pub fn dictionary_file_name(self) -> String {
        format!("index_to_tag_{}.txt", self.name())
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// The four multi-valued relation tables written next to each general table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RelationTable {
    Imagery = 0,
    Hashtag = 1,
    Source = 2,
    AllTags = 3,
}

impl RelationTable {
    pub const ALL: [RelationTable; 4] = [
        RelationTable::Imagery,
        RelationTable::Hashtag,
        RelationTable::Source,
        RelationTable::AllTags,
    ];

    /// Table name, also the name of its value column.
    pub fn name(self) -> &'static str {
        self.category().name()
    }

    /// The dictionary the value column's codes point into.
    pub fn category(self) -> Category {
        match self {
            RelationTable::Imagery => Category::Imagery,
            RelationTable::Hashtag => Category::Hashtag,
            RelationTable::Source => Category::Source,
            RelationTable::AllTags => Category::AllTags,
        }
    }
}

// ============================================================================
// File naming
// ============================================================================

pub fn general_file_name(batch: BatchIdx) -> String {
    format!("general_{}.{TABLE_EXTENSION}", batch.0)
}

pub fn relation_file_name(table: RelationTable, batch: BatchIdx) -> String {
    format!("{}_{}.{TABLE_EXTENSION}", table.name(), batch.0)
}

pub fn changeset_data_dir(root: &Path) -> PathBuf {
    root.join(CHANGESET_DATA_DIR)
}

// ============================================================================
// Table schemas
// ============================================================================

pub mod columns {
    pub const CHANGESET_INDEX: &str = "changeset_index";
    pub const YEAR_INDEX: &str = "year_index";
    pub const MONTH_INDEX: &str = "month_index";
    pub const EDITS: &str = "edits";
    pub const USER_INDEX: &str = "user_index";
    pub const POS_X: &str = "pos_x";
    pub const POS_Y: &str = "pos_y";
    pub const CREATED_BY: &str = "created_by";
    pub const SC_QUEST_TYPE: &str = "sc_quest_type";
    pub const BOT: &str = "bot";
    pub const COMMENT: &str = "comment";
    pub const LOCALE: &str = "locale";
    pub const HOST: &str = "host";
    pub const CHANGESETS_COUNT: &str = "changesets_count";
    pub const VERSION: &str = "version";

    /// General-table columns copied into every relation table, in order,
    /// after the relation's own `changeset_index` column.
    pub const DENORMALIZED: [&str; 7] = [
        YEAR_INDEX, MONTH_INDEX, EDITS, USER_INDEX, POS_X, POS_Y, CREATED_BY,
    ];
}

/// Schema of `general_<batch>` tables.
///
/// `changeset_index` holds the global sequence index of the input line.
pub fn general_schema() -> SchemaRef {
    use columns::*;
    Arc::new(Schema::new(vec![
        Field::new(CHANGESET_INDEX, DataType::UInt32, false),
        Field::new(YEAR_INDEX, DataType::UInt8, false),
        Field::new(MONTH_INDEX, DataType::UInt16, false),
        Field::new(EDITS, DataType::UInt32, false),
        Field::new(USER_INDEX, DataType::UInt32, false),
        Field::new(POS_X, DataType::Int16, false),
        Field::new(POS_Y, DataType::Int16, false),
        Field::new(CREATED_BY, DataType::UInt32, false),
        Field::new(SC_QUEST_TYPE, DataType::UInt16, false),
        Field::new(BOT, DataType::Boolean, false),
        Field::new(COMMENT, DataType::Boolean, false),
        Field::new(LOCALE, DataType::Boolean, false),
        Field::new(HOST, DataType::Boolean, false),
        Field::new(CHANGESETS_COUNT, DataType::Boolean, false),
        Field::new(VERSION, DataType::Boolean, false),
    ]))
}

/// Schema of `<relation>_<batch>` tables.
///
/// `changeset_index` here is the batch-local row offset (`i mod B`), not the
/// global sequence index.
pub fn relation_schema(table: RelationTable) -> SchemaRef {
    let general = general_schema();
    let mut fields = Vec::with_capacity(columns::DENORMALIZED.len() + 2);
    fields.push(Field::new(columns::CHANGESET_INDEX, DataType::UInt32, false));
    for name in columns::DENORMALIZED {
        // DENORMALIZED only names general-table columns.
        if let Ok(field) = general.field_with_name(name) {
            fields.push(field.clone());
        }
    }
    fields.push(Field::new(table.name(), DataType::UInt32, false));
    Arc::new(Schema::new(fields))
}
