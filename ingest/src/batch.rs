//! In-memory accumulation of one batch of records.
//!
//! Batch `b` owns the global sequence indices `[b * B, (b + 1) * B)`. Every
//! record in that range that was not skipped becomes one general row; its
//! multi-valued codes become relation entries pointing back at that row.
//!
//! Relation tables reference the general table by the batch-local offset
//! `i - b * B` (`i mod B`). When lines inside the batch were skipped, that
//! offset is not the general row's physical position, so relation entries
//! keep the position as well and the denormalized columns are gathered by it.

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Int16Array, UInt8Array, UInt16Array, UInt32Array};
use arrow::compute::take;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use crate::common::{BatchIdx, RelationTable, SeqIdx, columns, general_schema, relation_schema};
use crate::record::ChangesetRecord;

/// Single-valued columns, one entry per general row.
#[derive(Debug, Default)]
struct GeneralColumns {
    changeset_index: Vec<u32>,
    year_index: Vec<u8>,
    month_index: Vec<u16>,
    edits: Vec<u32>,
    user_index: Vec<u32>,
    pos_x: Vec<i16>,
    pos_y: Vec<i16>,
    created_by: Vec<u32>,
    sc_quest_type: Vec<u16>,
    bot: Vec<bool>,
    comment: Vec<bool>,
    locale: Vec<bool>,
    host: Vec<bool>,
    changesets_count: Vec<bool>,
    version: Vec<bool>,
}

impl GeneralColumns {
    fn with_capacity(rows: usize) -> Self {
        Self {
            changeset_index: Vec::with_capacity(rows),
            year_index: Vec::with_capacity(rows),
            month_index: Vec::with_capacity(rows),
            edits: Vec::with_capacity(rows),
            user_index: Vec::with_capacity(rows),
            pos_x: Vec::with_capacity(rows),
            pos_y: Vec::with_capacity(rows),
            created_by: Vec::with_capacity(rows),
            sc_quest_type: Vec::with_capacity(rows),
            bot: Vec::with_capacity(rows),
            comment: Vec::with_capacity(rows),
            locale: Vec::with_capacity(rows),
            host: Vec::with_capacity(rows),
            changesets_count: Vec::with_capacity(rows),
            version: Vec::with_capacity(rows),
        }
    }

    /// Move every column into an Arrow array, in `general_schema` order.
    /// Primitive columns hand their allocation to Arrow without copying.
    fn into_arrays(self) -> Vec<ArrayRef> {
        vec![
            Arc::new(UInt32Array::from(self.changeset_index)),
            Arc::new(UInt8Array::from(self.year_index)),
            Arc::new(UInt16Array::from(self.month_index)),
            Arc::new(UInt32Array::from(self.edits)),
            Arc::new(UInt32Array::from(self.user_index)),
            Arc::new(Int16Array::from(self.pos_x)),
            Arc::new(Int16Array::from(self.pos_y)),
            Arc::new(UInt32Array::from(self.created_by)),
            Arc::new(UInt16Array::from(self.sc_quest_type)),
            Arc::new(BooleanArray::from(self.bot)),
            Arc::new(BooleanArray::from(self.comment)),
            Arc::new(BooleanArray::from(self.locale)),
            Arc::new(BooleanArray::from(self.host)),
            Arc::new(BooleanArray::from(self.changesets_count)),
            Arc::new(BooleanArray::from(self.version)),
        ]
    }
}

/// `(general row position, value code)` pairs for one relation table.
#[derive(Debug, Default)]
struct RelationColumns {
    rows: Vec<u32>,
    values: Vec<u32>,
}

impl RelationColumns {
    fn with_capacity(rows: usize) -> Self {
        Self {
            rows: Vec::with_capacity(rows),
            values: Vec::with_capacity(rows),
        }
    }

    fn extend(&mut self, row: u32, codes: &[u32]) {
        for &code in codes {
            self.rows.push(row);
            self.values.push(code);
        }
    }
}

/// Arrow tables of one flushed batch.
#[derive(Debug, Clone)]
pub struct BatchTables {
    pub batch: BatchIdx,
    pub general: RecordBatch,
    /// Indexed by `RelationTable as usize`.
    pub relations: Vec<RecordBatch>,
}

impl BatchTables {
    pub fn relation(&self, table: RelationTable) -> &RecordBatch {
        &self.relations[table as usize]
    }
}

/// Column buffers for the batch currently being filled.
#[derive(Debug)]
pub struct BatchBuffer {
    batch: BatchIdx,
    capacity: u32,
    general: GeneralColumns,
    relations: [RelationColumns; 4],
    /// Sizes of the last drained batch, reserved again by `advance`.
    last_rows: usize,
    last_relation_rows: [usize; 4],
}

impl BatchBuffer {
    /// Buffer for batch 0 holding up to `capacity` sequence indices.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "batch capacity must be positive");
        Self {
            batch: BatchIdx(0),
            capacity,
            general: GeneralColumns::default(),
            relations: Default::default(),
            last_rows: 0,
            last_relation_rows: [0; 4],
        }
    }

    pub fn batch(&self) -> BatchIdx {
        self.batch
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Whether `seq` falls inside the current batch's range.
    pub fn owns(&self, seq: SeqIdx) -> bool {
        seq.batch(self.capacity) == self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.general.changeset_index.len()
    }

    pub fn num_relation_rows(&self, table: RelationTable) -> usize {
        self.relations[table as usize].rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Append one record. The record must belong to the current batch.
    pub fn push(&mut self, record: &ChangesetRecord) {
        debug_assert!(self.owns(record.seq), "record {:?} outside batch {:?}", record.seq, self.batch);
        let row = self.num_rows() as u32;
        let g = &mut self.general;
        g.changeset_index.push(record.seq.0);
        g.year_index.push(record.year);
        g.month_index.push(record.month);
        g.edits.push(record.edits);
        g.user_index.push(record.user);
        g.pos_x.push(record.pos.x);
        g.pos_y.push(record.pos.y);
        g.created_by.push(record.created_by);
        g.sc_quest_type.push(record.quest_type);
        g.bot.push(record.flags.bot);
        g.comment.push(record.flags.comment);
        g.locale.push(record.flags.locale);
        g.host.push(record.flags.host);
        g.changesets_count.push(record.flags.changesets_count);
        g.version.push(record.flags.version);

        self.relations[RelationTable::Imagery as usize].extend(row, &record.imagery);
        self.relations[RelationTable::Hashtag as usize].extend(row, &record.hashtags);
        self.relations[RelationTable::Source as usize].extend(row, &record.sources);
        self.relations[RelationTable::AllTags as usize].extend(row, &record.all_tags);
    }

    /// Drop anything left in the buffer and move on to the next batch, with
    /// room reserved for as many rows as the last drained batch held.
    pub fn advance(&mut self) {
        self.general = GeneralColumns::with_capacity(self.last_rows);
        for (relation, &rows) in self.relations.iter_mut().zip(&self.last_relation_rows) {
            *relation = RelationColumns::with_capacity(rows);
        }
        self.batch = BatchIdx(self.batch.0 + 1);
    }

    /// Move the buffered columns into the general table and the four
    /// relation tables. The buffer is left empty, still on the same batch.
    pub fn drain_tables(&mut self) -> Result<BatchTables, ArrowError> {
        let start = self.batch.start(self.capacity);
        let general_columns = std::mem::take(&mut self.general);
        let relations = std::mem::take(&mut self.relations);
        self.last_rows = general_columns.changeset_index.len();

        // Batch-local offsets need the global indices before they move into Arrow.
        let offsets: Vec<Vec<u32>> = relations
            .iter()
            .map(|relation| {
                relation
                    .rows
                    .iter()
                    .map(|&row| {
                        (general_columns.changeset_index[row as usize] as u64 - start) as u32
                    })
                    .collect()
            })
            .collect();

        let general = RecordBatch::try_new(general_schema(), general_columns.into_arrays())?;
        let mut tables = Vec::with_capacity(RelationTable::ALL.len());
        for ((table, relation), offsets) in RelationTable::ALL.into_iter().zip(relations).zip(offsets)
        {
            self.last_relation_rows[table as usize] = relation.rows.len();
            tables.push(relation_table(table, relation, offsets, &general)?);
        }

        Ok(BatchTables {
            batch: self.batch,
            general,
            relations: tables,
        })
    }
}

fn relation_table(
    table: RelationTable,
    relation: RelationColumns,
    offsets: Vec<u32>,
    general: &RecordBatch,
) -> Result<RecordBatch, ArrowError> {
    let positions = UInt32Array::from(relation.rows);

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns::DENORMALIZED.len() + 2);
    arrays.push(Arc::new(UInt32Array::from(offsets)));
    for name in columns::DENORMALIZED {
        let column = general.column_by_name(name).ok_or_else(|| {
            ArrowError::SchemaError(format!("general table has no column '{name}'"))
        })?;
        arrays.push(take(column.as_ref(), &positions, None)?);
    }
    arrays.push(Arc::new(UInt32Array::from(relation.values)));

    RecordBatch::try_new(relation_schema(table), arrays)
}
