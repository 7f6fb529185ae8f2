//! Parquet output of flushed batches.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use indicatif::HumanCount;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel};
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use thiserror::Error;
use tracing::{debug, info};

use crate::batch::BatchBuffer;
use crate::common::BatchIdx;
use crate::common::{RelationTable, changeset_data_dir, general_file_name, relation_file_name};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to assemble batch tables: {0}")]
    Arrow(#[from] ArrowError),

    #[error("failed to write {path}: {source}")]
    Parquet {
        path: PathBuf,
        #[source]
        source: ParquetError,
    },
}

/// Row counts of one written batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    pub batch: BatchIdx,
    /// Input lines consumed up to and including this batch.
    pub lines_processed: u64,
    pub general_rows: usize,
    /// Indexed by `RelationTable as usize`.
    pub relation_rows: [usize; 4],
}

/// Writes the general and relation tables of each batch into `changeset_data/`.
#[derive(Debug)]
pub struct ColumnarWriter {
    dir: PathBuf,
    props: WriterProperties,
}

impl ColumnarWriter {
    /// Create `<root>/changeset_data/` (if missing) and a writer targeting it.
    pub fn create(root: &Path) -> Result<Self, WriteError> {
        let dir = changeset_data_dir(root);
        fs::create_dir_all(&dir).map_err(|source| WriteError::Io {
            path: dir.clone(),
            source,
        })?;
        let props = WriterProperties::builder()
            .set_compression(Compression::GZIP(GzipLevel::default()))
            .build();
        Ok(Self { dir, props })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Drain the buffer's current batch and write its five tables, replacing
    /// any files of the same batch from an earlier run. `lines_processed` is
    /// the number of input lines consumed so far, for the log.
    pub fn write(
        &self,
        buffer: &mut BatchBuffer,
        lines_processed: u64,
    ) -> Result<FlushStats, WriteError> {
        let tables = buffer.drain_tables()?;
        self.write_table(&general_file_name(tables.batch), &tables.general)?;
        let mut relation_rows = [0; 4];
        for table in RelationTable::ALL {
            let relation = tables.relation(table);
            self.write_table(&relation_file_name(table, tables.batch), relation)?;
            relation_rows[table as usize] = relation.num_rows();
        }
        let stats = FlushStats {
            batch: tables.batch,
            lines_processed,
            general_rows: tables.general.num_rows(),
            relation_rows,
        };
        info!(
            "Wrote batch {} after {} lines ({} rows, {} imagery, {} hashtag, {} source, {} all_tags)",
            stats.batch.0,
            HumanCount(lines_processed),
            stats.general_rows,
            relation_rows[RelationTable::Imagery as usize],
            relation_rows[RelationTable::Hashtag as usize],
            relation_rows[RelationTable::Source as usize],
            relation_rows[RelationTable::AllTags as usize],
        );
        Ok(stats)
    }

    fn write_table(&self, file_name: &str, batch: &RecordBatch) -> Result<(), WriteError> {
        let path = self.dir.join(file_name);
        let parquet_err = |source: ParquetError| WriteError::Parquet {
            path: path.clone(),
            source,
        };
        let file = File::create(&path).map_err(|source| WriteError::Io {
            path: path.clone(),
            source,
        })?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(self.props.clone()))
            .map_err(parquet_err)?;
        writer.write(batch).map_err(parquet_err)?;
        writer.close().map_err(parquet_err)?;
        debug!("Wrote {} ({} rows)", path.display(), batch.num_rows());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{SeqIdx, general_schema, relation_schema};
    use crate::position::GridPos;
    use crate::record::{ChangesetRecord, TagFlags};
    use arrow::array::AsArray;
    use arrow::datatypes::UInt32Type;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn read_back(path: &Path) -> Vec<RecordBatch> {
        let file = File::open(path).unwrap();
        ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_write_batch_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ColumnarWriter::create(dir.path()).unwrap();
        assert!(writer.dir().ends_with("changeset_data"));

        let mut buffer = BatchBuffer::new(2);
        buffer.advance();
        buffer.push(&ChangesetRecord {
            seq: SeqIdx(3),
            year: 1,
            month: 2,
            edits: 5,
            user: 0,
            pos: GridPos { x: 10, y: 20 },
            created_by: 0,
            quest_type: u16::MAX,
            flags: TagFlags::default(),
            imagery: vec![0, 1],
            hashtags: Vec::new(),
            sources: Vec::new(),
            all_tags: vec![4],
        });
        let stats = writer.write(&mut buffer, 4).unwrap();
        assert_eq!(stats.batch, BatchIdx(1));
        assert_eq!(stats.lines_processed, 4);
        assert_eq!(stats.general_rows, 1);
        assert_eq!(stats.relation_rows, [2, 0, 0, 1]);
        assert!(buffer.is_empty());

        let general = read_back(&writer.dir().join("general_1.parquet"));
        assert_eq!(general.len(), 1);
        assert_eq!(general[0].schema().fields(), general_schema().fields());
        let seq = general[0].column(0).as_primitive::<UInt32Type>();
        assert_eq!(seq.values().to_vec(), vec![3]);

        let imagery = read_back(&writer.dir().join("imagery_1.parquet"));
        assert_eq!(
            imagery[0].schema().fields(),
            relation_schema(RelationTable::Imagery).fields()
        );
        let offsets = imagery[0].column(0).as_primitive::<UInt32Type>();
        assert_eq!(offsets.values().to_vec(), vec![1, 1]);

        // Empty relation tables are still written, with their schema.
        let path = writer.dir().join("hashtag_1.parquet");
        let file = File::open(&path).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert_eq!(
            builder.schema().fields(),
            relation_schema(RelationTable::Hashtag).fields()
        );
        assert_eq!(builder.metadata().file_metadata().num_rows(), 0);
    }
}
