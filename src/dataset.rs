//! Read access to a dataset written by the `preprocess` binary.
//!
//! [`Dataset::load`] reads the small text files eagerly (time index and all
//! dictionaries) and discovers the batch files; tables are read from Parquet
//! on demand, one batch at a time.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::array::{Array, ArrowPrimitiveType, AsArray, PrimitiveArray};
use arrow::compute::concat_batches;
use arrow::datatypes::{UInt8Type, UInt32Type};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::errors::ParquetError;
use thiserror::Error;
use tracing::debug;

use osmstats_ingest::common::{
    BatchIdx, CREATED_BY_UNSET, Category, RelationTable, TABLE_EXTENSION, changeset_data_dir,
    columns, general_file_name, relation_file_name,
};
use osmstats_ingest::time_index::{TimeIndex, read_lines};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Parquet {
        path: PathBuf,
        #[source]
        source: ParquetError,
    },

    #[error(transparent)]
    Arrow(#[from] ArrowError),

    #[error("column '{column}' missing or not of the expected type")]
    Column { column: &'static str },

    #[error("no batch {0} in dataset")]
    NoSuchBatch(u32),

    #[error("batch {batch} has no {path}")]
    MissingTable { batch: u32, path: PathBuf },
}

/// A loaded dataset directory.
#[derive(Debug)]
pub struct Dataset {
    dir: PathBuf,
    time_index: TimeIndex,
    /// Indexed by `Category as usize`; position = code.
    dictionaries: Vec<Vec<String>>,
    batches: Vec<BatchIdx>,
}

impl Dataset {
    pub fn load(dir: &Path) -> Result<Self, DatasetError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| DatasetError::Io { path, source }
        };

        let time_index = TimeIndex::read(dir).map_err(io_err(dir))?;

        let mut dictionaries = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            let path = dir.join(category.dictionary_file_name());
            dictionaries.push(read_lines(&path).map_err(io_err(&path))?);
        }

        let data_dir = changeset_data_dir(dir);
        let mut batches = Vec::new();
        for entry in fs::read_dir(&data_dir).map_err(io_err(&data_dir))? {
            let entry = entry.map_err(io_err(&data_dir))?;
            if let Some(batch) = entry.file_name().to_str().and_then(parse_general_file_name) {
                batches.push(batch);
            }
        }
        batches.sort_unstable();
        for &batch in &batches {
            for table in RelationTable::ALL {
                let path = data_dir.join(relation_file_name(table, batch));
                if !path.is_file() {
                    return Err(DatasetError::MissingTable {
                        batch: batch.0,
                        path,
                    });
                }
            }
        }

        debug!(
            "Loaded {} with {} batches, {} months",
            dir.display(),
            batches.len(),
            time_index.months().len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            time_index,
            dictionaries,
            batches,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn time_index(&self) -> &TimeIndex {
        &self.time_index
    }

    pub fn batches(&self) -> &[BatchIdx] {
        &self.batches
    }

    /// All values of one dictionary, in code order.
    pub fn dictionary(&self, category: Category) -> &[String] {
        &self.dictionaries[category as usize]
    }

    /// String behind `code`, or `None` for sentinels and unknown codes.
    pub fn decode(&self, category: Category, code: u32) -> Option<&str> {
        self.dictionary(category)
            .get(code as usize)
            .map(String::as_str)
    }

    pub fn read_general(&self, batch: BatchIdx) -> Result<RecordBatch, DatasetError> {
        self.read_table(batch, &general_file_name(batch))
    }

    pub fn read_relation(
        &self,
        table: RelationTable,
        batch: BatchIdx,
    ) -> Result<RecordBatch, DatasetError> {
        self.read_table(batch, &relation_file_name(table, batch))
    }

    fn read_table(&self, batch: BatchIdx, file_name: &str) -> Result<RecordBatch, DatasetError> {
        if self.batches.binary_search(&batch).is_err() {
            return Err(DatasetError::NoSuchBatch(batch.0));
        }
        let path = changeset_data_dir(&self.dir).join(file_name);
        let parquet_err = |source: ParquetError| DatasetError::Parquet {
            path: path.clone(),
            source,
        };
        let file = File::open(&path).map_err(|source| DatasetError::Io {
            path: path.clone(),
            source,
        })?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(parquet_err)?;
        let schema = builder.schema().clone();
        let batches = builder
            .build()
            .map_err(parquet_err)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(concat_batches(&schema, &batches)?)
    }

    /// Walk every batch once and aggregate the figures shown by `inspect`.
    pub fn summarize(&self) -> Result<DatasetSummary, DatasetError> {
        let mut summary = DatasetSummary::default();
        for &batch in &self.batches {
            let general = self.read_general(batch)?;
            summary.general_rows += general.num_rows() as u64;

            let years = primitive_column::<UInt8Type>(&general, columns::YEAR_INDEX)?;
            let edits = primitive_column::<UInt32Type>(&general, columns::EDITS)?;
            for (year, edits) in years.values().iter().zip(edits.values().iter()) {
                let label = self
                    .time_index
                    .years()
                    .get(*year as usize)
                    .cloned()
                    .unwrap_or_else(|| format!("#{year}"));
                *summary.edits_per_year.entry(label).or_default() += *edits as u64;
            }

            let created_by = primitive_column::<UInt32Type>(&general, columns::CREATED_BY)?;
            for &code in created_by.values().iter() {
                if code != CREATED_BY_UNSET {
                    *summary.created_by_counts.entry(code).or_default() += 1;
                }
            }

            for table in RelationTable::ALL {
                let relation = self.read_relation(table, batch)?;
                summary.relation_rows[table as usize] += relation.num_rows() as u64;
            }
        }
        Ok(summary)
    }

    /// The `n` most frequent software names, most frequent first; ties are
    /// broken by code (first seen first).
    pub fn top_created_by<'a>(
        &'a self,
        summary: &DatasetSummary,
        n: usize,
    ) -> Vec<(&'a str, u64)> {
        let mut counts: Vec<(u32, u64)> =
            summary.created_by_counts.iter().map(|(&c, &n)| (c, n)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        counts
            .into_iter()
            .take(n)
            .map(|(code, count)| (self.decode(Category::CreatedBy, code).unwrap_or("?"), count))
            .collect()
    }
}

/// Aggregates over all batches of a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetSummary {
    pub general_rows: u64,
    /// Indexed by `RelationTable as usize`.
    pub relation_rows: [u64; 4],
    /// Year label → total edits.
    pub edits_per_year: BTreeMap<String, u64>,
    /// `created_by` code → number of changesets.
    pub created_by_counts: BTreeMap<u32, u64>,
}

/// `general_<n>.parquet` → `n`
fn parse_general_file_name(name: &str) -> Option<BatchIdx> {
    let stem = name.strip_suffix(TABLE_EXTENSION)?.strip_suffix('.')?;
    stem.strip_prefix("general_")?.parse().ok().map(BatchIdx)
}

fn primitive_column<'a, T: ArrowPrimitiveType>(
    batch: &'a RecordBatch,
    column: &'static str,
) -> Result<&'a PrimitiveArray<T>, DatasetError> {
    batch
        .column_by_name(column)
        .filter(|array| array.null_count() == 0)
        .and_then(|array| array.as_primitive_opt::<T>())
        .ok_or(DatasetError::Column { column })
}
