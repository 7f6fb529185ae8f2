//! Single-pass ingestion driver.
//!
//! Lines are consumed strictly in input order. Line `i` (0-based) owns
//! sequence index `i` whether or not it produces a row, so batch boundaries
//! and relation offsets depend only on line positions:
//!
//! 1. when line `i > 0` starts a new batch (`i mod B == 0`) the current batch
//!    is written and the buffers are reset;
//! 2. the line is parsed; a malformed line is logged and skipped;
//! 3. a line whose month has no code is skipped without touching any
//!    dictionary;
//! 4. otherwise the record is encoded and appended to the current batch.
//!
//! [`Pipeline::finish`] writes the last batch (batch 0 for empty input) and
//! then the dictionaries.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use thiserror::Error;
use tracing::{debug, warn};

use crate::batch::BatchBuffer;
use crate::common::{Category, DEFAULT_BATCH_SIZE, SeqIdx};
use crate::interner::{CodeSpaceExhausted, Dictionaries};
use crate::parser::{LineError, parse_line};
use crate::record::{RecordEncoder, truncate_chars};
use crate::rules::{NormalizationRules, RulesError};
use crate::time_index::TimeIndex;
use crate::writer::{ColumnarWriter, FlushStats, WriteError};

/// Malformed lines are quoted in logs up to this many characters.
const LOGGED_LINE_CHARS: usize = 200;

/// Progress is refreshed every this many lines.
const PROGRESS_INTERVAL: u64 = 10_000;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("failed to read input: {0}")]
    Input(#[source] io::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    CodeSpace(#[from] CodeSpaceExhausted),

    #[error("input has more than {} lines", u32::MAX as u64 + 1)]
    TooManyLines,
}

/// Everything needed to start a run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub output_dir: PathBuf,
    pub created_by_rules: PathBuf,
    pub imagery_rules: PathBuf,
    pub batch_size: u32,
}

impl IngestConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            created_by_rules: PathBuf::from("rules/replace_rules_created_by.json"),
            imagery_rules: PathBuf::from("rules/replace_rules_imagery_and_source.json"),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// What happened to one input line.
#[derive(Debug, PartialEq)]
pub enum LineOutcome {
    Written,
    /// Month outside the time index.
    Skipped,
    Malformed(LineError),
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub lines: u64,
    pub rows_written: u64,
    pub structural_skips: u64,
    pub malformed: u64,
    pub batches_written: u32,
    /// One entry per written batch, in batch order.
    pub flushes: Vec<FlushStats>,
    pub dictionary_sizes: Vec<(Category, usize)>,
}

pub struct Pipeline {
    output_dir: PathBuf,
    time_index: TimeIndex,
    rules: NormalizationRules,
    dicts: Dictionaries,
    buffer: BatchBuffer,
    writer: ColumnarWriter,
    summary: RunSummary,
}

impl Pipeline {
    /// Load the rule files named by `config` and prepare a run whose time
    /// index ends before the current month.
    pub fn from_config(config: &IngestConfig) -> Result<Self, IngestError> {
        let rules = NormalizationRules::load(&config.created_by_rules, &config.imagery_rules)?;
        Self::new(&config.output_dir, config.batch_size, TimeIndex::now(), rules)
    }

    /// Create the output directories and write the time index files.
    pub fn new(
        output_dir: &Path,
        batch_size: u32,
        time_index: TimeIndex,
        rules: NormalizationRules,
    ) -> Result<Self, IngestError> {
        if batch_size == 0 {
            return Err(IngestError::InvalidBatchSize);
        }
        let writer = ColumnarWriter::create(output_dir)?;
        time_index.write(output_dir).map_err(|source| IngestError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;
        debug!(
            "Time index: {} years, {} months",
            time_index.years().len(),
            time_index.months().len()
        );
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            time_index,
            rules,
            dicts: Dictionaries::new(),
            buffer: BatchBuffer::new(batch_size),
            writer,
            summary: RunSummary::default(),
        })
    }

    pub fn dictionaries(&self) -> &Dictionaries {
        &self.dicts
    }

    /// Handle the next input line (without its terminator).
    pub fn process_line(&mut self, line: &str) -> Result<LineOutcome, IngestError> {
        let seq = self.next_seq()?;
        while !self.buffer.owns(seq) {
            // Lines before `seq` are done; `seq` itself starts the next batch.
            self.flush(seq.0 as u64)?;
        }

        let raw = match parse_line(line) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Skipping malformed line {}: {e} ({:?})",
                    seq.0,
                    truncate_chars(line, LOGGED_LINE_CHARS)
                );
                self.summary.malformed += 1;
                return Ok(LineOutcome::Malformed(e));
            }
        };

        let encoder = RecordEncoder::new(&self.time_index, &self.rules);
        match encoder.encode(seq, &raw, &mut self.dicts)? {
            Some(record) => {
                self.buffer.push(&record);
                self.summary.rows_written += 1;
                Ok(LineOutcome::Written)
            }
            None => {
                self.summary.structural_skips += 1;
                Ok(LineOutcome::Skipped)
            }
        }
    }

    /// Consume `reader` line by line. Invalid UTF-8 is replaced, `\n` and
    /// `\r\n` terminators are removed.
    pub fn run<R: BufRead>(
        &mut self,
        mut reader: R,
        progress: Option<&ProgressBar>,
    ) -> Result<(), IngestError> {
        let mut buf = Vec::with_capacity(4096);
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).map_err(IngestError::Input)? == 0 {
                break;
            }
            let text = String::from_utf8_lossy(&buf);
            let line = text.strip_suffix('\n').unwrap_or(&text);
            let line = line.strip_suffix('\r').unwrap_or(line);
            self.process_line(line)?;

            if let Some(pb) = progress {
                if self.summary.lines % PROGRESS_INTERVAL == 0 {
                    pb.set_position(self.summary.lines);
                }
            }
        }
        if let Some(pb) = progress {
            pb.set_position(self.summary.lines);
        }
        Ok(())
    }

    /// Write the last batch and every dictionary.
    pub fn finish(mut self) -> Result<RunSummary, IngestError> {
        self.flush(self.summary.lines)?;

        let paths = self
            .dicts
            .save_all(&self.output_dir)
            .map_err(|source| IngestError::Io {
                path: self.output_dir.clone(),
                source,
            })?;
        debug!("Wrote {} dictionaries", paths.len());

        self.summary.dictionary_sizes = self.dicts.sizes();
        Ok(self.summary)
    }

    fn next_seq(&mut self) -> Result<SeqIdx, IngestError> {
        let seq = u32::try_from(self.summary.lines).map_err(|_| IngestError::TooManyLines)?;
        self.summary.lines += 1;
        Ok(SeqIdx(seq))
    }

    fn flush(&mut self, lines_processed: u64) -> Result<(), IngestError> {
        let stats = self.writer.write(&mut self.buffer, lines_processed)?;
        self.summary.flushes.push(stats);
        self.summary.batches_written += 1;
        self.buffer.advance();
        Ok(())
    }
}
