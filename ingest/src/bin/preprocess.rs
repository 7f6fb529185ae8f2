//! Preprocessor binary: turns a stream of changeset lines into the
//! dictionary-encoded columnar dataset read by `osmstats`.
//!
//! ## Input
//!
//! Changeset lines on standard input, one per line, in the upstream
//! `c<id> k<edits> s<created_at> ... T<tags>` format.
//!
//! ## Output
//!
//! Written under `<output_dir>`:
//! - `years.txt`, `months.txt`               — time index, line k = code k
//! - `index_to_tag_<category>.txt`           — one dictionary per category
//! - `changeset_data/general_<b>.parquet`    — one row per changeset
//! - `changeset_data/<relation>_<b>.parquet` — imagery, hashtag, source, all_tags
//!
//! ## Usage
//!
//! ```sh
//! bzcat changesets.opl.bz2 | cargo run --release --bin preprocess -- data/
//! ```

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use indicatif::{HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use tracing::info;

use osmstats_ingest::common::DEFAULT_BATCH_SIZE;
use osmstats_ingest::pipeline::{IngestConfig, Pipeline};

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug)]
#[command(about = "Encode changeset lines from stdin into a columnar dataset")]
struct Args {
    /// Directory receiving the dictionaries, the time index and `changeset_data/`.
    output_dir: PathBuf,

    /// Rule file normalizing `created_by` values.
    #[arg(long, default_value = "rules/replace_rules_created_by.json")]
    created_by_rules: PathBuf,

    /// Rule file normalizing `imagery_used` and `source` values.
    #[arg(long, default_value = "rules/replace_rules_imagery_and_source.json")]
    imagery_rules: PathBuf,

    /// Input lines per output batch.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
    batch_size: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    info!("Output:           {}", args.output_dir.display());
    info!("created_by rules: {}", args.created_by_rules.display());
    info!("imagery rules:    {}", args.imagery_rules.display());
    info!("Batch size:       {}", HumanCount(args.batch_size as u64));

    let config = IngestConfig {
        output_dir: args.output_dir,
        created_by_rules: args.created_by_rules,
        imagery_rules: args.imagery_rules,
        batch_size: args.batch_size,
    };

    let start = Instant::now();
    let mut pipeline = Pipeline::from_config(&config)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template(
        "  {spinner} {human_pos} lines [{elapsed_precise}, {per_sec}]",
    )?);
    spinner.enable_steady_tick(Duration::from_millis(200));

    let stdin = io::stdin();
    let result = pipeline.run(stdin.lock(), Some(&spinner));
    spinner.finish_and_clear();
    result?;

    let summary = pipeline.finish()?;

    info!("Done in {}", HumanDuration(start.elapsed()));
    info!("  Lines:             {}", HumanCount(summary.lines));
    info!("  Rows written:      {}", HumanCount(summary.rows_written));
    info!("  Skipped (month):   {}", HumanCount(summary.structural_skips));
    info!("  Malformed:         {}", HumanCount(summary.malformed));
    info!("  Batches:           {}", summary.batches_written);
    for (category, size) in &summary.dictionary_sizes {
        info!("  {:<27} {} codes", category.name(), HumanCount(*size as u64));
    }

    Ok(())
}
