//! Inspect a preprocessed changeset dataset: time range, batches, table
//! sizes, dictionaries, edits per year and the most used software.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin inspect -- --data-dir data
//! cargo run --release --bin inspect -- --data-dir data --top 25
//! ```

use std::path::PathBuf;

use clap::Parser;
use indicatif::HumanCount;
use osmstats::common::{Category, RelationTable};
use osmstats::dataset::Dataset;

#[derive(Parser, Debug)]
#[command(about = "Inspect a preprocessed changeset dataset")]
struct Args {
    /// Directory written by `preprocess`.
    #[arg(long)]
    data_dir: PathBuf,

    /// Number of software identifiers to list.
    #[arg(long, default_value_t = 10)]
    top: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();
    let ds = Dataset::load(&args.data_dir)?;
    let summary = ds.summarize()?;
    let months = ds.time_index().months();

    // ── Overview ──────────────────────────────────────────────────────────
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Dataset: {}", ds.dir().display());
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  Months:     {:>10}  ({} .. {})",
        months.len(),
        months.first().map_or("-", String::as_str),
        months.last().map_or("-", String::as_str)
    );
    println!("║  Batches:    {:>10}", ds.batches().len());
    println!("║  Changesets: {:>10}", HumanCount(summary.general_rows).to_string());
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // ── Tables ────────────────────────────────────────────────────────────
    println!("┌─ Relation tables");
    for table in RelationTable::ALL {
        let rows = summary.relation_rows[table as usize];
        println!("│  {:<12} {:>14} rows", table.name(), HumanCount(rows).to_string());
    }
    println!("└──────────────────────────────────────────────────────────────");
    println!();

    // ── Dictionaries ──────────────────────────────────────────────────────
    println!("┌─ Dictionaries");
    for category in Category::ALL {
        let size = ds.dictionary(category).len() as u64;
        println!("│  {:<27} {:>12} values", category.name(), HumanCount(size).to_string());
    }
    println!("└──────────────────────────────────────────────────────────────");
    println!();

    // ── Edits per year ────────────────────────────────────────────────────
    println!("┌─ Edits per year");
    let max_edits = summary.edits_per_year.values().copied().max().unwrap_or(0);
    for (year, edits) in &summary.edits_per_year {
        let bar_len = if max_edits > 0 {
            (*edits as f64 / max_edits as f64 * 40.0).round() as usize
        } else {
            0
        };
        println!(
            "│  {year:<6} {:>16}  {}",
            HumanCount(*edits).to_string(),
            "█".repeat(bar_len)
        );
    }
    println!("└──────────────────────────────────────────────────────────────");
    println!();

    // ── Software ──────────────────────────────────────────────────────────
    println!("┌─ Top {} software by changesets", args.top);
    for (rank, (name, count)) in ds.top_created_by(&summary, args.top).iter().enumerate() {
        let share = if summary.general_rows > 0 {
            *count as f64 / summary.general_rows as f64 * 100.0
        } else {
            0.0
        };
        println!(
            "│  {:>3}. {:<32} {:>14} ({share:5.1}%)",
            rank + 1,
            name,
            HumanCount(*count).to_string()
        );
    }
    println!("└──────────────────────────────────────────────────────────────");

    Ok(())
}
