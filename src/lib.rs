pub mod dataset;

pub use osmstats_ingest::common;
