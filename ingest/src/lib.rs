use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod batch;
pub mod common;
pub mod interner;
pub mod parser;
pub mod pipeline;
pub mod position;
pub mod record;
pub mod rules;
pub mod time_index;
pub mod writer;
