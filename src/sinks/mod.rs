use anyhow::Result;

use crate::pipeline::OutputRow;

pub mod ndjson;

pub use self::ndjson::NdjsonSink;

pub trait RowSink {
    fn add_row(&mut self, row: OutputRow) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
    fn rows_written(&self) -> u64;
}
