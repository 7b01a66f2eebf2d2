use super::RowSink;
use crate::pipeline::OutputRow;
use anyhow::Result;
use std::io::{BufWriter, Write};

/// One compact JSON object per line, no newline after the last one.
pub struct NdjsonSink<W: Write> {
    writer: BufWriter<W>,
    rows: u64,
}

impl<W: Write> NdjsonSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: BufWriter::new(inner),
            rows: 0,
        }
    }
}

impl<W: Write> RowSink for NdjsonSink<W> {
    fn add_row(&mut self, row: OutputRow) -> Result<()> {
        if self.rows > 0 {
            writeln!(self.writer)?;
        }
        serde_json::to_writer(&mut self.writer, &row)?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.rows
    }
}
