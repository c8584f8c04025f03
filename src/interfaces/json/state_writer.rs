use crate::error::{FelError, Result};
use serde::Serialize;
use std::io::Write;

/// Writes results as pretty-printed JSON documents, one per call.
///
/// Used by the CLI to print the final `ProcessingState` or an updated invoice.
pub struct StateWriter<W: Write> {
    writer: W,
}

impl<W: Write> StateWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write<T: Serialize>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, value)
            .map_err(|e| FelError::Encode(e.to_string()))?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
