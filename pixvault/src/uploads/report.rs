//! Incremental CSV encoding of the export report.

use crate::db::models::uploads::UploadExportRow;
use bytes::Bytes;
use chrono::SecondsFormat;

/// Header row, always emitted first
pub const HEADER: [&str; 4] = ["ID", "Name", "URL", "Uploaded at"];

/// Encodes rows into comma-separated chunks, one chunk per call.
pub struct CsvEncoder {
    writer: csv::Writer<Vec<u8>>,
}

impl Default for CsvEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvEncoder {
    pub fn new() -> Self {
        Self { writer: Self::writer() }
    }

    fn writer() -> csv::Writer<Vec<u8>> {
        csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new())
    }

    pub fn header(&mut self) -> Result<Bytes, csv::Error> {
        self.writer.write_record(HEADER)?;
        self.take()
    }

    /// Encode a batch in order; an empty batch yields an empty chunk.
    pub fn encode_batch(&mut self, rows: &[UploadExportRow]) -> Result<Bytes, csv::Error> {
        for row in rows {
            self.writer.write_field(row.id.to_string())?;
            self.writer.write_field(&row.name)?;
            self.writer.write_field(&row.remote_url)?;
            self.writer
                .write_field(row.created_at.to_rfc3339_opts(SecondsFormat::Millis, true))?;
            self.writer.write_record(None::<&[u8]>)?;
        }
        self.take()
    }

    /// Hand out everything written so far and continue on an empty buffer
    fn take(&mut self) -> Result<Bytes, csv::Error> {
        let writer = std::mem::replace(&mut self.writer, Self::writer());
        let buffer = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(Bytes::from(buffer))
    }
}
