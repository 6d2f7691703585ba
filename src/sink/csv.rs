use super::Sink;
use crate::error::Result;
use crate::record::FetchRecord;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;

/// Appends one CSV row per record; headers come from the record's field names
/// on the first write.
pub struct CsvSink {
    writer: Mutex<csv::Writer<std::fs::File>>,
}

impl CsvSink {
    pub fn new(path: PathBuf) -> Result<Self> {
        let writer = csv::Writer::from_path(path)
            .map_err(|e| crate::error::Error::Internal(e.to_string()))?;

        Ok(Self {
            writer: Mutex::new(writer),
        })
    }
}

#[async_trait]
impl Sink for CsvSink {
    async fn persist(&self, record: &FetchRecord) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer
            .serialize(record)
            .map_err(|e| crate::error::Error::Internal(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer
            .flush()
            .map_err(|e| crate::error::Error::Internal(e.to_string()))?;
        Ok(())
    }
}
