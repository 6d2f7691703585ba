use super::Sink;
use crate::error::Result;
use crate::record::FetchRecord;
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

struct JsonInner {
    file: File,
    first: bool,
}

/// Writes records as a single JSON array. Interior locking keeps concurrent
/// workers from interleaving entries.
pub struct JsonSink {
    inner: Mutex<JsonInner>,
}

impl JsonSink {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        write!(file, "[")?;

        Ok(Self {
            inner: Mutex::new(JsonInner { file, first: true }),
        })
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, JsonInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Sink for JsonSink {
    async fn persist(&self, record: &FetchRecord) -> Result<()> {
        let mut inner = self.locked();
        if !inner.first {
            write!(inner.file, ",")?;
        } else {
            inner.first = false;
        }

        serde_json::to_writer(&mut inner.file, record)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.locked();
        write!(inner.file, "]")?;
        inner.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_a_valid_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let sink = JsonSink::new(path.clone()).unwrap();

        for url in ["http://a", "http://b"] {
            let record = FetchRecord::new(url.to_string(), 0.05, "body".to_string());
            sink.persist(&record).await.unwrap();
        }
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        let parsed: Vec<FetchRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].url, "http://a");
        assert_eq!(parsed[1].url, "http://b");
    }
}
