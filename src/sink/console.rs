use super::Sink;
use crate::error::Result;
use crate::record::FetchRecord;
use async_trait::async_trait;
use indicatif::MultiProgress;
use std::sync::Arc;

/// Prints each record as pretty JSON, routed through the progress-bar manager
/// when one is active so output does not tear the bars.
pub struct ConsoleSink {
    multi: Option<Arc<MultiProgress>>,
}

impl ConsoleSink {
    pub fn new(multi: Option<Arc<MultiProgress>>) -> Self {
        Self { multi }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    async fn persist(&self, record: &FetchRecord) -> Result<()> {
        let output = serde_json::to_string_pretty(record)?;

        if let Some(multi) = &self.multi {
            for line in output.lines() {
                multi
                    .println(line)
                    .map_err(|e| crate::error::Error::Internal(e.to_string()))?;
            }
        } else {
            for line in output.lines() {
                println!("{}", line);
            }
        }
        Ok(())
    }
}
