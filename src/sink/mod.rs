use crate::error::Result;
use crate::record::FetchRecord;
use async_trait::async_trait;

pub mod console;
pub mod csv;
pub mod json;
pub mod sqlite;

/// Durable destination for processed records. Implementations must be safe to
/// call from several consumer workers at once; durability (fsync, journaling)
/// is the sink's own concern, the pipeline does not retry persists.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn persist(&self, record: &FetchRecord) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
