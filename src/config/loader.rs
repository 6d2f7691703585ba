use crate::config::schema::{AggregatorConfig, SinkConfig};
use crate::error::{Error, Result};
use crate::sink::{
    Sink, console::ConsoleSink, csv::CsvSink, json::JsonSink, sqlite::SqliteSink,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use validator::Validate;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AggregatorConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        let config: AggregatorConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => {
                return Err(Error::Config(format!(
                    "Unsupported file extension: {}",
                    path.display()
                )));
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub async fn build_sink(
        config: &AggregatorConfig,
        multi: Option<Arc<indicatif::MultiProgress>>,
    ) -> Result<Arc<dyn Sink>> {
        let sink: Arc<dyn Sink> = match &config.sink {
            Some(SinkConfig::Console) | None => Arc::new(ConsoleSink::new(multi)),
            Some(SinkConfig::Json { path }) => Arc::new(JsonSink::new(PathBuf::from(path))?),
            Some(SinkConfig::Csv { path }) => Arc::new(CsvSink::new(PathBuf::from(path))?),
            Some(SinkConfig::Sqlite { path, table }) => {
                Arc::new(SqliteSink::new(PathBuf::from(path), table.clone()).await?)
            }
        };
        Ok(sink)
    }
}
