//! FileSink - appends records to per-session NDJSON files

use contracts::{ContractError, OutgoingRecord, TelemetrySink};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self { base_path }
    }
}

/// Sink that writes one NDJSON line per record to
/// `<base_path>/<partition_key>.ndjson`
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    lines_written: u64,
}

impl FileSink {
    /// Create a new FileSink
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            lines_written: 0,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, config)
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// File that receives records for `partition_key`
    pub fn path_for(&self, partition_key: &str) -> PathBuf {
        self.config
            .base_path
            .join(format!("{}.ndjson", file_stem(partition_key)))
    }

    /// Lines appended since creation
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    fn append_records(&self, path: &Path, records: &[OutgoingRecord]) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(&mut writer, record)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer.get_ref().sync_data()
    }
}

/// Keep partition keys from escaping the output directory
fn file_stem(partition_key: &str) -> String {
    let stem: String = partition_key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match stem.trim_matches('.') {
        "" => "_".to_string(),
        _ => stem,
    }
}

impl TelemetrySink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_send",
        skip(self, records),
        fields(sink = %self.name, records = records.len())
    )]
    async fn send(
        &mut self,
        records: &[OutgoingRecord],
        partition_key: &str,
    ) -> Result<(), ContractError> {
        if records.is_empty() {
            return Ok(());
        }

        let path = self.path_for(partition_key);
        self.append_records(&path, records).map_err(|e| {
            error!(sink = %self.name, path = %path.display(), error = %e, "Failed to append records");
            ContractError::sink_write(&self.name, e.to_string())
        })?;

        self.lines_written += records.len() as u64;
        debug!(path = %path.display(), lines = records.len(), "Records appended");
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, lines = self.lines_written, "FileSink closed");
        Ok(())
    }
}
