use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use super::{grid, Publisher, COLUMNS};
use crate::error::Result;
use crate::reconcile::EnrichedRow;

/// Writes the sheet layout to a local CSV file, header row included.
#[derive(Debug, Clone)]
pub struct CsvPublisher {
    path: PathBuf,
}

impl CsvPublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, rows: &[EnrichedRow]) -> Result<()> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(COLUMNS)?;
        for cells in grid(rows) {
            writer.write_record(cells.iter().map(|c| c.to_field()))?;
        }
        writer.flush()?;
        info!(path = %self.path.display(), rows = rows.len(), "csv written");
        Ok(())
    }
}

#[async_trait]
impl Publisher for CsvPublisher {
    async fn publish(&self, rows: &[EnrichedRow]) -> Result<()> {
        self.write(rows)
    }
}
