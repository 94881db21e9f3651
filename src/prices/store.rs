//! Local purchase-price cache: a pretty-printed JSON list of
//! `{appid, name, orig, paid}` objects kept sorted by app id.
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub appid: u64,
    pub name: String,
    pub orig: f64,
    pub paid: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceStore {
    records: BTreeMap<u64, PriceRecord>,
}

impl PriceStore {
    /// Load the cache; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "price file not found; starting with an empty store");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        let records: Vec<PriceRecord> =
            serde_json::from_str(&text).map_err(|source| LedgerError::PriceFile {
                path: path.to_path_buf(),
                source,
            })?;
        let store: Self = records.into_iter().collect();
        info!(path = %path.display(), count = store.len(), "price file loaded");
        Ok(store)
    }

    /// Overwrite `path` with every record, app id ascending, 4-space indented.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
        let ordered: Vec<&PriceRecord> = self.records.values().collect();
        ordered.serialize(&mut ser)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        info!(path = %path.display(), count = self.len(), "price file saved");
        Ok(())
    }

    pub fn get(&self, appid: u64) -> Option<&PriceRecord> {
        self.records.get(&appid)
    }

    /// Insert or update the record for `record.appid`.
    pub fn upsert(&mut self, record: PriceRecord) {
        match self.records.get_mut(&record.appid) {
            Some(existing) => {
                existing.name = record.name;
                existing.orig = record.orig;
                existing.paid = record.paid;
            }
            None => {
                self.records.insert(record.appid, record);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in ascending app id order.
    pub fn iter(&self) -> impl Iterator<Item = &PriceRecord> {
        self.records.values()
    }
}

impl FromIterator<PriceRecord> for PriceStore {
    fn from_iter<I: IntoIterator<Item = PriceRecord>>(iter: I) -> Self {
        let mut store = Self::default();
        for record in iter {
            store.upsert(record);
        }
        store
    }
}
