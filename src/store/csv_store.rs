use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use csv::{ReaderBuilder, Writer};
use tracing::debug;

use super::{StoreError, Table, TableStore};

/// One `{key}.csv` file per resource under a data root.
#[derive(Debug, Clone)]
pub struct CsvTableStore {
    root: PathBuf,
}

impl CsvTableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.csv"))
    }
}

impl TableStore for CsvTableStore {
    fn read(&self, key: &str) -> Result<Option<Table>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let read_error = |source: csv::Error| StoreError::Read {
            key: key.to_string(),
            path: path.clone(),
            source,
        };

        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_path(&path)
            .map_err(read_error)?;

        let columns: Vec<String> = reader
            .headers()
            .map_err(read_error)?
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                if idx == 0 {
                    header.trim_start_matches('\u{feff}').to_string()
                } else {
                    header.to_string()
                }
            })
            .collect();

        let rows = reader
            .records()
            .map(|record| {
                record
                    .map(|record| record.iter().map(str::to_string).collect::<Vec<_>>())
                    .map_err(read_error)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(key, path = %path.display(), rows = rows.len(), "read csv resource");

        Table::from_rows(key, columns, rows).map(Some)
    }

    fn write(&self, key: &str, table: &Table) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp_path = self.root.join(format!(".{key}.csv.tmp"));

        let result = (|| -> anyhow::Result<()> {
            let mut writer = Writer::from_path(&tmp_path)
                .with_context(|| format!("failed to create {}", tmp_path.display()))?;
            writer.write_record(table.columns())?;
            for row in table.rows() {
                writer.write_record(row)?;
            }
            writer.flush()?;
            drop(writer);
            // rename is atomic on the same filesystem: readers see the old file or the new one
            fs::rename(&tmp_path, &path)
                .with_context(|| format!("failed to move {} into place", tmp_path.display()))?;
            Ok(())
        })();

        result.map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Write {
                key: key.to_string(),
                path: path.clone(),
                source,
            }
        })?;

        debug!(key, path = %path.display(), rows = table.len(), "wrote csv resource");
        Ok(())
    }
}
