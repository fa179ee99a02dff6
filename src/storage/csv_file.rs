// src/storage/csv_file.rs
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::normalize::NormalizedRecord;

/// One CSV file per (month, year): `<dir>/<Month>_<year>_news.csv`.
#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, month: &str, year: i32) -> PathBuf {
        self.dir.join(format!("{month}_{year}_news.csv"))
    }

    /// Write all records, replacing any previous file for the month.
    ///
    /// Rows go to a sibling temp file that is renamed into place, so readers
    /// see either the old file or the complete new one.
    pub fn write(&self, records: &[NormalizedRecord], month: &str, year: i32) -> Result<PathBuf> {
        if records.is_empty() {
            bail!("no events to write");
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating output dir {}", self.dir.display()))?;

        let path = self.path_for(month, year);
        let tmp = path.with_extension("csv.tmp");

        if let Err(e) = write_rows(&tmp, records) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &path).with_context(|| format!("moving csv into {}", path.display()))?;

        tracing::info!(target: "storage", path = %path.display(), rows = records.len(), "csv written");
        Ok(path)
    }
}

fn write_rows(path: &Path, records: &[NormalizedRecord]) -> Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    for r in records {
        w.serialize(r).context("serializing csv row")?;
    }
    w.flush().context("flushing csv")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_follows_record_field_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path().join("news"));
        let rec = NormalizedRecord {
            day: "Sun".into(),
            date: "01/06/2025".into(),
            time: "21:00".into(),
            currency: "USD".into(),
            impact: "red".into(),
            event: "CPI, y/y".into(),
            ..Default::default()
        };

        let path = store.write(&[rec.clone(), rec], "June", 2025).unwrap();
        assert!(path.ends_with("June_2025_news.csv"));

        let body = std::fs::read_to_string(&path).unwrap();
        let mut lines = body.lines();
        assert_eq!(lines.next().unwrap(), NormalizedRecord::FIELD_NAMES.join(","));
        assert_eq!(
            lines.next().unwrap(),
            r#"Sun,01/06/2025,21:00,USD,red,"CPI, y/y",,,,"#
        );
        assert_eq!(lines.count(), 1);
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn empty_input_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        let err = store.write(&[], "June", 2025).unwrap_err();
        assert_eq!(err.to_string(), "no events to write");
        assert!(!store.path_for("June", 2025).exists());
    }
}
