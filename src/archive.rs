use anyhow::{Context, Result};
use itertools::Itertools;
use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::bar::EncodedRecord;
use crate::export::ExportError;

/// `<root>/equity/usa/daily`
pub fn daily_dir(root: &Path) -> PathBuf {
    root.join("equity").join("usa").join("daily")
}

/// Entry (and staging file) name inside the archive.
pub fn entry_name(symbol: &str) -> String {
    format!("{}.csv", symbol.to_lowercase())
}

pub fn archive_path(root: &Path, symbol: &str) -> PathBuf {
    daily_dir(root).join(format!("{}.zip", symbol.to_lowercase()))
}

/// Newline-joined records, no trailing newline.
pub fn render_records(records: &[EncodedRecord]) -> String {
    records.iter().join("\n")
}

/// Write `records` as `<root>/equity/usa/daily/<symbol>.zip` holding a single
/// `<symbol>.csv` entry. Any existing archive for the symbol is replaced.
pub fn write_archive(symbol: &str, records: &[EncodedRecord], root: &Path) -> Result<PathBuf> {
    if records.is_empty() {
        return Err(ExportError::NoData {
            symbol: symbol.to_string(),
        }
        .into());
    }

    let dir = daily_dir(root);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

    let name = entry_name(symbol);
    let csv_path = dir.join(&name);
    let zip_path = archive_path(root, symbol);

    fs::write(&csv_path, render_records(records))
        .with_context(|| format!("write staging file {}", csv_path.display()))?;
    debug!("staged {} records in {}", records.len(), csv_path.display());

    let contents =
        fs::read(&csv_path).with_context(|| format!("read staging file {}", csv_path.display()))?;

    // build in a temp file next to the target, then rename over any old archive
    let mut tmp = NamedTempFile::new_in(&dir)?;
    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&contents)?;
        zip.finish()?;
    }
    tmp.persist(&zip_path)
        .with_context(|| format!("replace {}", zip_path.display()))?;

    fs::remove_file(&csv_path)
        .with_context(|| format!("remove staging file {}", csv_path.display()))?;

    info!("wrote {}", zip_path.display());
    Ok(zip_path)
}

/// Read back the single entry of an archive as `(name, text)`.
pub fn read_archive_entry(path: &Path) -> Result<(String, String)> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut zip = ZipArchive::new(file)?;
    if zip.len() != 1 {
        anyhow::bail!("{} holds {} entries, expected 1", path.display(), zip.len());
    }
    let mut entry = zip.by_index(0)?;
    let name = entry.name().to_string();
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok((name, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn record(day: u32, close: i64) -> EncodedRecord {
        EncodedRecord {
            date: NaiveDate::from_ymd_opt(2023, 3, day).unwrap(),
            open: close - 100,
            high: close + 500,
            low: close - 700,
            close,
            volume: 42 * day as u64,
        }
    }

    #[test]
    fn layout_uses_lowercase_symbol() {
        let root = Path::new("/data");
        assert_eq!(
            archive_path(root, "AAPL"),
            PathBuf::from("/data/equity/usa/daily/aapl.zip")
        );
        assert_eq!(entry_name("BRK.B"), "brk.b.csv");
    }

    #[test]
    fn render_has_no_trailing_newline() {
        let text = render_records(&[record(1, 10_000), record(2, 20_000)]);
        assert_eq!(
            text,
            "20230301 00:00,9900,10500,9300,10000,42\n20230302 00:00,19900,20500,19300,20000,84"
        );
    }

    #[test]
    fn writes_single_entry_and_removes_staging_file() {
        let root = tempdir().unwrap();
        let records = vec![record(1, 1_000_000), record(2, 1_010_000), record(3, 990_000)];

        let path = write_archive("MSFT", &records, root.path()).unwrap();
        assert_eq!(path, root.path().join("equity/usa/daily/msft.zip"));
        assert!(path.exists());
        assert!(!root.path().join("equity/usa/daily/msft.csv").exists());

        let (name, text) = read_archive_entry(&path).unwrap();
        assert_eq!(name, "msft.csv");
        assert_eq!(text, render_records(&records));
        assert_eq!(text.lines().count(), 3);

        let leftovers: Vec<_> = fs::read_dir(daily_dir(root.path()))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec!["msft.zip"]);
    }

    #[test]
    fn entry_is_deflated() {
        let root = tempdir().unwrap();
        let path = write_archive("spy", &[record(9, 4_000_000)], root.path()).unwrap();
        let mut zip = ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
        assert_eq!(zip.by_index(0).unwrap().compression(), CompressionMethod::Deflated);
    }

    #[test]
    fn existing_archive_is_replaced() {
        let root = tempdir().unwrap();
        let first: Vec<_> = (1..=10).map(|d| record(d, 500_000)).collect();
        write_archive("AAPL", &first, root.path()).unwrap();

        let second = vec![record(20, 777_700)];
        let path = write_archive("AAPL", &second, root.path()).unwrap();

        let (_, text) = read_archive_entry(&path).unwrap();
        assert_eq!(text, "20230320 00:00,777600,778200,777000,777700,840");
    }

    #[test]
    fn existing_directory_is_fine() {
        let root = tempdir().unwrap();
        fs::create_dir_all(daily_dir(root.path())).unwrap();
        write_archive("qqq", &[record(1, 1)], root.path()).unwrap();
    }

    #[test]
    fn empty_records_write_nothing() {
        let root = tempdir().unwrap();
        let err = write_archive("AAPL", &[], root.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExportError>(),
            Some(ExportError::NoData { .. })
        ));
        assert!(!daily_dir(root.path()).exists());
    }
}
