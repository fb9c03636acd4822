//! Dataset directories: an ordered list of Parquet files, one chunk per file.

use std::{
  fs::File,
  ops::Range,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{bail, Context, Result};
use parquet::{arrow::arrow_reader::ParquetRecordBatchReaderBuilder, file::metadata::ParquetMetaData};

const GIB: f64 = (1u64 << 30) as f64;

/// The files of a dataset directory, sorted by file name.
#[derive(Debug, Clone)]
pub struct Dataset {
  root: PathBuf,
  files: Vec<PathBuf>,
}

impl Dataset {
  /// List the regular files directly inside `dir`. Subdirectories are ignored.
  pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
    let root = dir.as_ref().to_path_buf();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&root)
      .with_context(|| format!("failed to list dataset directory {}", root.display()))?
    {
      let entry = entry?;
      if entry.file_type()?.is_file() {
        files.push(entry.path());
      }
    }
    files.sort_by(|p1, p2| p1.file_name().cmp(&p2.file_name()));

    log::debug!("dataset {} has {} files", root.display(), files.len());
    Ok(Self { root, files })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn files(&self) -> &[PathBuf] {
    &self.files
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  /// The first `n` files of the dataset.
  pub fn first(&self, n: usize) -> Result<&[PathBuf]> {
    if n > self.files.len() {
      bail!(
        "requested {} files but {} only has {}",
        n,
        self.root.display(),
        self.files.len()
      );
    }
    Ok(&self.files[..n])
  }

  /// Total on-disk size of the first `n` files in GiB.
  pub fn total_size_gib(&self, n: usize) -> Result<f64> {
    let mut bytes = 0;
    for path in self.first(n)? {
      bytes += std::fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();
    }
    Ok(bytes as f64 / GIB)
  }
}

/// Row count of every file, read from the Parquet footer only.
pub fn row_counts(paths: &[PathBuf]) -> Result<Vec<i64>> {
  paths
    .iter()
    .map(|path| -> Result<i64> { Ok(footer(path)?.file_metadata().num_rows()) })
    .collect()
}

/// The row window of every non-empty row group as `(file index, rows)`, in dataset order.
pub fn row_group_windows(paths: &[PathBuf]) -> Result<Vec<(usize, Range<u64>)>> {
  let mut windows = Vec::new();
  for (idx, path) in paths.iter().enumerate() {
    let metadata = footer(path)?;
    let mut start = 0;
    for row_group in metadata.row_groups() {
      let end = start + row_group.num_rows().max(0) as u64;
      if end > start {
        windows.push((idx, start..end));
      }
      start = end;
    }
  }
  Ok(windows)
}

fn footer(path: &Path) -> Result<Arc<ParquetMetaData>> {
  let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
  let builder = ParquetRecordBatchReaderBuilder::try_new(file)
    .with_context(|| format!("failed to read parquet footer of {}", path.display()))?;
  Ok(builder.metadata().clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::generate_dataset;

  #[test]
  fn test_open_sorted() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.parquet", "c.parquet", "a.parquet"] {
      std::fs::write(dir.path().join(name), b"").unwrap();
    }
    std::fs::create_dir(dir.path().join("nested")).unwrap();

    let dataset = Dataset::open(dir.path()).unwrap();
    let names: Vec<_> = dataset
      .files()
      .iter()
      .map(|path| path.file_name().unwrap().to_str().unwrap().to_string())
      .collect();
    assert_eq!(vec!["a.parquet", "b.parquet", "c.parquet"], names);
    assert!(dataset.first(4).is_err());
    assert_eq!(2, dataset.first(2).unwrap().len());
    assert_eq!(0.0, dataset.total_size_gib(3).unwrap());
  }

  #[test]
  fn test_row_counts() {
    let dir = tempfile::tempdir().unwrap();
    generate_dataset(dir.path(), 3, 250, 64, 1).unwrap();

    let dataset = Dataset::open(dir.path()).unwrap();
    assert_eq!(vec![250, 250, 250], row_counts(dataset.files()).unwrap());
    assert!(dataset.total_size_gib(3).unwrap() > 0.0);
  }

  #[test]
  fn test_row_group_windows() {
    let dir = tempfile::tempdir().unwrap();
    generate_dataset(dir.path(), 2, 250, 100, 1).unwrap();

    let dataset = Dataset::open(dir.path()).unwrap();
    let windows = row_group_windows(dataset.files()).unwrap();
    assert_eq!(
      vec![
        (0, 0..100),
        (0, 100..200),
        (0, 200..250),
        (1, 0..100),
        (1, 100..200),
        (1, 200..250),
      ],
      windows
    );
    assert!(row_group_windows(&[dir.path().join("missing.parquet")]).is_err());
  }
}
