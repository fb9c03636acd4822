//! The scan follows the physical execution design of [arrow-datafusion](https://github.com/apache/arrow-datafusion):
//! a parquet file is opened as an async record batch stream, row groups are pruned with their
//! zone maps (column chunk min/max statistics), and every batch that survives is filtered with the
//! [`Selection`] cuts. Only the extracted output column is materialized.
//!
//! A scan can be restricted to a half-open row window of the file, which is how a row range of a
//! partition plan is read: row groups outside the window are skipped entirely and the boundary
//! row groups are trimmed with a [`RowSelection`].

use std::{ops::Range, path::Path};

use anyhow::{Context, Result};
use futures::StreamExt;
use parquet::{
  arrow::{
    arrow_reader::{RowSelection, RowSelector},
    ParquetRecordBatchStreamBuilder, ProjectionMask,
  },
  file::{
    metadata::{ParquetMetaData, RowGroupMetaData},
    statistics::Statistics,
  },
};

use crate::Selection;

/// Return the output column of every row in `rows` (the whole file when `None`) that passes all
/// cuts of `selection`, in row order.
pub async fn scan(
  path: impl AsRef<Path>,
  rows: Option<Range<u64>>,
  selection: &Selection,
) -> Result<Vec<f64>> {
  let path = path.as_ref();
  let file = tokio::fs::File::open(path)
    .await
    .with_context(|| format!("failed to open {}", path.display()))?;

  let stream_builder = ParquetRecordBatchStreamBuilder::new(file)
    .await
    .with_context(|| format!("failed to read parquet metadata of {}", path.display()))?;

  let projection = {
    let schema = stream_builder.schema();
    let indices = selection
      .columns()
      .into_iter()
      .map(|name| schema.index_of(name))
      .collect::<Result<Vec<_>, _>>()
      .with_context(|| format!("{} lacks a selection column", path.display()))?;
    ProjectionMask::roots(stream_builder.parquet_schema(), indices)
  };

  // Step 1: Restrict to the row window and perform zone-map pruning on row groups
  let (row_groups, row_selection) =
    plan_row_groups(stream_builder.metadata(), rows, |row_group| {
      zone_map_may_match(row_group, selection)
    });

  if row_groups.is_empty() {
    return Ok(Vec::new());
  }

  let mut stream = stream_builder
    .with_projection(projection)
    .with_row_groups(row_groups)
    .with_row_selection(row_selection)
    .build()?;

  let mut result = vec![];

  // Step 2: Perform value level filtering
  while let Some(next_batch) = stream.next().await {
    let next_batch = next_batch?;
    result.extend(selection.apply(&next_batch)?);
  }

  Ok(result)
}

/// Pick the row groups overlapping the row window `rows` and accepted by `keep`, together with a
/// selection (relative to the picked row groups) that trims them to the window.
pub(crate) fn plan_row_groups(
  metadata: &ParquetMetaData,
  rows: Option<Range<u64>>,
  keep: impl Fn(&RowGroupMetaData) -> bool,
) -> (Vec<usize>, RowSelection) {
  let num_rows = metadata.file_metadata().num_rows().max(0) as u64;
  let window = rows.unwrap_or(0..num_rows);

  let mut row_groups = Vec::with_capacity(metadata.num_row_groups());
  let mut selectors = Vec::new();

  let mut group_start = 0;
  for (idx, row_group) in metadata.row_groups().iter().enumerate() {
    let group_end = group_start + row_group.num_rows().max(0) as u64;
    let lo = window.start.max(group_start);
    let hi = window.end.min(group_end);

    if lo < hi && keep(row_group) {
      row_groups.push(idx);
      if lo > group_start {
        selectors.push(RowSelector::skip((lo - group_start) as usize));
      }
      selectors.push(RowSelector::select((hi - lo) as usize));
      if group_end > hi {
        selectors.push(RowSelector::skip((group_end - hi) as usize));
      }
    }

    group_start = group_end;
  }

  (row_groups, RowSelection::from(selectors))
}

/// False only if the statistics of some column chunk prove that no row of the group can pass a
/// cut on that column.
fn zone_map_may_match(row_group: &RowGroupMetaData, selection: &Selection) -> bool {
  row_group.columns().iter().all(|column| {
    let name = column.column_descr().name();
    match column.statistics().and_then(min_max) {
      Some((min, max)) => selection
        .cuts
        .iter()
        .all(|cut| cut.may_pass(name, min, max)),
      None => true,
    }
  })
}

fn min_max(statistics: &Statistics) -> Option<(f64, f64)> {
  if !statistics.has_min_max_set() {
    return None;
  }
  match statistics {
    Statistics::Double(s) => Some((*s.min(), *s.max())),
    Statistics::Float(s) => Some((*s.min() as f64, *s.max() as f64)),
    Statistics::Int32(s) => Some((*s.min() as f64, *s.max() as f64)),
    Statistics::Int64(s) => Some((*s.min() as f64, *s.max() as f64)),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use rand::{rngs::SmallRng, SeedableRng};
  use rstest::rstest;

  use super::*;
  use crate::{
    util::{gen_candidate_batch, generate_dataset},
    Comparison, Cut,
  };

  #[tokio::test]
  async fn test_scan_matches_in_memory_selection() {
    let dir = tempfile::tempdir().unwrap();
    let paths = generate_dataset(dir.path(), 1, 1000, 128, 11).unwrap();

    let mut rng = SmallRng::seed_from_u64(11);
    let batch = gen_candidate_batch(&mut rng, 1000).unwrap();
    let expected = Selection::candidate().apply(&batch).unwrap();
    assert!(!expected.is_empty());

    let scanned = scan(&paths[0], None, &Selection::candidate()).await.unwrap();
    assert_eq!(expected, scanned);
  }

  #[rstest]
  #[case(vec![0..1000])]
  #[case(vec![0..100, 100..1000])]
  #[case(vec![0..127, 127..128, 128..129, 129..640, 640..1000])]
  #[tokio::test]
  async fn test_windows_concatenate_to_full_scan(#[case] windows: Vec<Range<u64>>) {
    let dir = tempfile::tempdir().unwrap();
    let paths = generate_dataset(dir.path(), 1, 1000, 128, 3).unwrap();
    let selection = Selection::candidate();

    let full = scan(&paths[0], None, &selection).await.unwrap();

    let mut pieces = Vec::new();
    for window in windows {
      pieces.extend(scan(&paths[0], Some(window), &selection).await.unwrap());
    }
    assert_eq!(full, pieces);
  }

  #[tokio::test]
  async fn test_empty_window() {
    let dir = tempfile::tempdir().unwrap();
    let paths = generate_dataset(dir.path(), 1, 100, 32, 5).unwrap();
    let scanned = scan(&paths[0], Some(40..40), &Selection::candidate())
      .await
      .unwrap();
    assert!(scanned.is_empty());
  }

  #[tokio::test]
  async fn test_zone_map_prunes_everything() {
    let dir = tempfile::tempdir().unwrap();
    let paths = generate_dataset(dir.path(), 1, 500, 100, 5).unwrap();

    let selection = Selection {
      output: "candidate_vMass".to_string(),
      cuts: vec![Cut::column("candidate_vMass", Comparison::Gt, 100.0)],
    };

    let file = std::fs::File::open(&paths[0]).unwrap();
    let builder =
      parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
    let (row_groups, _) = plan_row_groups(builder.metadata(), None, |row_group| {
      zone_map_may_match(row_group, &selection)
    });
    assert!(row_groups.is_empty());

    assert!(scan(&paths[0], None, &selection).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_missing_column() {
    let dir = tempfile::tempdir().unwrap();
    let paths = generate_dataset(dir.path(), 1, 10, 10, 5).unwrap();
    let selection = Selection {
      output: "muon_pt".to_string(),
      cuts: vec![],
    };
    assert!(scan(&paths[0], None, &selection).await.is_err());
  }
}
