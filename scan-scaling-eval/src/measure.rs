//! Timed read-filter-extract runs over the first `n` files of a dataset.
//!
//! The pre-split strategies end up as a list of worker assignments (which files, which row
//! windows). Each assignment runs as its own task on a runtime with one thread per worker, owns
//! its output buffer, and the buffers are concatenated in worker order once every worker is done.
//! [`Strategy::Threads`] instead hands the row groups of the whole dataset to the runtime as a
//! stream of tasks, at most one in flight per thread, and collects them in dataset order.
//!
//! Only decoding and filtering are bounded by the worker count. File reads go through
//! `tokio::fs`, which runs them on the runtime's blocking pool, so I/O may use more threads than
//! there are workers.

use std::{
  fmt,
  ops::Range,
  path::PathBuf,
  sync::Arc,
  time::{Duration, Instant},
};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use futures::{future::try_join_all, stream, StreamExt};
use scan_scaling_core::{distribute, partition};

use crate::{
  dataset::{row_counts, row_group_windows, Dataset},
  parquet::scan,
  Selection,
};

/// How the rows of a dataset are split across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// A single worker reads every file in order.
  Sequential,
  /// Near-equal contiguous row ranges across file boundaries, one per worker.
  RowRanges(usize),
  /// Contiguous groups of whole files, one per worker.
  FileGroups(usize),
  /// One scan over all files, row group by row group, spread over a pool of threads.
  Threads(usize),
}

impl Strategy {
  /// A worker count of zero means "no parallelism" and falls back to [`Strategy::Sequential`].
  pub fn normalized(self) -> Self {
    match self {
      Strategy::RowRanges(0) | Strategy::FileGroups(0) | Strategy::Threads(0) => {
        Strategy::Sequential
      }
      other => other,
    }
  }

  pub fn workers(self) -> usize {
    match self.normalized() {
      Strategy::Sequential => 1,
      Strategy::RowRanges(n) | Strategy::FileGroups(n) | Strategy::Threads(n) => n,
    }
  }
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Strategy::Sequential => write!(f, "sequential"),
      Strategy::RowRanges(n) => write!(f, "row-ranges({})", n),
      Strategy::FileGroups(n) => write!(f, "file-groups({})", n),
      Strategy::Threads(n) => write!(f, "threads({})", n),
    }
  }
}

/// [`Strategy`] without its worker count, as picked on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyKind {
  Sequential,
  RowRanges,
  FileGroups,
  Threads,
}

impl StrategyKind {
  pub fn with_workers(self, workers: usize) -> Strategy {
    match self {
      StrategyKind::Sequential => Strategy::Sequential,
      StrategyKind::RowRanges => Strategy::RowRanges(workers),
      StrategyKind::FileGroups => Strategy::FileGroups(workers),
      StrategyKind::Threads => Strategy::Threads(workers),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
  pub elapsed: Duration,
  /// Extracted values of all passing rows, in dataset order.
  pub values: Vec<f64>,
}

/// One worker's share: files to read, each with an optional row window.
type Assignment = Vec<(usize, Option<Range<u64>>)>;

/// Read the first `n_files` files of `dataset` with `strategy` and time it.
///
/// The elapsed time covers planning, reading, filtering and the final concatenation, not the
/// runtime start-up. `n_files == 0` does no work and reports zero. Any failing worker fails the
/// whole measurement.
pub fn measure(
  dataset: &Dataset,
  n_files: usize,
  strategy: Strategy,
  selection: &Selection,
) -> Result<Measurement> {
  if n_files == 0 {
    return Ok(Measurement {
      elapsed: Duration::ZERO,
      values: Vec::new(),
    });
  }

  let paths: Arc<[PathBuf]> = dataset.first(n_files)?.into();
  let selection = Arc::new(selection.clone());
  let strategy = strategy.normalized();

  let runtime = tokio::runtime::Builder::new_multi_thread()
    .worker_threads(strategy.workers())
    .enable_all()
    .build()?;

  let start = Instant::now();
  let values = runtime.block_on(run(paths, strategy, selection))?;
  let elapsed = start.elapsed();

  log::info!(
    "{} files, {}: {} values in {:.3}s",
    n_files,
    strategy,
    values.len(),
    elapsed.as_secs_f64()
  );

  Ok(Measurement { elapsed, values })
}

/// [`measure`] reduced to the elapsed seconds, the unit of runtime tables.
pub fn measure_runtime(
  dataset: &Dataset,
  n_files: usize,
  strategy: Strategy,
  selection: &Selection,
) -> Result<f64> {
  Ok(measure(dataset, n_files, strategy, selection)?.elapsed.as_secs_f64())
}

async fn run(
  paths: Arc<[PathBuf]>,
  strategy: Strategy,
  selection: Arc<Selection>,
) -> Result<Vec<f64>> {
  if let Strategy::Threads(n) = strategy {
    return run_pooled(paths, n, selection).await;
  }

  let assignments = assign(&paths, strategy).await?;

  let handles = assignments
    .into_iter()
    .enumerate()
    .map(|(worker, assignment)| {
      let paths = paths.clone();
      let selection = selection.clone();
      tokio::spawn(async move {
        read_assignment(&paths, assignment, &selection)
          .await
          .with_context(|| format!("worker {} failed", worker))
      })
    })
    .collect::<Vec<_>>();

  // Join in worker order, not completion order.
  let partials = try_join_all(handles).await?;

  let mut values = Vec::new();
  for partial in partials {
    values.extend(partial?);
  }
  Ok(values)
}

/// Scan every row group as its own task, keeping at most `n` tasks in flight.
async fn run_pooled(
  paths: Arc<[PathBuf]>,
  n: usize,
  selection: Arc<Selection>,
) -> Result<Vec<f64>> {
  let footer_paths = paths.clone();
  let windows = tokio::task::spawn_blocking(move || row_group_windows(&footer_paths)).await??;
  log::debug!("{} row groups over {} threads", windows.len(), n);

  let mut tasks = stream::iter(windows)
    .map(|(file, window)| {
      let paths = paths.clone();
      let selection = selection.clone();
      tokio::spawn(async move {
        let path = &paths[file];
        scan(path, Some(window.clone()), &selection)
          .await
          .with_context(|| format!("rows {:?} of {} failed", window, path.display()))
      })
    })
    .buffered(n);

  // `buffered` yields in submission order, which is dataset order.
  let mut values = Vec::new();
  while let Some(partial) = tasks.next().await {
    values.extend(partial??);
  }
  Ok(values)
}

async fn assign(paths: &Arc<[PathBuf]>, strategy: Strategy) -> Result<Vec<Assignment>> {
  let assignments: Vec<Assignment> = match strategy {
    Strategy::Sequential => vec![(0..paths.len()).map(|file| (file, None)).collect()],
    Strategy::RowRanges(n) => {
      let footer_paths = paths.clone();
      let counts = tokio::task::spawn_blocking(move || row_counts(&footer_paths)).await??;
      let plan = partition(&counts, n)?;
      log::debug!("row plan over {:?}: {:?}", counts, plan.ranges());
      plan
        .iter()
        .map(|range| {
          plan
            .spans(range)
            .into_iter()
            .map(|(file, window)| (file, Some(window)))
            .collect()
        })
        .collect()
    }
    Strategy::FileGroups(n) => {
      let groups = distribute(paths.len(), n)?;
      log::debug!("file groups: {:?}", groups);
      groups
        .into_iter()
        .map(|group| group.map(|file| (file, None)).collect())
        .collect()
    }
    Strategy::Threads(_) => bail!("{} is not split into worker assignments", strategy),
  };
  Ok(assignments)
}

async fn read_assignment(
  paths: &[PathBuf],
  assignment: Assignment,
  selection: &Selection,
) -> Result<Vec<f64>> {
  let mut values = Vec::new();
  for (file, window) in assignment {
    values.extend(scan(&paths[file], window, selection).await?);
  }
  Ok(values)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_zero_workers_fall_back_to_sequential() {
    assert_eq!(Strategy::Sequential, Strategy::RowRanges(0).normalized());
    assert_eq!(Strategy::Sequential, Strategy::FileGroups(0).normalized());
    assert_eq!(Strategy::Sequential, Strategy::Threads(0).normalized());
    assert_eq!(1, Strategy::FileGroups(0).workers());
    assert_eq!(6, Strategy::Threads(6).workers());
    assert_eq!(Strategy::RowRanges(4), StrategyKind::RowRanges.with_workers(4));
    assert_eq!(Strategy::Threads(2), StrategyKind::Threads.with_workers(2));
    assert_eq!("threads(2)", Strategy::Threads(2).to_string());
  }

  #[test]
  fn test_no_files_no_work() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = Dataset::open(dir.path()).unwrap();
    let measurement = measure(&dataset, 0, Strategy::RowRanges(8), &Selection::candidate()).unwrap();
    assert_eq!(Duration::ZERO, measurement.elapsed);
    assert!(measurement.values.is_empty());
  }

  #[test]
  fn test_worker_failure_fails_measurement() {
    let dir = tempfile::tempdir().unwrap();
    crate::util::generate_dataset(dir.path(), 2, 100, 50, 1).unwrap();
    std::fs::write(dir.path().join("file0002.parquet"), b"not parquet").unwrap();

    let dataset = Dataset::open(dir.path()).unwrap();
    let selection = Selection::candidate();
    assert!(measure(&dataset, 3, Strategy::FileGroups(3), &selection).is_err());
    assert!(measure(&dataset, 3, Strategy::RowRanges(3), &selection).is_err());
    assert!(measure(&dataset, 3, Strategy::Threads(3), &selection).is_err());
    assert!(measure(&dataset, 2, Strategy::Threads(3), &selection).is_ok());
    assert!(measure(&dataset, 2, Strategy::FileGroups(2), &selection).is_ok());
  }
}
