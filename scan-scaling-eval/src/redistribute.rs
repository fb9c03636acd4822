//! Rewrite a dataset into a different number of files with near-equal row counts, e.g. to compare
//! the same data split into 32, 64 and 128 files.

use std::{
  fs::File,
  ops::Range,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{bail, Context, Result};
use arrow::datatypes::SchemaRef;
use futures::future::join_all;
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter};
use scan_scaling_core::partition;

use crate::{
  dataset::{row_counts, Dataset},
  parquet::plan_row_groups,
};

/// Write every row of `dataset`, in order, into `n_files` files `file0000.parquet`, ... inside
/// `output_dir`. Each output file is written by its own worker. Returns the written paths.
///
/// The output directory is created if needed and must not contain any entries. When there are
/// fewer rows than requested files, the trailing empty files are not written. If any worker fails,
/// every output file is removed again (and the directory too, if it was created here).
pub fn redistribute(
  dataset: &Dataset,
  output_dir: impl AsRef<Path>,
  n_files: usize,
) -> Result<Vec<PathBuf>> {
  let output_dir = output_dir.as_ref();
  let created = !output_dir.exists();
  if !created && std::fs::read_dir(output_dir)?.next().is_some() {
    bail!("output directory {} is not empty", output_dir.display());
  }

  let paths: Arc<[PathBuf]> = dataset.files().into();
  let counts = row_counts(&paths)?;
  let plan = partition(&counts, n_files)?;
  if plan.is_empty() {
    log::warn!("{} holds no rows, nothing to write", dataset.root().display());
    return Ok(Vec::new());
  }

  let schema = {
    let file = File::open(&paths[0])?;
    ParquetRecordBatchReaderBuilder::try_new(file)?.schema().clone()
  };

  std::fs::create_dir_all(output_dir)
    .with_context(|| format!("failed to create {}", output_dir.display()))?;

  let runtime = tokio::runtime::Builder::new_multi_thread().build()?;
  let (outputs, handles): (Vec<_>, Vec<_>) = plan
    .iter()
    .enumerate()
    .filter_map(|(idx, range)| {
      if range.is_empty() {
        log::warn!("output file {} would be empty, skipping it", idx);
        return None;
      }
      let output = output_dir.join(format!("file{:04}.parquet", idx));
      let spans = plan.spans(range);
      let paths = paths.clone();
      let schema = schema.clone();
      let target = output.clone();
      let handle = runtime.spawn_blocking(move || write_spans(&paths, spans, schema, target));
      Some((output, handle))
    })
    .unzip();

  // Output order follows the plan, not completion order.
  let mut written = Vec::with_capacity(handles.len());
  let mut failure = None;
  for result in runtime.block_on(join_all(handles)) {
    match result.map_err(anyhow::Error::from).and_then(|output| output) {
      Ok(path) => written.push(path),
      Err(err) => {
        failure.get_or_insert(err);
      }
    }
  }

  match failure {
    None => Ok(written),
    Some(err) => {
      remove_outputs(output_dir, &outputs, created);
      Err(err)
    }
  }
}

fn remove_outputs(output_dir: &Path, outputs: &[PathBuf], remove_dir: bool) {
  for output in outputs.iter().filter(|output| output.exists()) {
    if let Err(err) = std::fs::remove_file(output) {
      log::warn!("failed to remove {}: {}", output.display(), err);
    }
  }
  if remove_dir {
    if let Err(err) = std::fs::remove_dir(output_dir) {
      log::warn!("failed to remove {}: {}", output_dir.display(), err);
    }
  }
}

/// Copy the row windows `spans` of the input files into a new parquet file at `output`.
fn write_spans(
  paths: &[PathBuf],
  spans: Vec<(usize, Range<u64>)>,
  schema: SchemaRef,
  output: PathBuf,
) -> Result<PathBuf> {
  let file =
    File::create(&output).with_context(|| format!("failed to create {}", output.display()))?;
  let mut writer = ArrowWriter::try_new(file, schema.clone(), None)?;

  let mut rows = 0;
  for (idx, window) in spans {
    let path = &paths[idx];
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    if builder.schema() != &schema {
      bail!("{} does not match the dataset schema", path.display());
    }
    let (row_groups, selection) = plan_row_groups(builder.metadata(), Some(window), |_| true);
    let reader = builder
      .with_row_groups(row_groups)
      .with_row_selection(selection)
      .build()?;

    for batch in reader {
      let batch = batch?;
      rows += batch.num_rows();
      writer.write(&batch)?;
    }
  }

  writer.close()?;
  log::info!("wrote {} ({} rows)", output.display(), rows);
  Ok(output)
}
