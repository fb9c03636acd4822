//! Runtime sweeps: measure one variable (worker count or file count) over a range of values,
//! several times, and persist every repetition as a row of a CSV table.
//!
//! Table layout (no header): the first row holds the swept x values, every following row holds the
//! runtimes in seconds of one repetition. Sweeps are resumable: rerunning the same configuration
//! only measures the repetitions the table is still missing.

use std::{
  fmt,
  fs::{File, OpenOptions},
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{bail, Context, Result};
use arrow::{
  array::{ArrayRef, AsArray, Float64Array, RecordBatch},
  csv::{reader::Format, ReaderBuilder, WriterBuilder},
  datatypes::{DataType, Field, Float64Type, Schema, SchemaRef},
};
use clap::ValueEnum;
use scan_scaling_core::stats::{column_summaries, Summary};

use crate::{
  dataset::Dataset,
  measure::{measure_runtime, Strategy, StrategyKind},
  Selection,
};

/// The quantity a sweep varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Variable {
  /// x = worker count; the constant is the number of files read.
  Workers,
  /// x = number of files read; the constant is the worker count.
  Files,
}

impl fmt::Display for Variable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Variable::Workers => write!(f, "workers"),
      Variable::Files => write!(f, "files"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
  pub variable: Variable,
  pub strategy: StrategyKind,
  pub step: usize,
  pub max: usize,
  pub loops: usize,
  pub constant: Option<usize>,
}

impl SweepConfig {
  pub fn validate(&self) -> Result<()> {
    if self.step == 0 {
      bail!("sweep step must be at least 1");
    }
    match (self.variable, self.strategy, self.constant) {
      (Variable::Workers, _, None) => bail!("a worker sweep needs the number of files to read"),
      (Variable::Workers, StrategyKind::Sequential, _) => {
        bail!("a worker sweep needs a parallel strategy")
      }
      (Variable::Files, strategy, None) if strategy != StrategyKind::Sequential => {
        bail!("a parallel file sweep needs the worker count")
      }
      _ => Ok(()),
    }
  }

  /// `0, step, 2 * step, ...` up to (excluding) `max + step`.
  pub fn x_values(&self) -> Vec<usize> {
    (0..self.max + self.step).step_by(self.step.max(1)).collect()
  }

  /// `runtime_vs_<variable>_<strategy>[_<constant>]_<max>_<step>_<loops>.csv`
  pub fn file_name(&self) -> String {
    let strategy = self.strategy_name();
    match self.constant {
      Some(constant) => format!(
        "runtime_vs_{}_{}_{}_{}_{}_{}.csv",
        self.variable, strategy, constant, self.max, self.step, self.loops
      ),
      None => format!(
        "runtime_vs_{}_{}_{}_{}_{}.csv",
        self.variable, strategy, self.max, self.step, self.loops
      ),
    }
  }

  /// The command-line name of the strategy, e.g. `row-ranges`.
  pub fn strategy_name(&self) -> String {
    self
      .strategy
      .to_possible_value()
      .map(|value| value.get_name().to_string())
      .unwrap_or_default()
  }

  /// The file count and strategy measured at sweep position `x`.
  pub fn point(&self, x: usize) -> (usize, Strategy) {
    let constant = self.constant.unwrap_or(0);
    match self.variable {
      Variable::Workers => (constant, self.strategy.with_workers(x)),
      Variable::Files => (x, self.strategy.with_workers(constant)),
    }
  }

  /// Run the sweep against a dataset, storing the table in `dir`. Returns the table path.
  pub fn run(&self, dataset: &Dataset, dir: impl AsRef<Path>, selection: &Selection) -> Result<PathBuf> {
    self.run_with(dir, |x| {
      let (n_files, strategy) = self.point(x);
      measure_runtime(dataset, n_files, strategy, selection)
    })
  }

  /// Run the sweep with a custom measurement of one sweep position.
  pub fn run_with(
    &self,
    dir: impl AsRef<Path>,
    mut measure: impl FnMut(usize) -> Result<f64>,
  ) -> Result<PathBuf> {
    self.validate()?;

    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
      .with_context(|| format!("failed to create result directory {}", dir.display()))?;
    let path = dir.join(self.file_name());

    let x = self.x_values();
    let x_row: Vec<f64> = x.iter().map(|&value| value as f64).collect();

    if !path.exists() {
      append_row(&path, &x_row)?;
    }

    let table = RuntimeTable::read(&path)?;
    if table.x != x_row {
      bail!(
        "{} was recorded for x = {:?}, not {:?}",
        path.display(),
        table.x,
        x_row
      );
    }

    for repetition in table.runs.len()..self.loops {
      let row = x
        .iter()
        .map(|&value| measure(value))
        .collect::<Result<Vec<f64>>>()?;
      append_row(&path, &row)?;
      log::info!(
        "{}: repetition {}/{} recorded",
        path.display(),
        repetition + 1,
        self.loops
      );
    }

    Ok(path)
  }
}

/// A runtime table read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeTable {
  pub x: Vec<f64>,
  pub runs: Vec<Vec<f64>>,
}

impl RuntimeTable {
  pub fn read(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let open = || File::open(path).with_context(|| format!("failed to open {}", path.display()));

    let (inferred, _) = Format::default()
      .with_header(false)
      .infer_schema(open()?, Some(1))?;
    if inferred.fields().is_empty() {
      bail!("{} is empty", path.display());
    }

    let reader = ReaderBuilder::new(float_schema(inferred.fields().len()))
      .with_header(false)
      .build(open()?)?;

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for batch in reader {
      let batch = batch.with_context(|| format!("malformed runtime table {}", path.display()))?;
      let columns: Vec<&Float64Array> = batch
        .columns()
        .iter()
        .map(|column| column.as_primitive::<Float64Type>())
        .collect();
      for row in 0..batch.num_rows() {
        rows.push(columns.iter().map(|column| column.value(row)).collect());
      }
    }

    let mut rows = rows.into_iter();
    let x = rows
      .next()
      .with_context(|| format!("{} has no x row", path.display()))?;
    Ok(Self {
      x,
      runs: rows.collect(),
    })
  }

  /// Mean and standard deviation over the repetitions, per x value.
  pub fn summaries(&self) -> Vec<Summary> {
    column_summaries(&self.runs)
  }
}

fn float_schema(width: usize) -> SchemaRef {
  Arc::new(Schema::new(
    (0..width)
      .map(|idx| Field::new(format!("c{}", idx), DataType::Float64, false))
      .collect::<Vec<_>>(),
  ))
}

/// Append one row to a table, creating the file if needed.
fn append_row(path: &Path, values: &[f64]) -> Result<()> {
  let columns: Vec<ArrayRef> = values
    .iter()
    .map(|&value| Arc::new(Float64Array::from(vec![value])) as ArrayRef)
    .collect();
  let batch = RecordBatch::try_new(float_schema(values.len()), columns)?;

  let file = OpenOptions::new()
    .create(true)
    .append(true)
    .open(path)
    .with_context(|| format!("failed to open {} for appending", path.display()))?;
  let mut writer = WriterBuilder::new().with_header(false).build(file);
  writer.write(&batch)?;
  Ok(())
}
