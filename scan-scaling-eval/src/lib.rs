//! This crate implements the evaluation infrastructure for the scan scaling experiments, including:
//! - Cut-based selection over Arrow record batches and predicated Parquet scans
//! - Sequential / row-range / file-group measurement strategies over a dataset directory
//! - Resumable runtime sweeps persisted as CSV, and plots of their summaries
//! - Dataset redistribution and synthetic dataset generation
//! - Other utilities

pub mod dataset;
pub mod logging;
pub mod measure;
pub mod parquet;
pub mod plot;
pub mod redistribute;
pub mod sweep;
pub mod util;

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use arrow::{
  array::{Array, ArrayRef, AsArray, RecordBatch},
  compute::cast,
  datatypes::{DataType, Float64Type},
};

/// The quantity a [`Cut`] compares against its threshold.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
  Column(String),
  /// `numerator / denominator`, evaluated row by row.
  Ratio(String, String),
}

impl Operand {
  fn columns(&self) -> Vec<&str> {
    match self {
      Operand::Column(name) => vec![name.as_str()],
      Operand::Ratio(numerator, denominator) => vec![numerator.as_str(), denominator.as_str()],
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
  Eq,
  Gt,
  Lt,
}

impl Comparison {
  pub fn holds(self, value: f64, threshold: f64) -> bool {
    match self {
      Comparison::Eq => value == threshold,
      Comparison::Gt => value > threshold,
      Comparison::Lt => value < threshold,
    }
  }
}

/// A single numeric predicate, e.g. `candidate_vProb > 0.05`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cut {
  pub operand: Operand,
  pub comparison: Comparison,
  pub threshold: f64,
}

impl Cut {
  pub fn new(operand: Operand, comparison: Comparison, threshold: f64) -> Self {
    Self {
      operand,
      comparison,
      threshold,
    }
  }

  pub fn column(name: &str, comparison: Comparison, threshold: f64) -> Self {
    Self::new(Operand::Column(name.to_string()), comparison, threshold)
  }

  /// Whether a row whose operand lies in `[min, max]` could pass this cut.
  /// Ratios are never pruned.
  pub fn may_pass(&self, column: &str, min: f64, max: f64) -> bool {
    match &self.operand {
      Operand::Column(name) if name == column => match self.comparison {
        Comparison::Eq => min <= self.threshold && self.threshold <= max,
        Comparison::Gt => max > self.threshold,
        Comparison::Lt => min < self.threshold,
      },
      _ => true,
    }
  }
}

/// A conjunction of cuts plus the column to extract from the passing rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
  pub output: String,
  pub cuts: Vec<Cut>,
}

impl Default for Selection {
  fn default() -> Self {
    Self::candidate()
  }
}

impl Selection {
  /// The B candidate selection: neutral candidates with a well displaced, good quality vertex,
  /// a ditrack mass inside the phi window and a candidate mass inside the signal window.
  pub fn candidate() -> Self {
    Self {
      output: "candidate_vMass".to_string(),
      cuts: vec![
        Cut::column("candidate_charge", Comparison::Eq, 0.0),
        Cut::column("candidate_cosAlpha", Comparison::Gt, 0.99),
        Cut::column("candidate_vProb", Comparison::Gt, 0.05),
        Cut::new(
          Operand::Ratio("candidate_lxy".to_string(), "candidate_lxyErr".to_string()),
          Comparison::Gt,
          3.0,
        ),
        Cut::column("ditrack_mass", Comparison::Gt, 1.014),
        Cut::column("ditrack_mass", Comparison::Lt, 1.024),
        Cut::column("candidate_vMass", Comparison::Gt, 5.33),
        Cut::column("candidate_vMass", Comparison::Lt, 5.40),
      ],
    }
  }

  /// Every column the selection reads, output column first, without duplicates.
  pub fn columns(&self) -> Vec<&str> {
    let mut columns = vec![self.output.as_str()];
    for cut in &self.cuts {
      for column in cut.operand.columns() {
        if !columns.contains(&column) {
          columns.push(column);
        }
      }
    }
    columns
  }

  /// Evaluate all cuts over a batch and return the output column of the passing rows, in row
  /// order. Columns are cast to `Float64` first; a null in any column used by a cut fails the
  /// row.
  pub fn apply(&self, batch: &RecordBatch) -> Result<Vec<f64>> {
    let mut arrays: HashMap<&str, ArrayRef> = HashMap::new();
    for name in self.columns() {
      let column = batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("column {} is missing from the batch", name))?;
      arrays.insert(name, cast(column.as_ref(), &DataType::Float64)?);
    }

    let n = batch.num_rows();
    let mut selected = vec![true; n];

    for cut in &self.cuts {
      match &cut.operand {
        Operand::Column(name) => {
          let array = &arrays[name.as_str()];
          let values = array.as_primitive::<Float64Type>().values();
          cut_pred(values, cut.comparison, cut.threshold, &mut selected);
          mask_nulls(array, &mut selected);
        }
        Operand::Ratio(numerator, denominator) => {
          let numerator = &arrays[numerator.as_str()];
          let denominator = &arrays[denominator.as_str()];
          let ratio: Vec<f64> = numerator
            .as_primitive::<Float64Type>()
            .values()
            .iter()
            .zip(denominator.as_primitive::<Float64Type>().values().iter())
            .map(|(num, den)| num / den)
            .collect();
          cut_pred(&ratio, cut.comparison, cut.threshold, &mut selected);
          mask_nulls(numerator, &mut selected);
          mask_nulls(denominator, &mut selected);
        }
      }
    }

    let output = &arrays[self.output.as_str()];
    mask_nulls(output, &mut selected);
    let values = output.as_primitive::<Float64Type>().values();

    Ok(
      values
        .iter()
        .zip(selected)
        .filter_map(|(value, keep)| keep.then_some(*value))
        .collect(),
    )
  }
}

/// Algorithm: Plain comparison, and-ed into an existing selection
/// * `input`: operand values, one per row
/// * `comparison`: predicate kind
/// * `threshold`: predicate target
/// * `output`: Selection bit vector; rows failing the predicate are cleared
pub fn cut_pred(input: &[f64], comparison: Comparison, threshold: f64, output: &mut [bool]) {
  input.iter().enumerate().for_each(|(idx, &value)| {
    if output[idx] && !comparison.holds(value, threshold) {
      output[idx] = false;
    }
  });
}

fn mask_nulls(array: &ArrayRef, output: &mut [bool]) {
  if array.null_count() == 0 {
    return;
  }
  for (idx, keep) in output.iter_mut().enumerate() {
    if array.is_null(idx) {
      *keep = false;
    }
  }
}
