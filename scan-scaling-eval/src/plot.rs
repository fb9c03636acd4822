//! Error-bar plots of runtime tables: the mean runtime per x value with a one standard deviation
//! bar, each mean annotated with its value.

use std::{ops::Range, path::Path};

use anyhow::{anyhow, bail, Result};
use plotters::{coord::Shift, prelude::*};
use scan_scaling_core::stats::Summary;

use crate::sweep::{SweepConfig, Variable};

/// Figure size in pixels, a wide 15x5 figure.
const FIGURE_SIZE: (u32, u32) = (1500, 500);
const BAR_COLOR: RGBColor = RGBColor(255, 165, 0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotLabels {
  pub title: String,
  pub x_label: String,
}

impl PlotLabels {
  /// Labels for a sweep. `size_gib` is the size of the data read by a worker sweep; for a file
  /// sweep it signals that the x axis has been converted from file counts to GiB.
  pub fn for_sweep(config: &SweepConfig, size_gib: Option<f64>) -> Self {
    let strategy = config.strategy.with_workers(config.constant.unwrap_or(0));
    match config.variable {
      Variable::Workers => {
        let files = config.constant.unwrap_or(0);
        let title = match size_gib {
          Some(size) => format!(
            "Runtime vs Workers ({}, {} files, {:.2} GB)",
            config.strategy_name(),
            files,
            size
          ),
          None => format!(
            "Runtime vs Workers ({}, {} files)",
            config.strategy_name(),
            files
          ),
        };
        Self {
          title,
          x_label: "Workers".to_string(),
        }
      }
      Variable::Files => Self {
        title: format!("Runtime vs Size ({})", strategy),
        x_label: if size_gib.is_some() {
          "Size (GB)".to_string()
        } else {
          "Files".to_string()
        },
      },
    }
  }
}

/// Render `summaries` against `x`. The format follows the extension of `output`: `.svg` gives an
/// SVG document, anything else a bitmap.
pub fn plot_summary(
  x: &[f64],
  summaries: &[Summary],
  labels: &PlotLabels,
  output: impl AsRef<Path>,
) -> Result<()> {
  if x.is_empty() || x.len() != summaries.len() {
    bail!(
      "cannot plot {} summaries against {} x values",
      summaries.len(),
      x.len()
    );
  }

  let output = output.as_ref();
  if let Some(parent) = output.parent() {
    std::fs::create_dir_all(parent)?;
  }

  match output.extension().and_then(|extension| extension.to_str()) {
    Some("svg") => draw(
      SVGBackend::new(output, FIGURE_SIZE).into_drawing_area(),
      x,
      summaries,
      labels,
    )?,
    _ => draw(
      BitMapBackend::new(output, FIGURE_SIZE).into_drawing_area(),
      x,
      summaries,
      labels,
    )?,
  }

  log::info!("wrote {}", output.display());
  Ok(())
}

fn draw<DB: DrawingBackend>(
  root: DrawingArea<DB, Shift>,
  x: &[f64],
  summaries: &[Summary],
  labels: &PlotLabels,
) -> Result<()> {
  root.fill(&WHITE).map_err(plot_error)?;

  let (x_range, y_range) = axis_ranges(x, summaries);
  let mut chart = ChartBuilder::on(&root)
    .caption(&labels.title, ("sans-serif", 24).into_font())
    .margin(20)
    .x_label_area_size(40)
    .y_label_area_size(60)
    .build_cartesian_2d(x_range, y_range)
    .map_err(plot_error)?;

  chart
    .configure_mesh()
    .x_desc(labels.x_label.as_str())
    .y_desc("Runtime (s)")
    .draw()
    .map_err(plot_error)?;

  let points = || x.iter().copied().zip(summaries.iter().copied());

  chart
    .draw_series(points().map(|(x, summary)| {
      ErrorBar::new_vertical(
        x,
        summary.mean - summary.std_dev,
        summary.mean,
        summary.mean + summary.std_dev,
        BAR_COLOR.filled(),
        10,
      )
    }))
    .map_err(plot_error)?;

  chart
    .draw_series(points().map(|(x, summary)| Circle::new((x, summary.mean), 4, BLUE.filled())))
    .map_err(plot_error)?;

  chart
    .draw_series(points().map(|(x, summary)| {
      Text::new(
        format!("{:.2}", summary.mean),
        (x, summary.mean),
        ("sans-serif", 14).into_font(),
      )
    }))
    .map_err(plot_error)?;

  root.present().map_err(plot_error)?;
  Ok(())
}

/// Axis ranges with some padding around the data. The y axis always starts at zero.
fn axis_ranges(x: &[f64], summaries: &[Summary]) -> (Range<f64>, Range<f64>) {
  let x_min = x.iter().copied().fold(f64::INFINITY, f64::min);
  let x_max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  let x_pad = if x_max > x_min {
    (x_max - x_min) * 0.05
  } else {
    1.0
  };

  let y_max = summaries
    .iter()
    .map(|summary| summary.mean + summary.std_dev)
    .fold(0.0, f64::max);
  let y_max = if y_max > 0.0 { y_max * 1.15 } else { 1.0 };

  (x_min - x_pad..x_max + x_pad, 0.0..y_max)
}

fn plot_error(err: impl std::fmt::Display) -> anyhow::Error {
  anyhow!("failed to draw plot: {}", err)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::measure::StrategyKind;

  #[test]
  fn test_axis_ranges() {
    let summaries = [
      Summary {
        mean: 1.0,
        std_dev: 0.5,
      },
      Summary {
        mean: 2.0,
        std_dev: 0.0,
      },
    ];
    let (x_range, y_range) = axis_ranges(&[0.0, 10.0], &summaries);
    assert_eq!(-0.5..10.5, x_range);
    assert_eq!(0.0, y_range.start);
    assert!((y_range.end - 2.3).abs() < 1e-12);

    let (x_range, y_range) = axis_ranges(&[4.0], &[Summary { mean: 0.0, std_dev: 0.0 }]);
    assert_eq!(3.0..5.0, x_range);
    assert_eq!(0.0..1.0, y_range);
  }

  #[test]
  fn test_mismatched_lengths() {
    let dir = tempfile::tempdir().unwrap();
    let labels = PlotLabels {
      title: "t".to_string(),
      x_label: "x".to_string(),
    };
    assert!(plot_summary(&[1.0, 2.0], &[], &labels, dir.path().join("a.svg")).is_err());
    assert!(plot_summary(&[], &[], &labels, dir.path().join("a.svg")).is_err());
  }

  #[test]
  fn test_labels() {
    let config = SweepConfig {
      variable: Variable::Workers,
      strategy: StrategyKind::RowRanges,
      step: 4,
      max: 64,
      loops: 10,
      constant: Some(60),
    };
    let labels = PlotLabels::for_sweep(&config, Some(1.5));
    assert_eq!("Runtime vs Workers (row-ranges, 60 files, 1.50 GB)", labels.title);
    assert_eq!("Workers", labels.x_label);

    let config = SweepConfig {
      variable: Variable::Files,
      strategy: StrategyKind::FileGroups,
      constant: Some(8),
      ..config
    };
    let labels = PlotLabels::for_sweep(&config, Some(1.5));
    assert_eq!("Runtime vs Size (file-groups(8))", labels.title);
    assert_eq!("Size (GB)", labels.x_label);
  }
}
