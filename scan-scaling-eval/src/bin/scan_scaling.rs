use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use scan_scaling_eval::{
  dataset::Dataset,
  logging::init_logger,
  measure::{measure, StrategyKind},
  plot::{plot_summary, PlotLabels},
  redistribute::redistribute,
  sweep::{RuntimeTable, SweepConfig, Variable},
  util::generate_dataset,
  Selection,
};

/// Times read-filter-extract scans of a Parquet dataset under different parallel strategies.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
  /// Log progress at info level (RUST_LOG overrides)
  #[clap(long, short, global = true)]
  verbose: bool,
  #[clap(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Write a synthetic candidate dataset
  Generate {
    #[clap(long, short, help = "Output dataset directory")]
    output: PathBuf,
    #[clap(long, default_value_t = 8)]
    files: usize,
    #[clap(long, default_value_t = 100_000)]
    rows: usize,
    #[clap(long, default_value_t = 16_384)]
    row_group_size: usize,
    #[clap(long, default_value_t = 0)]
    seed: u64,
  },
  /// Time a single scan of the first files of a dataset
  Measure {
    #[clap(long, help = "Dataset directory")]
    dataset: PathBuf,
    #[clap(long, help = "Number of files to read")]
    files: usize,
    #[clap(long, value_enum, default_value_t = StrategyKind::Sequential)]
    strategy: StrategyKind,
    #[clap(long, default_value_t = 0)]
    workers: usize,
  },
  /// Record a runtime sweep into a CSV table
  Sweep {
    #[clap(long, help = "Dataset directory")]
    dataset: PathBuf,
    #[clap(flatten)]
    sweep: SweepArgs,
  },
  /// Plot a runtime table, running its sweep first if it does not exist yet
  Plot {
    #[clap(long, help = "Dataset directory, needed to run a sweep or to plot against size")]
    dataset: Option<PathBuf>,
    #[clap(flatten)]
    sweep: SweepArgs,
    #[clap(long, default_value = "figures")]
    figures: PathBuf,
    #[clap(long, value_enum, default_value_t = ImageFormat::Png)]
    format: ImageFormat,
  },
  /// Rewrite a dataset into a given number of files with near-equal row counts
  Redistribute {
    #[clap(long, help = "Input dataset directory")]
    dataset: PathBuf,
    #[clap(long, short, help = "Output directory, must be empty")]
    output: PathBuf,
    #[clap(long)]
    files: usize,
  },
}

#[derive(Args, Debug)]
struct SweepArgs {
  #[clap(long, value_enum)]
  variable: Variable,
  #[clap(long, value_enum, default_value_t = StrategyKind::Sequential)]
  strategy: StrategyKind,
  #[clap(long)]
  step: usize,
  #[clap(long)]
  max: usize,
  #[clap(long, default_value_t = 10)]
  loops: usize,
  #[clap(long, help = "File count for a worker sweep, worker count for a file sweep")]
  constant: Option<usize>,
  #[clap(long, default_value = "results", help = "Directory of runtime tables")]
  results: PathBuf,
}

impl SweepArgs {
  fn config(&self) -> SweepConfig {
    SweepConfig {
      variable: self.variable,
      strategy: self.strategy,
      step: self.step,
      max: self.max,
      loops: self.loops,
      constant: self.constant,
    }
  }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ImageFormat {
  Png,
  Svg,
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logger(cli.verbose);

  match cli.command {
    Command::Generate {
      output,
      files,
      rows,
      row_group_size,
      seed,
    } => {
      let paths = generate_dataset(&output, files, rows, row_group_size, seed)?;
      println!("wrote {} files to {}", paths.len(), output.display());
    }
    Command::Measure {
      dataset,
      files,
      strategy,
      workers,
    } => {
      let dataset = Dataset::open(dataset)?;
      let strategy = strategy.with_workers(workers);
      let measurement = measure(&dataset, files, strategy, &Selection::candidate())?;
      println!(
        "{}\t{}\t{}\t{:.6}",
        files,
        strategy,
        measurement.values.len(),
        measurement.elapsed.as_secs_f64()
      );
    }
    Command::Sweep { dataset, sweep } => {
      let dataset = Dataset::open(dataset)?;
      let path = sweep
        .config()
        .run(&dataset, &sweep.results, &Selection::candidate())?;
      println!("{}", path.display());
    }
    Command::Plot {
      dataset,
      sweep,
      figures,
      format,
    } => {
      let config = sweep.config();
      config.validate()?;
      let dataset = dataset.map(Dataset::open).transpose()?;

      let table_path = sweep.results.join(config.file_name());
      if !table_path.exists() {
        let dataset = dataset.as_ref().with_context(|| {
          format!(
            "{} does not exist and no dataset was given to run the sweep",
            table_path.display()
          )
        })?;
        config.run(dataset, &sweep.results, &Selection::candidate())?;
      }

      let table = RuntimeTable::read(&table_path)?;
      let (x, size_gib) = match (&dataset, config.variable) {
        (Some(dataset), Variable::Files) => {
          let x = table
            .x
            .iter()
            .map(|&files| dataset.total_size_gib(files as usize))
            .collect::<Result<Vec<_>>>()?;
          let size = x.last().copied();
          (x, size)
        }
        (Some(dataset), Variable::Workers) => (
          table.x.clone(),
          Some(dataset.total_size_gib(config.constant.unwrap_or(0))?),
        ),
        (None, _) => (table.x.clone(), None),
      };

      let labels = PlotLabels::for_sweep(&config, size_gib);
      let extension = match format {
        ImageFormat::Png => "png",
        ImageFormat::Svg => "svg",
      };
      let output = figures.join(
        table_path
          .with_extension(extension)
          .file_name()
          .context("runtime table has no file name")?,
      );
      plot_summary(&x, &table.summaries(), &labels, &output)?;
      println!("{}", output.display());
    }
    Command::Redistribute {
      dataset,
      output,
      files,
    } => {
      let dataset = Dataset::open(dataset)?;
      let written = redistribute(&dataset, &output, files)?;
      println!("wrote {} files to {}", written.len(), output.display());
    }
  }

  Ok(())
}
