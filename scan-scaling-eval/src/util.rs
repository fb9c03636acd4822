use std::{
  fs::File,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context, Result};
use arrow::{
  array::{ArrayRef, Float64Array, Int32Array, RecordBatch},
  datatypes::{DataType, Field, Schema, SchemaRef},
};
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Normal};

pub fn candidate_schema() -> SchemaRef {
  let float = |name: &str| Field::new(name, DataType::Float64, false);
  Arc::new(Schema::new(vec![
    Field::new("candidate_charge", DataType::Int32, false),
    float("candidate_cosAlpha"),
    float("candidate_vProb"),
    float("candidate_lxy"),
    float("candidate_lxyErr"),
    float("ditrack_mass"),
    float("candidate_vMass"),
  ]))
}

/// Generate `rows` synthetic B candidates. About half of them sit in the signal peak, the rest is
/// flat background, so the candidate selection keeps a few percent of the rows.
pub fn gen_candidate_batch(rng: &mut SmallRng, rows: usize) -> Result<RecordBatch> {
  let cos_alpha_tail = Exp::<f64>::new(100.0)?;
  let lxy = Exp::new(20.0)?;
  let phi_peak = Normal::new(1.019, 0.004)?;
  let signal_peak = Normal::new(5.366, 0.02)?;

  let charge = Int32Array::from_iter_values((0..rows).map(|_| rng.gen_range(-1..=1)));
  let cos_alpha = Float64Array::from_iter_values(
    (0..rows).map(|_| 1.0 - cos_alpha_tail.sample(rng).min(2.0)),
  );
  let v_prob = Float64Array::from_iter_values((0..rows).map(|_| rng.gen::<f64>()));
  let lxy_values = Float64Array::from_iter_values((0..rows).map(|_| lxy.sample(rng)));
  let lxy_err = Float64Array::from_iter_values((0..rows).map(|_| rng.gen_range(0.005..0.02)));
  let ditrack_mass = Float64Array::from_iter_values((0..rows).map(|_| phi_peak.sample(rng)));
  let v_mass = Float64Array::from_iter_values((0..rows).map(|_| {
    if rng.gen_bool(0.5) {
      signal_peak.sample(rng)
    } else {
      rng.gen_range(5.0..5.8)
    }
  }));

  let columns: Vec<ArrayRef> = vec![
    Arc::new(charge),
    Arc::new(cos_alpha),
    Arc::new(v_prob),
    Arc::new(lxy_values),
    Arc::new(lxy_err),
    Arc::new(ditrack_mass),
    Arc::new(v_mass),
  ];
  Ok(RecordBatch::try_new(candidate_schema(), columns)?)
}

/// Write `files` synthetic candidate files of `rows_per_file` rows into `dir`, named
/// `file0000.parquet`, `file0001.parquet`, ... so that name order is generation order.
///
/// File `i` is seeded with `seed + i`, so a dataset is reproducible file by file.
pub fn generate_dataset(
  dir: impl AsRef<Path>,
  files: usize,
  rows_per_file: usize,
  row_group_size: usize,
  seed: u64,
) -> Result<Vec<PathBuf>> {
  let dir = dir.as_ref();
  std::fs::create_dir_all(dir)
    .with_context(|| format!("failed to create dataset directory {}", dir.display()))?;

  let properties = WriterProperties::builder()
    .set_max_row_group_size(row_group_size.max(1))
    .build();

  let mut paths = Vec::with_capacity(files);
  for idx in 0..files {
    let mut rng = SmallRng::seed_from_u64(seed + idx as u64);
    let batch = gen_candidate_batch(&mut rng, rows_per_file)?;

    let path = dir.join(format!("file{:04}.parquet", idx));
    let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(properties.clone()))?;
    writer.write(&batch)?;
    writer.close()?;

    log::info!("generated {} ({} rows)", path.display(), rows_per_file);
    paths.push(path);
  }

  Ok(paths)
}
