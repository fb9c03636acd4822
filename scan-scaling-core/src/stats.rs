//! Summary statistics over repeated runtime measurements.

/// Mean and population standard deviation of one column of measurements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
  pub mean: f64,
  pub std_dev: f64,
}

pub fn mean(samples: &[f64]) -> Option<f64> {
  if samples.is_empty() {
    return None;
  }
  Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Population standard deviation (divides by n, not n - 1).
pub fn std_dev(samples: &[f64]) -> Option<f64> {
  let mean = mean(samples)?;
  let variance = samples
    .iter()
    .map(|value| (value - mean).powi(2))
    .sum::<f64>()
    / samples.len() as f64;
  Some(variance.sqrt())
}

/// Summarize every column of a row-major table of repetitions.
///
/// Each row is one repetition and must have the same width as the first row; columns missing from
/// a shorter row are ignored for that row. Returns an empty vector when there are no rows.
pub fn column_summaries(rows: &[Vec<f64>]) -> Vec<Summary> {
  let width = match rows.first() {
    Some(row) => row.len(),
    None => return Vec::new(),
  };

  (0..width)
    .filter_map(|col| {
      let column: Vec<f64> = rows.iter().filter_map(|row| row.get(col).copied()).collect();
      Some(Summary {
        mean: mean(&column)?,
        std_dev: std_dev(&column)?,
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_mean_and_std_dev() {
    assert_eq!(Some(2.0), mean(&[1.0, 3.0]));
    assert_eq!(Some(1.0), std_dev(&[1.0, 3.0]));
    assert_eq!(Some(0.0), std_dev(&[4.0]));
    assert_eq!(None, mean(&[]));
    assert_eq!(None, std_dev(&[]));
  }

  #[test]
  fn test_column_summaries() {
    let rows = vec![vec![1.0, 10.0, 5.0], vec![3.0, 10.0, 7.0]];
    let summaries = column_summaries(&rows);
    assert_eq!(
      vec![
        Summary {
          mean: 2.0,
          std_dev: 1.0
        },
        Summary {
          mean: 10.0,
          std_dev: 0.0
        },
        Summary {
          mean: 6.0,
          std_dev: 1.0
        },
      ],
      summaries
    );
  }

  #[test]
  fn test_column_summaries_empty() {
    assert!(column_summaries(&[]).is_empty());
  }
}
