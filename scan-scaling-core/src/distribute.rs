use std::ops::Range;

use crate::{PartitionError, Result};

/// Split `n_items` whole items (files) into contiguous groups, one per worker.
///
/// The first `n_items % n_workers` groups get one extra item. With more workers than items, only
/// `n_items` single-item groups are produced, so no worker is handed an empty group.
pub fn distribute(n_items: usize, n_workers: usize) -> Result<Vec<Range<usize>>> {
  if n_workers == 0 {
    return Err(PartitionError::InvalidArgument(
      "number of workers must be at least 1".to_string(),
    ));
  }

  let base = n_items / n_workers;
  let extra = n_items % n_workers;

  let mut groups = Vec::with_capacity(n_workers.min(n_items));
  let mut start = 0;
  for worker in 0..n_workers.min(n_items) {
    let size = if worker < extra { base + 1 } else { base };
    groups.push(start..start + size);
    start += size;
  }

  Ok(groups)
}
