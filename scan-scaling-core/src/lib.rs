//! This crate provides the planning core of the scan scaling experiments: splitting an ordered
//! multi-file dataset into near-equal contiguous row ranges, one per worker.
//!
//! Everything here is pure and synchronous. Reading the ranges is the job of `scan-scaling-eval`.

pub mod distribute;
pub mod error;
pub mod stats;

pub use distribute::distribute;
pub use error::{PartitionError, Result};

/// A cursor into a chunk sequence: `offset` elements into chunk `chunk`.
///
/// `offset == count` of the chunk is only used as an end position (or as the
/// end sentinel of the whole sequence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
  pub chunk: usize,
  pub offset: u64,
}

impl Position {
  pub const fn new(chunk: usize, offset: u64) -> Self {
    Self { chunk, offset }
  }
}

/// A half-open run of elements `[start, end)` expressed in chunk coordinates.
///
/// `first..last` is the same run in the global ordering obtained by
/// concatenating all chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
  pub start: Position,
  pub end: Position,
  pub first: u64,
  pub last: u64,
}

impl Range {
  pub fn len(&self) -> u64 {
    self.last - self.first
  }

  pub fn is_empty(&self) -> bool {
    self.first == self.last
  }
}

/// The result of [`partition`]: one [`Range`] per worker, in order.
///
/// The plan keeps the validated chunk counts so that it can translate every
/// range back into per-chunk offset windows with [`PartitionPlan::spans`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
  counts: Vec<u64>,
  total: u64,
  ranges: Vec<Range>,
}

impl PartitionPlan {
  pub fn ranges(&self) -> &[Range] {
    &self.ranges
  }

  pub fn len(&self) -> usize {
    self.ranges.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ranges.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Range> {
    self.ranges.iter()
  }

  /// Total number of elements covered by the plan.
  pub fn total(&self) -> u64 {
    self.total
  }

  pub fn chunk_counts(&self) -> &[u64] {
    &self.counts
  }

  /// Split a range into `(chunk_index, offsets)` windows, skipping empty ones.
  ///
  /// Example: counts = [10, 10, 10], range = (0, 8)..(1, 6) yields
  /// `(0, 8..10)` and `(1, 0..6)`.
  pub fn spans(&self, range: &Range) -> Vec<(usize, std::ops::Range<u64>)> {
    if range.is_empty() {
      return Vec::new();
    }

    (range.start.chunk..=range.end.chunk)
      .filter_map(|chunk| {
        let lo = if chunk == range.start.chunk {
          range.start.offset
        } else {
          0
        };
        let hi = if chunk == range.end.chunk {
          range.end.offset
        } else {
          self.counts[chunk]
        };
        (hi > lo).then_some((chunk, lo..hi))
      })
      .collect()
  }
}

impl<'a> IntoIterator for &'a PartitionPlan {
  type Item = &'a Range;
  type IntoIter = std::slice::Iter<'a, Range>;

  fn into_iter(self) -> Self::IntoIter {
    self.ranges.iter()
  }
}

/// Partition an ordered sequence of chunks into `n_partitions` contiguous ranges.
///
/// The algorithm runs as follows:
/// 1. total = sum(chunk_counts), slice_size = ceil(total / n_partitions)
/// 2. Walk the chunks once with a cursor. Every slice consumes `slice_size` elements (or whatever
///    is left) starting at the cursor, crossing chunk boundaries as needed.
/// 3. Once the sequence is exhausted, the remaining slices are zero-length ranges anchored at the
///    end of the last chunk.
///
/// Because of the ceiling division earlier ranges are always full-sized and the shortfall lands on
/// the last ranges. A non-empty plan therefore always holds exactly `n_partitions` ranges, and the
/// last range ends exactly at `total`.
///
/// An empty `chunk_counts`, or a sequence with zero elements in total, gives an empty plan.
///
/// Errors with [`PartitionError::InvalidArgument`] when `n_partitions` is zero or a count is negative.
pub fn partition(chunk_counts: &[i64], n_partitions: usize) -> Result<PartitionPlan> {
  if n_partitions == 0 {
    return Err(PartitionError::InvalidArgument(
      "number of partitions must be at least 1".to_string(),
    ));
  }

  let counts = chunk_counts
    .iter()
    .enumerate()
    .map(|(idx, &count)| {
      u64::try_from(count).map_err(|_| {
        PartitionError::InvalidArgument(format!("chunk {idx} has negative count {count}"))
      })
    })
    .collect::<Result<Vec<u64>>>()?;

  let total = counts
    .iter()
    .try_fold(0u64, |sum, &count| sum.checked_add(count))
    .ok_or_else(|| PartitionError::InvalidArgument("total element count overflows".to_string()))?;
  if total == 0 {
    return Ok(PartitionPlan {
      counts,
      total,
      ranges: Vec::new(),
    });
  }

  let slice_size = total.div_ceil(n_partitions as u64);
  let mut ranges = Vec::with_capacity(n_partitions);

  let mut cursor = skip_exhausted(&counts, Position::new(0, 0));
  let mut consumed = 0;
  for _ in 0..n_partitions {
    let take = slice_size.min(total - consumed);
    let end = advance(&counts, cursor, take);

    ranges.push(Range {
      start: cursor,
      end,
      first: consumed,
      last: consumed + take,
    });

    consumed += take;
    cursor = skip_exhausted(&counts, end);
  }

  debug_assert_eq!(ranges.last().map(|range| range.last), Some(total));

  Ok(PartitionPlan {
    counts,
    total,
    ranges,
  })
}

/// Move `position` forward by `n` elements. Stops at the end of the chunk that holds the last
/// element instead of rolling over to the next chunk.
///
/// Callers guarantee `n` never exceeds the number of elements left after `position`.
fn advance(counts: &[u64], position: Position, n: u64) -> Position {
  let mut position = position;
  let mut remaining = n;
  loop {
    let available = counts[position.chunk] - position.offset;
    if remaining <= available {
      position.offset += remaining;
      return position;
    }
    remaining -= available;
    position = Position::new(position.chunk + 1, 0);
  }
}

/// Move a cursor sitting at the end of a chunk to the start of the next chunk that still has
/// elements. The end of the last chunk stays put (end sentinel).
fn skip_exhausted(counts: &[u64], position: Position) -> Position {
  let mut position = position;
  while position.offset == counts[position.chunk] && position.chunk + 1 < counts.len() {
    position = Position::new(position.chunk + 1, 0);
  }
  position
}

#[cfg(test)]
mod tests {
  use rand::{rngs::SmallRng, Rng, SeedableRng};
  use rstest::rstest;

  use crate::{partition, PartitionError, PartitionPlan, Position};

  fn lengths(plan: &PartitionPlan) -> Vec<u64> {
    plan.iter().map(|range| range.len()).collect()
  }

  /// Expand every range into global element indices via its chunk spans.
  fn covered_indices(plan: &PartitionPlan) -> Vec<u64> {
    let mut chunk_starts = vec![0];
    for count in plan.chunk_counts() {
      chunk_starts.push(chunk_starts.last().unwrap() + count);
    }

    let mut indices = Vec::new();
    for range in plan {
      let mut expected = range.first;
      for (chunk, offsets) in plan.spans(range) {
        for offset in offsets {
          let index = chunk_starts[chunk] + offset;
          assert_eq!(expected, index);
          expected += 1;
          indices.push(index);
        }
      }
      assert_eq!(expected, range.last);
    }
    indices
  }

  #[test]
  fn test_spanning_chunk_boundaries() {
    let plan = partition(&[10, 10, 10], 4).unwrap();
    assert_eq!(vec![8, 8, 8, 6], lengths(&plan));

    let ends: Vec<u64> = plan.iter().map(|range| range.last).collect();
    assert_eq!(vec![8, 16, 24, 30], ends);

    assert_eq!(Position::new(0, 8), plan.ranges()[0].end);
    assert_eq!(Position::new(0, 8), plan.ranges()[1].start);
    assert_eq!(Position::new(1, 6), plan.ranges()[1].end);
    assert_eq!(Position::new(2, 4), plan.ranges()[2].end);
    assert_eq!(Position::new(2, 10), plan.ranges()[3].end);
  }

  #[test]
  fn test_exact_division() {
    let plan = partition(&[5, 5, 5, 5], 2).unwrap();
    assert_eq!(vec![10, 10], lengths(&plan));

    // The first range ends on the boundary of chunk 1, the second starts at chunk 2.
    assert_eq!(Position::new(1, 5), plan.ranges()[0].end);
    assert_eq!(Position::new(2, 0), plan.ranges()[1].start);
    assert_eq!(Position::new(3, 5), plan.ranges()[1].end);
  }

  #[test]
  fn test_single_partition() {
    let plan = partition(&[3, 7, 2], 1).unwrap();
    assert_eq!(1, plan.len());

    let range = plan.ranges()[0];
    assert_eq!(Position::new(0, 0), range.start);
    assert_eq!(Position::new(2, 2), range.end);
    assert_eq!(0..12, range.first..range.last);
  }

  #[test]
  fn test_more_partitions_than_elements() {
    let plan = partition(&[1, 1], 5).unwrap();
    assert_eq!(vec![1, 1, 0, 0, 0], lengths(&plan));
    assert_eq!(2, plan.total());

    // Trailing ranges collapse onto the end sentinel.
    for range in &plan.ranges()[2..] {
      assert_eq!(Position::new(1, 1), range.start);
      assert_eq!(Position::new(1, 1), range.end);
      assert!(plan.spans(range).is_empty());
    }
  }

  #[test]
  fn test_negative_count() {
    let err = partition(&[3, -1, 2], 2).unwrap_err();
    assert!(matches!(err, PartitionError::InvalidArgument(_)));
  }

  #[test]
  fn test_total_overflow() {
    let err = partition(&[i64::MAX, i64::MAX, 2], 2).unwrap_err();
    assert_eq!(
      PartitionError::InvalidArgument("total element count overflows".to_string()),
      err
    );

    // Largest representable total still plans.
    let plan = partition(&[i64::MAX, i64::MAX, 1], 2).unwrap();
    assert_eq!(u64::MAX, plan.total());
    assert_eq!(Some(u64::MAX), plan.ranges().last().map(|range| range.last));
  }

  #[test]
  fn test_zero_partitions() {
    let err = partition(&[3, 1, 2], 0).unwrap_err();
    assert!(matches!(err, PartitionError::InvalidArgument(_)));
  }

  #[rstest]
  #[case(&[])]
  #[case(&[0])]
  #[case(&[0, 0, 0])]
  fn test_empty_plan(#[case] counts: &[i64]) {
    let plan = partition(counts, 3).unwrap();
    assert!(plan.is_empty());
  }

  #[test]
  fn test_zero_count_chunks_are_skipped() {
    let plan = partition(&[0, 4, 0, 0, 4, 0], 2).unwrap();
    assert_eq!(vec![4, 4], lengths(&plan));

    assert_eq!(Position::new(1, 0), plan.ranges()[0].start);
    assert_eq!(Position::new(1, 4), plan.ranges()[0].end);
    assert_eq!(Position::new(4, 0), plan.ranges()[1].start);
    assert_eq!(Position::new(4, 4), plan.ranges()[1].end);

    assert_eq!(vec![(1, 0..4)], plan.spans(&plan.ranges()[0]));
    assert_eq!(vec![(4, 0..4)], plan.spans(&plan.ranges()[1]));
  }

  #[test]
  fn test_spans_cover_middle_chunks() {
    let plan = partition(&[3, 2, 2, 3], 2).unwrap();
    assert_eq!(vec![5, 5], lengths(&plan));
    assert_eq!(vec![(0, 0..3), (1, 0..2)], plan.spans(&plan.ranges()[0]));
    assert_eq!(vec![(2, 0..2), (3, 0..3)], plan.spans(&plan.ranges()[1]));
  }

  #[test]
  fn test_deterministic() {
    let counts = [17, 0, 3, 250, 9, 1];
    assert_eq!(partition(&counts, 7).unwrap(), partition(&counts, 7).unwrap());
  }

  /// Randomized check of coverage and balance over many chunk layouts.
  #[rstest]
  #[case(1, 1)]
  #[case(4, 3)]
  #[case(16, 8)]
  #[case(64, 13)]
  #[case(128, 128)]
  fn test_coverage_and_balance(#[case] num_chunks: usize, #[case] n_partitions: usize) {
    let mut rng = SmallRng::seed_from_u64(64);

    for _ in 0..50 {
      let counts: Vec<i64> = (0..num_chunks).map(|_| rng.gen_range(0..40)).collect();
      let total: u64 = counts.iter().map(|&count| count as u64).sum();

      let plan = partition(&counts, n_partitions).unwrap();
      if total == 0 {
        assert!(plan.is_empty());
        continue;
      }

      assert_eq!(n_partitions, plan.len());
      assert_eq!((0..total).collect::<Vec<_>>(), covered_indices(&plan));
      assert_eq!(Some(total), plan.ranges().last().map(|range| range.last));

      let ceil = total.div_ceil(n_partitions as u64);
      let floor = total / n_partitions as u64;
      let non_empty: Vec<u64> = lengths(&plan).into_iter().filter(|&len| len > 0).collect();
      let (last, full) = non_empty.split_last().unwrap();
      assert!(full.iter().all(|&len| len == ceil || len == floor));
      assert!(*last <= ceil);

      // Empty ranges only ever trail the plan.
      let first_empty = lengths(&plan).iter().position(|&len| len == 0);
      if let Some(idx) = first_empty {
        assert!(plan.ranges()[idx..].iter().all(|range| range.is_empty()));
      }

      // No range starts inside a gap.
      for range in plan.iter().filter(|range| !range.is_empty()) {
        assert!(range.start.offset < counts[range.start.chunk] as u64);
      }
    }
  }
}
