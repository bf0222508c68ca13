//! Partitioning of table id ranges across parallel readers.

/// Inclusive id range of a table slice, with its row count.
///
/// Because rows can be sparse over the id space, `count` and
/// `max_id - min_id + 1` generally differ; [`IdRange::range_batch`] scales
/// batch sizes by that density so each slice still holds roughly the
/// requested number of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdRange {
    pub min_id: u64,
    pub max_id: u64,
    pub count: u64,
}

impl IdRange {
    pub fn new(min_id: u64, max_id: u64, count: u64) -> Self {
        IdRange { min_id, max_id, count }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Scale a row-count batch up by the id density of this range.
    pub fn range_batch(&self, batch: u64) -> u64 {
        if self.count == 0 {
            return 0;
        }
        let density = (self.max_id - self.min_id + 1) as f64 / self.count as f64;
        (density * batch as f64).ceil() as u64
    }

    /// Split into contiguous per-worker id ranges covering `[min_id, max_id]`.
    ///
    /// Each worker gets at least `batch` rows; `workers == 0` defaults to
    /// twice the CPU count. A range smaller than one batch is returned whole.
    pub fn split(&self, batch: u64, workers: usize) -> Vec<IdRange> {
        if batch > self.count {
            return vec![*self];
        }

        let workers = if workers == 0 {
            (2 * num_cpus::get()) as u64
        } else {
            workers as u64
        };

        let mut worker_batch = self.count.div_ceil(workers);
        let mut workers = workers;
        if worker_batch < batch {
            worker_batch = batch;
            workers = self.count.div_ceil(worker_batch);
        }

        let worker_batch = self.range_batch(worker_batch);
        let mut ranges = Vec::with_capacity(workers as usize);
        for i in 0..workers {
            let start = self.min_id + i * worker_batch;
            if start > self.max_id {
                break;
            }
            let end = (start + worker_batch - 1).min(self.max_id);
            ranges.push(IdRange::new(start, end, end - start + 1));
        }
        ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(ranges: &[IdRange], min_id: u64, max_id: u64) {
        assert_eq!(ranges.first().unwrap().min_id, min_id);
        assert_eq!(ranges.last().unwrap().max_id, max_id);
        for pair in ranges.windows(2) {
            assert_eq!(pair[1].min_id, pair[0].max_id + 1, "gap or overlap");
        }
    }

    #[test]
    fn tiny_table_is_one_slice() {
        let r = IdRange::new(1, 50, 50);
        assert_eq!(r.split(100, 4), vec![r]);
    }

    #[test]
    fn split_covers_the_range_disjointly() {
        let r = IdRange::new(1, 1000, 1000);
        let parts = r.split(100, 4);
        assert_eq!(parts.len(), 4);
        assert_covers(&parts, 1, 1000);
    }

    #[test]
    fn worker_batches_are_raised_to_the_floor() {
        // 10 workers over 100 rows would mean 10 rows each; the 30-row floor
        // collapses that to 4 workers.
        let r = IdRange::new(1, 100, 100);
        let parts = r.split(30, 10);
        assert_eq!(parts.len(), 4);
        assert_covers(&parts, 1, 100);
    }

    #[test]
    fn sparse_ranges_scale_by_density() {
        // Ids 1..=200 but only 100 live rows: slices must stretch to cover
        // the whole id space.
        let r = IdRange::new(1, 200, 100);
        let parts = r.split(25, 4);
        assert_covers(&parts, 1, 200);
    }

    #[test]
    fn empty_range_batches_to_zero() {
        let r = IdRange::new(0, 0, 0);
        assert_eq!(r.range_batch(100), 0);
        assert!(r.is_empty());
    }
}
