use serde::{Deserialize, Serialize};

const BUCKETS: usize = 64;

/// Bucket `k` holds values in `2^k..2^(k+1)`, with 0 and 1 sharing bucket 0.
fn bucket_index(value: u64) -> usize {
    if value == 0 {
        return 0;
    }
    (63 - value.leading_zeros()) as usize
}

fn bucket_upper_bound(index: usize) -> u64 {
    if index >= BUCKETS - 1 {
        u64::MAX
    } else {
        (1u64 << (index + 1)) - 1
    }
}

/// Fixed-size log2 histogram. Memory use does not grow with the number of
/// recorded values.
#[derive(Debug, Clone)]
pub struct Log2Histogram {
    buckets: [u64; BUCKETS],
    count: u64,
    sum: u128,
    min: u64,
    max: u64,
}

impl Default for Log2Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Log2Histogram {
    pub fn new() -> Self {
        Self {
            buckets: [0; BUCKETS],
            count: 0,
            sum: 0,
            min: u64::MAX,
            max: 0,
        }
    }

    pub fn record(&mut self, value: u64) {
        self.buckets[bucket_index(value)] += 1;
        self.count += 1;
        self.sum += u128::from(value);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> Option<u64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<u64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum as f64 / self.count as f64)
    }

    /// Estimates the value at quantile `q` (0.0..=1.0) as the upper bound of
    /// the bucket holding that rank, clamped to the observed range.
    pub fn percentile(&self, q: f64) -> Option<u64> {
        if self.count == 0 {
            return None;
        }
        let q = q.clamp(0.0, 1.0);
        let rank = ((q * self.count as f64).ceil() as u64).max(1);
        let mut seen = 0u64;
        for (index, count) in self.buckets.iter().enumerate() {
            seen += count;
            if seen >= rank {
                return Some(bucket_upper_bound(index).clamp(self.min, self.max));
            }
        }
        Some(self.max)
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            buckets: self
                .buckets
                .iter()
                .enumerate()
                .filter(|(_, count)| **count > 0)
                .map(|(index, count)| HistogramBucket {
                    upper_bound: bucket_upper_bound(index),
                    count: *count,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Inclusive upper bound of the bucket.
    pub upper_bound: u64,
    pub count: u64,
}

/// Non-empty buckets of a histogram, in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub buckets: Vec<HistogramBucket>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_mapping() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(1), 0);
        assert_eq!(bucket_index(2), 1);
        assert_eq!(bucket_index(3), 1);
        assert_eq!(bucket_index(1024), 10);
        assert_eq!(bucket_index(u64::MAX), 63);
    }

    #[test]
    fn test_percentiles_stay_within_observed_range() {
        let mut hist = Log2Histogram::new();
        for v in 1..=100 {
            hist.record(v);
        }
        assert_eq!(hist.count(), 100);
        assert_eq!(hist.min(), Some(1));
        assert_eq!(hist.max(), Some(100));
        assert_eq!(hist.mean(), Some(50.5));
        // rank 50 lands in bucket 32..63
        assert_eq!(hist.percentile(0.5), Some(63));
        assert_eq!(hist.percentile(0.99), Some(100));
        assert_eq!(hist.percentile(0.0), Some(1));
    }

    #[test]
    fn test_empty_histogram() {
        let hist = Log2Histogram::new();
        assert_eq!(hist.percentile(0.5), None);
        assert_eq!(hist.mean(), None);
        assert!(hist.snapshot().buckets.is_empty());
    }
}
