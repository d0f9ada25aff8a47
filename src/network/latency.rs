//! Bounded sample windows for latency and accuracy tracking

use std::collections::VecDeque;

/// Fixed-size window of recent samples; oldest evicted first
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a sample. Non-finite values are rejected.
    pub fn record(&mut self, sample: f64) -> bool {
        if !sample.is_finite() {
            return false;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        true
    }

    /// Mean of the window, or `None` when empty
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = SampleWindow::new(3);
        for v in [10.0, 20.0, 30.0, 40.0] {
            window.record(v);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.average(), Some(30.0));
    }

    #[test]
    fn test_window_rejects_garbage() {
        let mut window = SampleWindow::new(4);
        assert!(!window.record(f64::NAN));
        assert!(!window.record(f64::INFINITY));
        assert!(window.is_empty());
        assert_eq!(window.average(), None);
    }
}
