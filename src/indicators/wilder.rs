/// Wilder's smoothed average.
///
/// Until `period` samples have been seen it is the plain running mean, then each sample moves it
/// by `(sample - value) / period`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wilder {
    period: usize,
    count: usize,
    value: f64,
}

impl Wilder {
    /// Creates an empty average. A zero period behaves like a period of one.
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            count: 0,
            value: 0.0,
        }
    }

    /// Value after `sample`, without committing it.
    pub fn peek(&self, sample: f64) -> f64 {
        if self.count < self.period {
            (self.value * self.count as f64 + sample) / (self.count + 1) as f64
        } else {
            let n = self.period as f64;
            (self.value * (n - 1.0) + sample) / n
        }
    }

    /// Commits `sample` and returns the new value.
    pub fn next(&mut self, sample: f64) -> f64 {
        self.value = self.peek(sample);
        self.count = (self.count + 1).min(self.period);
        self.value
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Whether `period` samples have been committed.
    pub fn is_ready(&self) -> bool {
        self.count >= self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn seeds_with_mean() {
        let mut avg = Wilder::new(3);
        avg.next(1.0);
        avg.next(2.0);
        assert!(!avg.is_ready());
        assert_relative_eq!(avg.next(3.0), 2.0);
        assert!(avg.is_ready());
    }

    #[test]
    fn smooths_after_period() {
        let mut avg = Wilder::new(3);
        for x in [1.0, 2.0, 3.0] {
            avg.next(x);
        }
        assert_relative_eq!(avg.peek(5.0), 3.0);
        assert_relative_eq!(avg.value(), 2.0);
        assert_relative_eq!(avg.next(5.0), 3.0);
    }

    #[test]
    fn zero_period() {
        let mut avg = Wilder::new(0);
        avg.next(4.0);
        assert_relative_eq!(avg.next(7.0), 7.0);
    }
}
