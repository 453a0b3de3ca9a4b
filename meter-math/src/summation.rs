//! Compensated summation.

/// Running Neumaier (improved Kahan-Babuška) sum.
///
/// Keeps a separate compensation term so that adding values of very
/// different magnitude (a bright galaxy plus a faint companion) does not lose
/// the small contributions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NeumaierSum {
    sum: f64,
    compensation: f64,
}

impl NeumaierSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    pub fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

impl FromIterator<f64> for NeumaierSum {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = NeumaierSum::new();
        for v in iter {
            acc.add(v);
        }
        acc
    }
}

/// Compensated sum of an iterator of values.
pub fn neumaier_sum<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values.into_iter().collect::<NeumaierSum>().value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovers_small_terms() {
        let values = [1.0, 1e100, 1.0, -1e100];
        let naive: f64 = values.iter().sum();
        assert_eq!(naive, 0.0);
        assert_eq!(neumaier_sum(values), 2.0);
    }

    #[test]
    fn test_many_small_increments() {
        let mut acc = NeumaierSum::new();
        acc.add(1e16);
        for _ in 0..1000 {
            acc.add(1.0);
        }
        assert_eq!(acc.value(), 1e16 + 1000.0);
    }

    #[test]
    fn test_empty() {
        assert_eq!(neumaier_sum(std::iter::empty()), 0.0);
    }
}
