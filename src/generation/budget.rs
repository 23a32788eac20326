/// Per-chunk noise sample allowance.
///
/// Passes call `try_spend` before sampling; once the allowance is gone the
/// pass falls back to a cheaper result and the chunk is flagged.
#[derive(Debug, Clone)]
pub struct GenerationBudget {
    remaining: usize,
    exhausted: bool,
}

impl GenerationBudget {
    pub fn new(samples: usize) -> Self {
        Self {
            remaining: samples,
            exhausted: false,
        }
    }

    #[inline]
    pub fn try_spend(&mut self, samples: usize) -> bool {
        if self.remaining >= samples {
            self.remaining -= samples;
            true
        } else {
            self.remaining = 0;
            self.exhausted = true;
            false
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_runs_out() {
        let mut budget = GenerationBudget::new(5);
        assert!(budget.try_spend(3));
        assert!(!budget.is_exhausted());
        assert!(!budget.try_spend(3));
        assert!(budget.is_exhausted());
        assert_eq!(budget.remaining(), 0);
    }
}
