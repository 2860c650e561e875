/// Number of samples per channel still to be dropped from the front of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimBudget {
    remaining: u64,
}

impl TrimBudget {
    pub fn new(samples: u64) -> Self {
        Self { remaining: samples }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Charges a frame of `block_size` samples against the budget.
    ///
    /// Returns `None` when the whole frame has to be dropped, otherwise the number of leading
    /// samples to skip in each channel before forwarding the rest.
    pub fn consume(&mut self, block_size: usize) -> Option<usize> {
        let block_size = block_size as u64;
        if self.remaining >= block_size && self.remaining > 0 {
            self.remaining -= block_size;
            return None;
        }

        let skip = self.remaining;
        self.remaining = 0;
        Some(skip as usize)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, 256, Some(0), 0)]
    #[case(100, 256, Some(100), 0)]
    #[case(255, 256, Some(255), 0)]
    #[case(256, 256, None, 0)]
    #[case(1000, 256, None, 744)]
    fn test_consume(
        #[case] budget: u64,
        #[case] block_size: usize,
        #[case] skip: Option<usize>,
        #[case] remaining: u64,
    ) {
        let mut trim_budget = TrimBudget::new(budget);
        assert_eq!(trim_budget.consume(block_size), skip);
        assert_eq!(trim_budget.remaining(), remaining);
    }

    #[test]
    fn test_frame_sequence() {
        // Frames shorter than the budget are dropped whole, the next one is cut by what is left.
        let mut trim_budget = TrimBudget::new(1000);
        let frames = [192usize, 576, 4096, 4096];

        let decisions = frames.iter().map(|&block_size| trim_budget.consume(block_size)).collect::<Vec<_>>();
        assert_eq!(decisions, vec![None, None, Some(1000 - 192 - 576), Some(0)]);
        assert_eq!(trim_budget.remaining(), 0);
    }

    #[test]
    fn test_empty_budget_forwards_everything() {
        let mut trim_budget = TrimBudget::new(0);
        for block_size in [0, 1, 4096] {
            assert_eq!(trim_budget.consume(block_size), Some(0));
        }
    }
}
