//! Which steps are recorded.

use contracts::CaptureSettings;

/// Stride/offset sampling plan.
///
/// Step counter `c` runs over `0..offset + samples * stride`. It is recorded
/// iff `c >= offset` and `(c - offset) % stride == 0`, as frame number
/// `(c - offset) / stride`, so recorded indices are `0..samples`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePlan {
    pub samples: u64,
    pub stride: u64,
    pub offset: u64,
}

impl CapturePlan {
    pub fn new(samples: u64, stride: u64, offset: u64) -> Self {
        Self {
            samples,
            stride: stride.max(1),
            offset,
        }
    }

    pub fn from_settings(settings: &CaptureSettings) -> Self {
        Self::new(settings.samples, settings.stride, settings.offset)
    }

    /// Number of world steps the plan runs, saturating at `u64::MAX`
    pub fn total_steps(&self) -> u64 {
        self.samples
            .saturating_mul(self.stride)
            .saturating_add(self.offset)
    }

    /// Frame number recorded at step counter `counter`, if any
    #[inline]
    pub fn record_index(&self, counter: u64) -> Option<u64> {
        if counter < self.offset || counter >= self.total_steps() {
            return None;
        }
        let since = counter - self.offset;
        (since % self.stride == 0).then_some(since / self.stride)
    }

    /// Step counter that records frame `index`
    pub fn counter_of(&self, index: u64) -> Option<u64> {
        if index >= self.samples {
            return None;
        }
        index.checked_mul(self.stride)?.checked_add(self.offset)
    }

    /// `(counter, recorded index)` for every step of the plan
    pub fn steps(&self) -> impl Iterator<Item = (u64, Option<u64>)> + '_ {
        (0..self.total_steps()).map(|c| (c, self.record_index(c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_and_offset() {
        let plan = CapturePlan::new(3, 10, 100);
        assert_eq!(plan.total_steps(), 130);

        let recorded: Vec<(u64, u64)> = plan
            .steps()
            .filter_map(|(c, i)| i.map(|i| (c, i)))
            .collect();
        assert_eq!(recorded, vec![(100, 0), (110, 1), (120, 2)]);
    }

    #[test]
    fn test_indices_contiguous_from_zero() {
        for (samples, stride, offset) in [(5, 1, 0), (4, 3, 7), (1, 10, 100), (6, 2, 1)] {
            let plan = CapturePlan::new(samples, stride, offset);
            let indices: Vec<u64> = plan.steps().filter_map(|(_, i)| i).collect();
            assert_eq!(indices, (0..samples).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_warm_up_steps_not_recorded() {
        let plan = CapturePlan::new(2, 5, 3);
        assert_eq!(plan.record_index(0), None);
        assert_eq!(plan.record_index(2), None);
        assert_eq!(plan.record_index(3), Some(0));
        assert_eq!(plan.record_index(4), None);
        assert_eq!(plan.record_index(8), Some(1));
        assert_eq!(plan.record_index(13), None);
    }

    #[test]
    fn test_counter_of() {
        let plan = CapturePlan::new(3, 10, 100);
        assert_eq!(plan.counter_of(2), Some(120));
        assert_eq!(plan.counter_of(3), None);
    }

    #[test]
    fn test_zero_stride_treated_as_one() {
        let plan = CapturePlan::new(3, 0, 0);
        assert_eq!(plan.total_steps(), 3);
    }

    #[test]
    fn test_huge_plan_saturates() {
        let plan = CapturePlan::new(u64::MAX, 10, 100);
        assert_eq!(plan.total_steps(), u64::MAX);
        assert_eq!(plan.record_index(110), Some(1));
        assert_eq!(plan.counter_of(u64::MAX - 1), None);
    }

    #[test]
    fn test_from_default_settings() {
        let plan = CapturePlan::from_settings(&CaptureSettings::default());
        assert_eq!(plan.total_steps(), 100 + 1000 * 10);
    }
}
