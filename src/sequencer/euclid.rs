/// Euclidean pattern generation
use crate::constants::MAX_STEPS;
use crate::error::{Result, SequencerError};

/// Fixed-capacity step pattern; only the first `len` steps are meaningful
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    steps: [bool; MAX_STEPS],
    len: u8,
}

impl Pattern {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.len() && self.steps[index]
    }

    pub fn steps(&self) -> &[bool] {
        &self.steps[..self.len()]
    }

    pub fn active_count(&self) -> usize {
        self.steps().iter().filter(|&&s| s).count()
    }

    /// Cyclic shift left by `amount mod len`
    pub fn rotated_left(mut self, amount: usize) -> Self {
        let len = self.len();
        if len > 0 {
            self.steps[..len].rotate_left(amount % len);
        }
        self
    }
}

/// Distribute `pulses` onsets as evenly as possible across `length` steps,
/// then rotate left by `rotation`.
///
/// The accumulator starts at `length - pulses` so the first onset lands on step 0:
/// ```
/// use euclid_sqnc::generate;
/// let pattern = generate(8, 3, 0).unwrap();
/// assert_eq!(pattern.steps(), &[true, false, false, true, false, false, true, false]);
/// ```
pub fn generate(length: u8, pulses: u8, rotation: u8) -> Result<Pattern> {
    if length == 0 || length as usize > MAX_STEPS || pulses > length {
        return Err(SequencerError::PatternGeneration { length, pulses });
    }

    let mut steps = [false; MAX_STEPS];
    if pulses > 0 {
        let n = length as u32;
        let k = pulses as u32;
        let mut acc = n - k;
        for step in steps.iter_mut().take(length as usize) {
            acc += k;
            if acc >= n {
                acc -= n;
                *step = true;
            }
        }
    }

    Ok(Pattern { steps, len: length }.rotated_left(rotation as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(pattern: &Pattern) -> Vec<u8> {
        pattern.steps().iter().map(|&s| s as u8).collect()
    }

    #[test]
    fn test_classic_patterns() {
        assert_eq!(bits(&generate(8, 3, 0).unwrap()), vec![1, 0, 0, 1, 0, 0, 1, 0]);
        assert_eq!(bits(&generate(8, 5, 0).unwrap()), vec![1, 0, 1, 0, 1, 1, 0, 1]);

        let four = generate(16, 4, 0).unwrap();
        let onsets: Vec<usize> = (0..16).filter(|&i| four.get(i)).collect();
        assert_eq!(onsets, vec![0, 4, 8, 12]);
    }

    #[test]
    fn test_rotation_shifts_left() {
        assert_eq!(bits(&generate(8, 3, 1).unwrap()), vec![0, 0, 1, 0, 0, 1, 0, 1]);
        // rotation wraps modulo length
        assert_eq!(generate(8, 3, 9).unwrap(), generate(8, 3, 1).unwrap());
    }

    #[test]
    fn test_edge_cases() {
        assert_eq!(generate(5, 0, 2).unwrap().active_count(), 0);
        assert_eq!(generate(5, 5, 2).unwrap().active_count(), 5);
        assert_eq!(generate(1, 1, 0).unwrap().steps(), &[true]);
    }

    #[test]
    fn test_invalid_shapes_are_refused() {
        assert!(matches!(
            generate(0, 0, 0),
            Err(SequencerError::PatternGeneration { length: 0, pulses: 0 })
        ));
        assert!(generate(4, 5, 0).is_err());
        assert!(generate(33, 1, 0).is_err());
    }

    #[test]
    fn test_out_of_range_reads_are_inactive() {
        let pattern = generate(4, 4, 0).unwrap();
        assert!(pattern.get(3));
        assert!(!pattern.get(4));
    }
}
