//! Extension ranges of one message as a sorted list of interval boundaries.

use crate::descriptor::{MAX_FIELD_NUMBER, RESERVED_NUMBERS};

/// Why a range could not be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeViolation {
    /// Empty, out of bounds, or starting/ending inside the implementation-reserved numbers.
    Invalid(String),
    /// Intersects the already installed range `[start, end)`.
    Overlap { start: i32, end: i32 },
}

/// Non-overlapping half-open intervals `[start, end)`.
///
/// Boundaries are kept sorted; a number is inside the set iff an odd number of boundaries
/// are at or below it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionRangeSet {
    boundaries: Vec<i32>,
}

impl ExtensionRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn contains(&self, number: i32) -> bool {
        self.boundaries.partition_point(|&b| b <= number) % 2 == 1
    }

    /// The installed range containing `number`.
    pub fn range_of(&self, number: i32) -> Option<(i32, i32)> {
        let count = self.boundaries.partition_point(|&b| b <= number);
        if count % 2 == 1 {
            Some((self.boundaries[count - 1], self.boundaries[count]))
        } else {
            None
        }
    }

    pub fn ranges(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.boundaries.chunks(2).map(|pair| (pair[0], pair[1]))
    }

    /// Install `[start, end)` unless it is invalid or overlaps an installed range.
    pub fn try_add(&mut self, start: i32, end: i32) -> Result<(), RangeViolation> {
        validate(start, end)?;
        if let Some(existing) = self.overlapping(start, end) {
            return Err(RangeViolation::Overlap {
                start: existing.0,
                end: existing.1,
            });
        }
        let at = self.boundaries.partition_point(|&b| b <= start);
        self.boundaries.insert(at, start);
        self.boundaries.insert(at + 1, end);
        Ok(())
    }

    fn overlapping(&self, start: i32, end: i32) -> Option<(i32, i32)> {
        if let Some(range) = self.range_of(start) {
            return Some(range);
        }
        let first_inside = self.boundaries.partition_point(|&b| b <= start);
        match self.boundaries.get(first_inside) {
            // with `start` outside every range, the next boundary is a range start
            Some(&b) if b < end => Some((b, self.boundaries[first_inside + 1])),
            _ => None,
        }
    }
}

fn validate(start: i32, end: i32) -> Result<(), RangeViolation> {
    if start < 1 {
        return Err(RangeViolation::Invalid(format!(
            "extension numbers must be positive, got {}",
            start
        )));
    }
    if start >= end {
        return Err(RangeViolation::Invalid(format!(
            "extension range end number must be greater than start number ({} to {})",
            start,
            end - 1
        )));
    }
    if end - 1 > MAX_FIELD_NUMBER {
        return Err(RangeViolation::Invalid(format!(
            "extension range end {} exceeds maximum field number {}",
            end - 1,
            MAX_FIELD_NUMBER
        )));
    }
    if RESERVED_NUMBERS.contains(&start) || RESERVED_NUMBERS.contains(&(end - 1)) {
        return Err(RangeViolation::Invalid(format!(
            "extension range {} to {} starts or ends inside the reserved numbers {} to {}",
            start,
            end - 1,
            RESERVED_NUMBERS.start,
            RESERVED_NUMBERS.end - 1
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_is_half_open() {
        let mut set = ExtensionRangeSet::new();
        set.try_add(10, 20).unwrap();
        set.try_add(100, 200).unwrap();
        assert!(!set.contains(9));
        assert!(set.contains(10));
        assert!(set.contains(19));
        assert!(!set.contains(20));
        assert!(set.contains(150));
        assert_eq!(set.range_of(150), Some((100, 200)));
    }

    #[test]
    fn test_overlap_rejected_and_first_kept() {
        let mut set = ExtensionRangeSet::new();
        set.try_add(10, 20).unwrap();
        assert_eq!(
            set.try_add(15, 25),
            Err(RangeViolation::Overlap { start: 10, end: 20 })
        );
        assert_eq!(
            set.try_add(5, 11),
            Err(RangeViolation::Overlap { start: 10, end: 20 })
        );
        assert_eq!(set.ranges().collect::<Vec<_>>(), vec![(10, 20)]);
        // touching is fine
        set.try_add(20, 30).unwrap();
        set.try_add(1, 10).unwrap();
        assert_eq!(
            set.ranges().collect::<Vec<_>>(),
            vec![(1, 10), (10, 20), (20, 30)]
        );
    }

    #[test]
    fn test_enclosing_range_overlaps() {
        let mut set = ExtensionRangeSet::new();
        set.try_add(50, 60).unwrap();
        assert!(matches!(set.try_add(1, 100), Err(RangeViolation::Overlap { .. })));
    }

    #[test]
    fn test_invalid_ranges() {
        let mut set = ExtensionRangeSet::new();
        assert!(matches!(set.try_add(0, 5), Err(RangeViolation::Invalid(_))));
        assert!(matches!(set.try_add(20, 10), Err(RangeViolation::Invalid(_))));
        assert!(matches!(
            set.try_add(1, MAX_FIELD_NUMBER + 2),
            Err(RangeViolation::Invalid(_))
        ));
        assert!(matches!(set.try_add(19_500, 19_600), Err(RangeViolation::Invalid(_))));
        assert!(set.is_empty());
    }

    #[test]
    fn test_range_spanning_reserved_numbers_allowed() {
        let mut set = ExtensionRangeSet::new();
        set.try_add(1000, MAX_FIELD_NUMBER + 1).unwrap();
        assert!(set.contains(MAX_FIELD_NUMBER));
    }
}
