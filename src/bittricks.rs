/*!
bit tricks for offset alignment.

All alignments in this crate are powers of two, so rounding is a mask.
*/

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a nonzero power of two.  Returns `None` on overflow.
pub fn align_up(value: u64, alignment: u64) -> Option<u64> {
    debug_assert!(alignment.is_power_of_two(), "alignment {alignment} is not a power of two");
    let mask = alignment - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

pub fn is_aligned(value: u64, alignment: u64) -> bool {
    debug_assert!(alignment.is_power_of_two());
    value & (alignment - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_alignment() {
        assert_eq!(align_up(0, 256), Some(0));
        assert_eq!(align_up(1, 256), Some(256));
        assert_eq!(align_up(256, 256), Some(256));
        assert_eq!(align_up(257, 256), Some(512));
        assert_eq!(align_up(3, 4), Some(4));
        assert_eq!(align_up(u64::MAX, 256), None);
    }

    #[test]
    fn aligned() {
        assert!(is_aligned(512, 256));
        assert!(!is_aligned(300, 256));
        assert!(is_aligned(0, 4));
    }
}
