//! Serial-number arithmetic for the 16-bit frame and sequence counters.
//!
//! Both counters wrap at 2^16, so plain `<` breaks at the wrap point. A value
//! is "newer" when it lies less than half the number space ahead.

/// Signed distance from `from` to `to`, in the range `-32768..=32767`.
pub fn distance(from: u16, to: u16) -> i32 {
    to.wrapping_sub(from) as i16 as i32
}

/// Whether `candidate` comes after `reference` in stream order.
pub fn is_newer(candidate: u16, reference: u16) -> bool {
    distance(reference, candidate) > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ordering() {
        assert!(is_newer(5, 4));
        assert!(!is_newer(4, 5));
        assert!(!is_newer(7, 7));
    }

    #[test]
    fn wraparound_is_next() {
        assert!(is_newer(0, 65535));
        assert!(!is_newer(65535, 0));
        assert_eq!(distance(65535, 0), 1);
        assert_eq!(distance(0, 65535), -1);
    }

    #[test]
    fn half_space_boundary() {
        assert_eq!(distance(0, 32767), 32767);
        assert_eq!(distance(0, 32768), -32768);
        assert!(!is_newer(32768, 0));
    }
}
