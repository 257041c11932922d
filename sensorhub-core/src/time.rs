//! Time representation shared by the hub and its clients
//!
//! Sample times are nanoseconds on the hub's monotonic clock. The clock is
//! owned by the platform; the core only does arithmetic on the values.

/// Nanoseconds since hub boot
pub type Timestamp = u64;

/// Time from `earlier` to `later`, zero if the clock went backwards
pub const fn elapsed(earlier: Timestamp, later: Timestamp) -> u64 {
    later.saturating_sub(earlier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_clamps_to_zero() {
        assert_eq!(elapsed(100, 250), 150);
        assert_eq!(elapsed(250, 100), 0);
    }
}
