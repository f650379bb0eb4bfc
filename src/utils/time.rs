//! Time helpers shared by the bounded histories.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Oldest timestamp still retained for a given retention window
pub fn retention_cutoff(older_than: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(older_than)
        .ok()
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoff_saturates_for_huge_windows() {
        assert_eq!(retention_cutoff(Duration::MAX), DateTime::<Utc>::MIN_UTC);
        assert!(retention_cutoff(Duration::from_secs(60)) < Utc::now());
    }
}
