//! Remaining-time estimation.

use std::time::Duration;

/// Estimates the time left from the average time per processed record.
///
/// Returns `None` until at least one record has been processed.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate_remaining(elapsed: Duration, processed: u64, total: u64) -> Option<Duration> {
    if processed == 0 {
        return None;
    }
    let per_record = elapsed.as_secs_f64() / processed as f64;
    let remaining = total.saturating_sub(processed) as f64;
    Duration::try_from_secs_f64(per_record * remaining).ok()
}

/// Formats a duration as `HH:MM:SS`, flooring every component.
#[must_use]
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Formats an optional estimate, `N/A` when unavailable.
#[must_use]
pub fn format_eta(eta: Option<Duration>) -> String {
    eta.map_or_else(|| "N/A".to_string(), format_hms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_before_first_record() {
        assert_eq!(estimate_remaining(Duration::from_secs(5), 0, 10), None);
        assert_eq!(format_eta(None), "N/A");
    }

    #[test]
    fn scales_average_by_remaining_records() {
        let eta = estimate_remaining(Duration::from_secs(10), 5, 20).unwrap();
        assert_eq!(eta, Duration::from_secs(30));
    }

    #[test]
    fn zero_when_done() {
        assert_eq!(
            estimate_remaining(Duration::from_secs(10), 4, 4),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn formats_and_floors_components() {
        assert_eq!(format_hms(Duration::from_millis(59_999)), "00:00:59");
        assert_eq!(format_hms(Duration::from_secs(3_661)), "01:01:01");
        assert_eq!(format_hms(Duration::from_secs(100 * 3600 + 5)), "100:00:05");
    }
}
