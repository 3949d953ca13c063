//! Text formatting for the presentation layer

use alloy_primitives::Address;
use chrono::{DateTime, Utc};

/// `HH:MM:SS`; hours are not wrapped at 24
pub fn format_countdown(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// `0x1234...abcd`
pub fn truncate_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Relative age of a feed entry
pub fn time_ago(observed_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - observed_at).num_seconds().max(0);
    if seconds < 5 {
        "just now".to_string()
    } else if seconds < 60 {
        format!("{}s ago", seconds)
    } else {
        format!("{}m ago", seconds / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(0), "00:00:00");
        assert_eq!(format_countdown(1800), "00:30:00");
        assert_eq!(format_countdown(86_399), "23:59:59");
        assert_eq!(format_countdown(90_061), "25:01:01");
    }

    #[test]
    fn test_truncate_address() {
        let addr = Address::repeat_byte(0xab);
        let short = truncate_address(&addr);
        assert!(short.starts_with("0x"));
        assert_eq!(short.len(), 13);
        assert!(short.to_lowercase().ends_with("abab"));
        assert_eq!(&short[6..9], "...");
    }

    #[test]
    fn test_time_ago() {
        let now = Utc::now();
        assert_eq!(time_ago(now, now), "just now");
        assert_eq!(time_ago(now - Duration::seconds(4), now), "just now");
        assert_eq!(time_ago(now - Duration::seconds(42), now), "42s ago");
        assert_eq!(time_ago(now - Duration::seconds(125), now), "2m ago");
        // Clock skew never yields a negative age
        assert_eq!(time_ago(now + Duration::seconds(30), now), "just now");
    }
}
