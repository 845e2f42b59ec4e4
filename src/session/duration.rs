//! Compact duration grammar used by expiry settings: `<integer><s|m|h|d>`.

use regex::Regex;
use std::time::Duration;
use tracing::warn;

/// Longest accepted setting: 100 years.
pub const MAX_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Parse `15m`, `7d`, `3600s`, `12h`. Returns `None` for anything else,
/// including zero and anything longer than [`MAX_SECONDS`].
#[must_use]
pub fn parse_duration(value: &str) -> Option<Duration> {
    let re = Regex::new(r"^(\d+)([smhd])$").ok()?;
    let caps = re.captures(value.trim())?;
    let amount: u64 = caps.get(1)?.as_str().parse().ok()?;
    let unit: u64 = match caps.get(2)?.as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };

    let seconds = amount.checked_mul(unit)?;
    if seconds == 0 || seconds > MAX_SECONDS {
        return None;
    }
    Some(Duration::from_secs(seconds))
}

/// Parse a configured duration, falling back to `default` instead of failing startup.
#[must_use]
pub fn duration_or(setting: &str, value: &str, default: Duration) -> Duration {
    parse_duration(value).unwrap_or_else(|| {
        warn!(
            setting,
            value,
            default_seconds = default.as_secs(),
            "unparseable duration, using default"
        );
        default
    })
}
