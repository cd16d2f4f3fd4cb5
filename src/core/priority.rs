//! Priority levels for process update throttling.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Update priority of a process while it runs in the background.
///
/// Higher value = more frequent updates. Foreground (Running) processes
/// always update every tick regardless of priority.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background updates at most 10 times per second
    Low = 0,
    /// Background updates at most 30 times per second
    #[default]
    Normal = 1,
    /// Background updates every tick
    High = 2,
}

impl Priority {
    /// Minimum accumulated time between background updates.
    ///
    /// `None` means the process is never throttled.
    pub const fn background_interval(self) -> Option<Duration> {
        match self {
            Self::High => None,
            // 1/30 s
            Self::Normal => Some(Duration::from_nanos(33_333_333)),
            // 1/10 s
            Self::Low => Some(Duration::from_millis(100)),
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_background_interval() {
        assert_eq!(Priority::High.background_interval(), None);
        assert_eq!(
            Priority::Low.background_interval(),
            Some(Duration::from_millis(100))
        );
        let normal = Priority::Normal.background_interval().unwrap();
        assert!(normal > Duration::from_millis(33) && normal < Duration::from_millis(34));
    }

    #[test]
    fn test_priority_serde() {
        #[derive(Deserialize)]
        struct Wrap {
            p: Priority,
        }
        let w: Wrap = toml::from_str("p = \"low\"").unwrap();
        assert_eq!(w.p, Priority::Low);
    }
}
