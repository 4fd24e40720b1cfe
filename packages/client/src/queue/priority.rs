use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Request priority. Lower value is served first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
    Idle = 4,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Idle,
    ];

    #[must_use]
    pub fn value(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_value(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// Promote by `tiers` levels for starvation relief.
    ///
    /// Boosting stops at `High`: only work submitted as `Critical` runs at
    /// `Critical`, so boosted items never overtake it.
    #[must_use]
    pub fn boosted(self, tiers: u32) -> Self {
        if self == Priority::Critical {
            return self;
        }
        let floor = u32::from(Priority::High.value());
        let target = u32::from(self.value()).saturating_sub(tiers).max(floor);
        u8::try_from(target)
            .ok()
            .and_then(Self::from_value)
            .unwrap_or(Priority::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Idle => "idle",
        };
        f.write_str(name)
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            "idle" => Ok(Priority::Idle),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_urgency() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::Low < Priority::Idle);
    }

    #[test]
    fn boost_is_capped_below_critical() {
        assert_eq!(Priority::Idle.boosted(1), Priority::Low);
        assert_eq!(Priority::Idle.boosted(3), Priority::High);
        assert_eq!(Priority::Idle.boosted(100), Priority::High);
        assert_eq!(Priority::Critical.boosted(5), Priority::Critical);
        assert_eq!(Priority::Normal.boosted(0), Priority::Normal);
    }

    #[test]
    fn parses_any_case() {
        assert_eq!("CRITICAL".parse::<Priority>(), Ok(Priority::Critical));
        assert!("urgent".parse::<Priority>().is_err());
    }
}
