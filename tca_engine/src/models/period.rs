//! Calendar granularity used for request chunking and cache bucketing.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::TcaError;

/// Calendar period (UTC, calendar-aware where needed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingPeriod {
    /// UTC day
    Day,
    /// Monday-based, UTC
    Week,
    /// calendar months, UTC
    Month,
}

impl ChunkingPeriod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChunkingPeriod::Day => "day",
            ChunkingPeriod::Week => "week",
            ChunkingPeriod::Month => "month",
        }
    }
}

impl fmt::Display for ChunkingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkingPeriod {
    type Err = TcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "d" | "day" | "daily" => Ok(ChunkingPeriod::Day),
            "w" | "week" | "weekly" => Ok(ChunkingPeriod::Week),
            "m" | "month" | "monthly" => Ok(ChunkingPeriod::Month),
            other => Err(TcaError::Validation(format!(
                "unknown chunking period: {other}"
            ))),
        }
    }
}
