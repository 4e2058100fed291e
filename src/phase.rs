use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating phase for the pipeline. Every stage reads its behavior from
/// the active phase, which is passed in explicitly rather than read from
/// ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// No caching, no quota, nothing blocks. Everything executes.
    Poc,
    /// Validation findings are surfaced as warnings only.
    BreakingDemo,
    /// Unsafe queries blocked, caching on, quota enforced.
    Production,
}

impl Phase {
    /// Cache lookup/insert only happens in production.
    pub fn caching_enabled(&self) -> bool {
        matches!(self, Phase::Production)
    }

    /// Whether a high-severity validation issue stops execution.
    pub fn blocks_unsafe(&self) -> bool {
        matches!(self, Phase::Production)
    }

    /// Whether the monthly team quota is enforced.
    pub fn enforces_quota(&self) -> bool {
        matches!(self, Phase::Production)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Poc => "POC",
            Phase::BreakingDemo => "BREAKING_DEMO",
            Phase::Production => "PRODUCTION",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "POC" => Ok(Phase::Poc),
            "BREAKING_DEMO" => Ok(Phase::BreakingDemo),
            "PRODUCTION" => Ok(Phase::Production),
            other => Err(format!("Unknown phase: {}", other)),
        }
    }
}
