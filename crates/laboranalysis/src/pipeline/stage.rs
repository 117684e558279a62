use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named queue an order can sit in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Incoming,
    Harvesting,
    Analyzing,
    Notifying,
    Complete,
    DeadLetter,
}

impl Stage {
    pub const fn all() -> [Self; 6] {
        [
            Self::Incoming,
            Self::Harvesting,
            Self::Analyzing,
            Self::Notifying,
            Self::Complete,
            Self::DeadLetter,
        ]
    }

    /// Collection name in the queue store.
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Harvesting => "harvesting",
            Self::Analyzing => "analyzing",
            Self::Notifying => "notifying",
            Self::Complete => "complete",
            Self::DeadLetter => "dead_letter",
        }
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Incoming => Some(Self::Harvesting),
            Self::Harvesting => Some(Self::Analyzing),
            Self::Analyzing => Some(Self::Notifying),
            Self::Notifying => Some(Self::Complete),
            Self::Complete | Self::DeadLetter => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// The three worker processes of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    Harvest,
    Analyze,
    Notify,
}

impl WorkerRole {
    pub const fn ordered() -> [Self; 3] {
        [Self::Harvest, Self::Analyze, Self::Notify]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Harvest => "Harvest",
            Self::Analyze => "Analyze",
            Self::Notify => "Notify",
        }
    }

    /// Queue the worker drains each cycle.
    pub const fn input(self) -> Stage {
        match self {
            Self::Harvest => Stage::Harvesting,
            Self::Analyze => Stage::Analyzing,
            Self::Notify => Stage::Notifying,
        }
    }

    /// Queue successful orders are moved to.
    pub const fn output(self) -> Stage {
        match self {
            Self::Harvest => Stage::Analyzing,
            Self::Analyze => Stage::Notifying,
            Self::Notify => Stage::Complete,
        }
    }

    /// Queue the worker admits new orders from before processing its input.
    pub const fn admits_from(self) -> Option<Stage> {
        match self {
            Self::Harvest => Some(Stage::Incoming),
            Self::Analyze | Self::Notify => None,
        }
    }

    /// Whether a success at this stage is also reported to the customer.
    pub const fn notifies_customer(self) -> bool {
        matches!(self, Self::Notify)
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Harvest => "harvest",
            Self::Analyze => "analyze",
            Self::Notify => "notify",
        })
    }
}

impl FromStr for WorkerRole {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "harvest" | "harvesting" => Ok(Self::Harvest),
            "analyze" | "analyzing" | "analyse" => Ok(Self::Analyze),
            "notify" | "notifying" => Ok(Self::Notify),
            other => Err(format!(
                "unknown worker role '{other}' (expected harvest, analyze, or notify)"
            )),
        }
    }
}
