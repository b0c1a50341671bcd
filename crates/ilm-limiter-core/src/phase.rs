use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle phase, in the order indices move through them.
///
/// The derived `Ord` is the phase order: `Hot < Warm < Cold < Frozen < Delete`.
/// `Delete` is the terminal sink and is never subject to a size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Hot,
    Warm,
    Cold,
    Frozen,
    Delete,
}

impl Phase {
    /// All phases in lifecycle order.
    pub const ALL: [Phase; 5] = [
        Phase::Hot,
        Phase::Warm,
        Phase::Cold,
        Phase::Frozen,
        Phase::Delete,
    ];

    /// Returns the canonical lowercase name used by the cluster.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
            Self::Frozen => "frozen",
            Self::Delete => "delete",
        }
    }

    /// Position of the phase in lifecycle order, starting at 0.
    #[must_use]
    pub const fn ordinal(&self) -> usize {
        *self as usize
    }

    /// The phase immediately following this one, if any.
    #[must_use]
    pub fn next(&self) -> Option<Phase> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }

    /// Whether this is the last phase in the order.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }

    /// Phases strictly after this one, nearest first.
    pub fn successors(&self) -> impl Iterator<Item = Phase> {
        Self::ALL.into_iter().skip(self.ordinal() + 1)
    }
}

impl FromStr for Phase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" => Ok(Self::Hot),
            "warm" => Ok(Self::Warm),
            "cold" => Ok(Self::Cold),
            "frozen" => Ok(Self::Frozen),
            "delete" => Ok(Self::Delete),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
