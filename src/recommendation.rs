//! Actionable suggestions derived from the plan and the savings attribution.

mod candidates;
mod ranker;

use std::fmt::{Display, Formatter};

use chrono::NaiveDateTime;
use comfy_table::Color;
use serde::Serialize;

pub use self::ranker::{Ranker, RankerBuilder, rank};
use crate::quantity::cost::Cost;

#[derive(Debug, Hash, Ord, PartialOrd, Serialize, clap::ValueEnum, enumset::EnumSetType)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    /// A fixed appliance would be cheaper to start later.
    ShiftAppliance,

    /// Large gap between the cheapest and the most expensive slot of a day.
    PriceSpread,

    /// Solar production that would be exported instead of consumed.
    SolarSurplus,

    /// Consumption concentrated in expensive periods.
    OffPeakUsage,
}

impl Display for RecommendationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShiftAppliance => write!(f, "Shift appliance"),
            Self::PriceSpread => write!(f, "Price spread"),
            Self::SolarSurplus => write!(f, "Solar surplus"),
            Self::OffPeakUsage => write!(f, "Off-peak usage"),
        }
    }
}

impl RecommendationKind {
    pub const fn color(self) -> Color {
        match self {
            Self::ShiftAppliance => Color::Cyan,
            Self::PriceSpread => Color::DarkYellow,
            Self::SolarSurplus => Color::Green,
            Self::OffPeakUsage => Color::Blue,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub affected_entity: String,
    pub expected_saving: Cost,

    /// Certainty in `0.0..=1.0`.
    pub confidence: f64,

    /// One-based rank after the ranking, zero before.
    pub priority: usize,

    /// Earliest moment the suggestion applies to.
    pub earliest_start: NaiveDateTime,

    pub summary: String,
}

impl Recommendation {
    #[must_use]
    pub fn score(&self) -> f64 {
        self.confidence * self.expected_saving.0
    }
}
