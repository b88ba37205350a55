use std::collections::{HashMap, hash_map::Entry};

use bon::{Builder, builder};
use enumset::EnumSet;
use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::{
    attribution::SavingsAttribution,
    forecast::effective_confidence,
    plan::Plan,
    prelude::*,
    quantity::cost::Cost,
    recommendation::{Recommendation, RecommendationKind, candidates},
    settings::RecommendationSettings,
};

#[derive(Builder)]
#[builder(finish_fn(vis = ""))]
pub struct Ranker<'a> {
    plan: &'a Plan,
    attribution: Option<&'a SavingsAttribution>,
    settings: &'a RecommendationSettings,

    #[builder(default = EnumSet::all())]
    kinds: EnumSet<RecommendationKind>,
}

impl<S: ranker_builder::IsComplete> RankerBuilder<'_, S> {
    pub fn rank(self) -> Vec<Recommendation> {
        self.build().rank()
    }
}

impl Ranker<'_> {
    #[instrument(skip_all, name = "Ranking the recommendations…", fields(kinds = ?self.kinds))]
    fn rank(self) -> Vec<Recommendation> {
        let mut candidates = Vec::new();
        if self.kinds.contains(RecommendationKind::ShiftAppliance) {
            candidates.extend(candidates::shift_appliance(self.plan));
        }
        if self.kinds.contains(RecommendationKind::PriceSpread) {
            candidates.extend(candidates::price_spread(self.plan, self.settings));
        }
        if self.kinds.contains(RecommendationKind::SolarSurplus) {
            candidates.extend(candidates::solar_surplus(self.plan));
        }
        if self.kinds.contains(RecommendationKind::OffPeakUsage)
            && let Some(attribution) = self.attribution
        {
            candidates.extend(candidates::off_peak_usage(self.plan, attribution));
        }
        let n_candidates = candidates.len();
        let recommendations = rank(
            candidates.into_iter().filter(|candidate| {
                candidate.expected_saving > Cost::ZERO
                    && candidate.expected_saving >= self.settings.min_saving
            }),
            self.settings.cap,
        );
        info!(n_candidates, n_recommendations = recommendations.len(), "ranked");
        recommendations
    }
}

/// Deduplicate by kind and entity, order by descending score, cap, and assign the priorities.
///
/// Equal scores are ordered by the earlier start.
pub fn rank(
    candidates: impl IntoIterator<Item = Recommendation>,
    cap: usize,
) -> Vec<Recommendation> {
    let mut best: HashMap<(RecommendationKind, String), Recommendation> = HashMap::new();
    for candidate in candidates {
        let candidate = Recommendation {
            confidence: effective_confidence(Some(candidate.confidence)),
            ..candidate
        };
        match best.entry((candidate.kind, candidate.affected_entity.clone())) {
            Entry::Occupied(mut entry) => {
                if candidate.score() > entry.get().score() {
                    entry.insert(candidate);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(candidate);
            }
        }
    }
    best.into_values()
        .sorted_by(|lhs, rhs| {
            OrderedFloat(rhs.score())
                .cmp(&OrderedFloat(lhs.score()))
                .then_with(|| lhs.earliest_start.cmp(&rhs.earliest_start))
                .then_with(|| lhs.kind.cmp(&rhs.kind))
                .then_with(|| lhs.affected_entity.cmp(&rhs.affected_entity))
        })
        .take(cap)
        .enumerate()
        .map(|(index, recommendation)| Recommendation { priority: index + 1, ..recommendation })
        .collect()
}
