use std::cmp::Reverse;

use itertools::Itertools;

use crate::{
    attribution::SavingsAttribution,
    dispatch::DispatchDecision,
    plan::Plan,
    quantity::{cost::Cost, energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate},
    recommendation::{Recommendation, RecommendationKind},
    settings::RecommendationSettings,
};

const TIME_FORMAT: &str = "%H:%M";

fn min_confidence<'a>(decisions: impl IntoIterator<Item = &'a DispatchDecision>) -> f64 {
    decisions.into_iter().map(DispatchDecision::effective_confidence).fold(1.0, f64::min)
}

/// Fixed appliances that would be cheaper to start later within their window.
pub fn shift_appliance(plan: &Plan) -> Vec<Recommendation> {
    let n_slots = plan.dispatch.len();
    plan.appliances
        .iter()
        .filter(|appliance| {
            !appliance.deferrable
                && appliance.duration_slots != 0
                && appliance.end_slot(appliance.earliest_start).is_some_and(|end| end <= n_slots)
        })
        .filter_map(|appliance| {
            let duration = appliance.duration_slots;
            let cost_at = |start: usize| -> Cost {
                plan.dispatch[start..start + duration]
                    .iter()
                    .map(|decision| {
                        appliance.power * decision.interval.hours() * decision.tariff_rate
                    })
                    .sum()
            };
            let current_cost = cost_at(appliance.earliest_start);
            let last_start = appliance.latest_start.min(n_slots - duration);
            let (best_start, best_cost) = (appliance.earliest_start..=last_start)
                .map(|start| (start, cost_at(start)))
                .min_by_key(|(start, cost)| (*cost, *start))?;
            let saving = current_cost - best_cost;
            if saving <= Cost::ZERO {
                return None;
            }
            let current = &plan.dispatch[appliance.earliest_start];
            let best = &plan.dispatch[best_start];
            Some(Recommendation {
                kind: RecommendationKind::ShiftAppliance,
                affected_entity: appliance.id.clone(),
                expected_saving: saving,
                confidence: min_confidence(&plan.dispatch[best_start..best_start + duration]),
                priority: 0,
                earliest_start: current.interval.start,
                summary: format!(
                    "Start {} at {} instead of {} to save {saving}",
                    appliance.id,
                    best.interval.start.format(TIME_FORMAT),
                    current.interval.start.format(TIME_FORMAT),
                ),
            })
        })
        .collect()
}

/// Days with a large spread between the cheapest and the most expensive slot.
pub fn price_spread(plan: &Plan, settings: &RecommendationSettings) -> Vec<Recommendation> {
    let days = plan.dispatch.iter().chunk_by(|decision| decision.interval.start.date());
    days.into_iter()
        .filter_map(|(date, day)| {
            let day = day.collect_vec();
            let cheapest = day.iter().min_by_key(|decision| decision.tariff_rate)?;
            let priciest = day
                .iter()
                .max_by_key(|decision| (decision.tariff_rate, Reverse(decision.interval.start)))?;
            if priciest.tariff_rate <= KilowattHourRate::ZERO {
                return None;
            }
            let spread = priciest.tariff_rate - cheapest.tariff_rate;
            if spread <= KilowattHourRate::ZERO
                || spread / priciest.tariff_rate < settings.spread_ratio
            {
                return None;
            }
            Some(Recommendation {
                kind: RecommendationKind::PriceSpread,
                affected_entity: date.to_string(),
                expected_saving: settings.shiftable_energy * spread,
                confidence: min_confidence([*cheapest, *priciest]),
                priority: 0,
                earliest_start: cheapest.interval.start.min(priciest.interval.start),
                summary: format!(
                    "Move {} of usage from {} ({}) to {} ({})",
                    settings.shiftable_energy,
                    priciest.interval.start.format(TIME_FORMAT),
                    priciest.tariff_rate,
                    cheapest.interval.start.format(TIME_FORMAT),
                    cheapest.tariff_rate,
                ),
            })
        })
        .collect()
}

/// Contiguous windows of exported solar production.
pub fn solar_surplus(plan: &Plan) -> Vec<Recommendation> {
    let runs = plan.dispatch.iter().chunk_by(|decision| decision.solar_exported > Kilowatts::ZERO);
    runs.into_iter()
        .filter(|(is_exporting, _)| *is_exporting)
        .filter_map(|(_, run)| {
            let run = run.collect_vec();
            let (first, last) = (run.first()?, run.last()?);
            let exported: KilowattHours = run
                .iter()
                .map(|decision| decision.solar_exported * decision.interval.hours())
                .sum();
            let saving: Cost = run
                .iter()
                .map(|decision| {
                    decision.solar_exported
                        * decision.interval.hours()
                        * (decision.tariff_rate - plan.feed_in_rate).max(KilowattHourRate::ZERO)
                })
                .sum();
            Some(Recommendation {
                kind: RecommendationKind::SolarSurplus,
                affected_entity: first.interval.start.format("%Y-%m-%d %H:%M").to_string(),
                expected_saving: saving,
                confidence: min_confidence(run.iter().copied()),
                priority: 0,
                earliest_start: first.interval.start,
                summary: format!(
                    "Run flexible loads between {} and {} to use {exported} of exported solar",
                    first.interval.start.format(TIME_FORMAT),
                    last.interval.end.format(TIME_FORMAT),
                ),
            })
        })
        .collect()
}

/// Realized consumption that leaned towards the expensive periods.
pub fn off_peak_usage(plan: &Plan, attribution: &SavingsAttribution) -> Option<Recommendation> {
    if attribution.tariff_shift >= Cost::ZERO {
        return None;
    }
    let saving = -attribution.tariff_shift;
    Some(Recommendation {
        kind: RecommendationKind::OffPeakUsage,
        affected_entity: "consumption".to_owned(),
        expected_saving: saving,
        confidence: 1.0,
        priority: 0,
        earliest_start: plan.dispatch.first()?.interval.start,
        summary: format!(
            "Usage is concentrated in expensive periods, a flat profile would save {saving}"
        ),
    })
}
