use std::time::Instant;

use bon::{Builder, builder};

use crate::{
    battery::BatteryState,
    dispatch::{
        DispatchDecision,
        DispatchPlan,
        Infeasibility,
        InfeasibleHorizonError,
        soc_grid::{EnergyLevel, SocGrid},
        solution_space::{Node, SolutionSpace, compare_final},
        transition::SlotConditions,
    },
    forecast::Forecast,
    prelude::*,
    quantity::{cost::Cost, rate::KilowattHourRate},
};

/// Dynamic-programming battery dispatch optimizer.
///
/// The state is the discretized stored energy at the slot boundary. The optimizer walks
/// the horizon forward and keeps the cheapest arrival at every level.
#[derive(Builder)]
#[builder(finish_fn(vis = ""))]
pub struct Optimizer<'a> {
    forecast: &'a Forecast,
    battery: &'a BatteryState,

    /// SoC discretization step in percent of the capacity.
    #[builder(default = 1.0)]
    soc_step_percent: f64,

    /// Compensation for the exported energy.
    #[builder(default = KilowattHourRate::ZERO)]
    feed_in_rate: KilowattHourRate,
}

impl<S: optimizer_builder::IsComplete> OptimizerBuilder<'_, S> {
    pub fn solve(self) -> Result<DispatchPlan, InfeasibleHorizonError> {
        self.build().solve()
    }
}

impl Optimizer<'_> {
    #[instrument(
        skip_all,
        name = "Optimizing the dispatch…",
        fields(n_slots = self.forecast.len(), soc = %self.battery.current_soc),
    )]
    fn solve(self) -> Result<DispatchPlan, InfeasibleHorizonError> {
        let start_time = Instant::now();
        let n_slots = self.forecast.len();
        if n_slots == 0 {
            return Ok(DispatchPlan::default());
        }

        let grid = SocGrid::new(self.battery, self.soc_step_percent);
        let duration = self.forecast.slot_hours();
        let efficiency = self.battery.one_way_efficiency();
        let max_up = grid.floor_quanta(self.battery.max_charge * duration * efficiency);
        let max_down = grid.floor_quanta(self.battery.max_discharge * duration / efficiency);
        let initial_level = grid.quantize(self.battery.current_soc);

        let mut space = SolutionSpace::new(n_slots, grid.max_level());
        let mut frontier: Vec<Option<Cost>> = vec![None; grid.n_levels()];
        frontier[initial_level.0] = Some(Cost::ZERO);
        let mut baseline_cost = Cost::ZERO;

        for (slot, point) in self.forecast.points().iter().enumerate() {
            let conditions = SlotConditions::new(point, duration, self.feed_in_rate, self.battery)
                .map_err(|reason| InfeasibleHorizonError { slot, reason })?;
            baseline_cost += conditions.idle().cost;

            let mut next_frontier = vec![None; grid.n_levels()];
            for (previous, previous_cost) in frontier
                .iter()
                .enumerate()
                .filter_map(|(level, cost)| Some((EnergyLevel(level), (*cost)?)))
            {
                let energy_before = grid.dequantize(previous);
                let lowest = previous.0.saturating_sub(max_down);
                let highest = (previous.0 + max_up).min(grid.max_level().0);
                for level in (lowest..=highest).map(EnergyLevel) {
                    let Some(transition) =
                        conditions.simulate(grid.dequantize(level) - energy_before)
                    else {
                        continue;
                    };
                    let cost = previous_cost + transition.cost;
                    let node = space.get_mut(slot, level);
                    if node.is_none_or(|node| node.is_worse_than(cost, previous)) {
                        *node = Some(Node { cost, previous, transition });
                        next_frontier[level.0] = Some(cost);
                    }
                }
            }
            if next_frontier.iter().all(Option::is_none) {
                return Err(InfeasibleHorizonError { slot, reason: Infeasibility::NoTransition });
            }
            frontier = next_frontier;
        }

        let (final_level, total_cost) = space
            .finals()
            .min_by(|lhs, rhs| compare_final(*lhs, *rhs))
            .ok_or(InfeasibleHorizonError {
                slot: n_slots - 1,
                reason: Infeasibility::NoTransition,
            })?;
        let nodes = space.backtrack(final_level).ok_or(InfeasibleHorizonError {
            slot: n_slots - 1,
            reason: Infeasibility::NoTransition,
        })?;

        let decisions = nodes
            .into_iter()
            .enumerate()
            .map(|(slot, (level, node))| {
                let point = &self.forecast.points()[slot];
                DispatchDecision {
                    interval: self.forecast.interval(slot),
                    tariff_rate: point.tariff_rate,
                    consumption: point.consumption,
                    solar: point.solar,
                    grid_draw: node.transition.grid_draw,
                    battery_flow: node.transition.battery_flow,
                    solar_used: node.transition.solar_used,
                    solar_exported: node.transition.solar_exported,
                    soc_before: grid.dequantize(node.previous),
                    soc_after: grid.dequantize(level),
                    cost: node.transition.cost,
                    confidence: point.confidence,
                }
            })
            .collect();

        info!(
            elapsed = ?start_time.elapsed(),
            total_cost = %total_cost,
            baseline_cost = %baseline_cost,
            "optimized",
        );
        Ok(DispatchPlan { decisions, total_cost, baseline_cost })
    }
}
