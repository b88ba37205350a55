use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};
use itertools::Itertools;
use tariff_pilot::{
    attribution::{AttributionShares, PeriodAttribution, SavingsAttribution},
    dispatch::DispatchDecision,
    plan::Plan,
    quantity::{cost::Cost, power::Kilowatts, rate::KilowattHourRate},
    recommendation::Recommendation,
    tariff::{TariffPeriod, TariffSchedule},
};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

fn rate_color(rate: KilowattHourRate, median_rate: KilowattHourRate) -> Color {
    if rate >= median_rate { Color::Red } else { Color::Green }
}

#[must_use]
pub fn build_dispatch_table(decisions: &[DispatchDecision]) -> Table {
    let rates = decisions.iter().map(|decision| decision.tariff_rate).sorted().collect_vec();
    let median_rate = rates.get(rates.len() / 2).copied().unwrap_or(KilowattHourRate::ZERO);

    let mut table = new_table();
    table.set_header(vec![
        "Start",
        "End",
        "Rate",
        "Consumption",
        "Solar",
        "Grid",
        "Battery",
        "Before",
        "After",
        "Cost",
    ]);
    for decision in decisions {
        table.add_row(vec![
            Cell::new(decision.interval.start.format("%a %H:%M")),
            Cell::new(decision.interval.end.format("%H:%M")).add_attribute(Attribute::Dim),
            Cell::new(decision.tariff_rate).fg(rate_color(decision.tariff_rate, median_rate)),
            Cell::new(decision.consumption).set_alignment(CellAlignment::Right),
            Cell::new(decision.solar).set_alignment(CellAlignment::Right).fg(
                if decision.solar > Kilowatts::ZERO { Color::Green } else { Color::Reset },
            ),
            Cell::new(decision.grid_draw).set_alignment(CellAlignment::Right),
            Cell::new(decision.battery_flow).set_alignment(CellAlignment::Right).fg(
                if decision.battery_flow > Kilowatts::ZERO {
                    Color::Green
                } else if decision.battery_flow < Kilowatts::ZERO {
                    Color::Red
                } else {
                    Color::Reset
                },
            ),
            Cell::new(decision.soc_before).set_alignment(CellAlignment::Right),
            Cell::new(decision.soc_after).set_alignment(CellAlignment::Right),
            Cell::new(decision.cost).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

#[must_use]
pub fn build_assignments_table(plan: &Plan) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Appliance", "Power", "Start", "Slot", "Cost", "Saving"]);
    for appliance in &plan.appliances {
        let power = Cell::new(appliance.power).set_alignment(CellAlignment::Right);
        if let Some(assignment) = plan.assignment(&appliance.id) {
            table.add_row(vec![
                Cell::new(&appliance.id),
                power,
                Cell::new(assignment.start.format("%a %H:%M")),
                Cell::new(assignment.start_slot)
                    .set_alignment(CellAlignment::Right)
                    .add_attribute(Attribute::Dim),
                Cell::new(assignment.expected_cost).set_alignment(CellAlignment::Right),
                Cell::new(assignment.saving).set_alignment(CellAlignment::Right).fg(
                    if assignment.saving > Cost::ZERO { Color::Green } else { Color::Reset },
                ),
            ]);
        } else if let Some(failure) =
            plan.failures.iter().find(|failure| failure.appliance_id == appliance.id)
        {
            table.add_row(vec![
                Cell::new(&appliance.id),
                power,
                Cell::new(failure.reason).fg(Color::Red),
                Cell::new(""),
                Cell::new(""),
                Cell::new(""),
            ]);
        } else {
            table.add_row(vec![
                Cell::new(&appliance.id),
                power,
                Cell::new("fixed").add_attribute(Attribute::Dim),
                Cell::new(""),
                Cell::new(""),
                Cell::new(""),
            ]);
        }
    }
    table
}

#[must_use]
pub fn build_recommendations_table(recommendations: &[Recommendation]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["#", "Kind", "Entity", "Saving", "Confidence", "Summary"]);
    for recommendation in recommendations {
        table.add_row(vec![
            Cell::new(recommendation.priority).add_attribute(Attribute::Dim),
            Cell::new(recommendation.kind).fg(recommendation.kind.color()),
            Cell::new(&recommendation.affected_entity),
            Cell::new(recommendation.expected_saving)
                .set_alignment(CellAlignment::Right)
                .fg(Color::Green),
            Cell::new(format!("{:.0}%", recommendation.confidence * 100.0))
                .set_alignment(CellAlignment::Right),
            Cell::new(&recommendation.summary),
        ]);
    }
    table
}

#[must_use]
pub fn build_attribution_table(attribution: &SavingsAttribution) -> Table {
    let shares = attribution.shares();
    let share = |select: fn(&AttributionShares) -> f64| {
        shares.as_ref().map_or_else(String::new, |shares| format!("{:.0}%", select(shares) * 100.0))
    };
    let amount = |cost: Cost| {
        Cell::new(cost).set_alignment(CellAlignment::Right).fg(if cost >= Cost::ZERO {
            Color::Green
        } else {
            Color::Red
        })
    };

    let mut table = new_table();
    table.set_header(vec!["Component", "Amount", "Share"]);
    table.add_row(vec![
        Cell::new("Tariff shift"),
        amount(attribution.tariff_shift),
        Cell::new(share(|shares| shares.tariff_shift)).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Solar self-consumption"),
        amount(attribution.solar_self_consumption),
        Cell::new(share(|shares| shares.solar_self_consumption))
            .set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Battery arbitrage"),
        amount(attribution.battery_arbitrage),
        Cell::new(share(|shares| shares.battery_arbitrage)).set_alignment(CellAlignment::Right),
    ]);
    if !(attribution.metered_battery_arbitrage - attribution.battery_arbitrage).is_negligible() {
        table.add_row(vec![
            Cell::new("Battery arbitrage, metered").add_attribute(Attribute::Dim),
            amount(attribution.metered_battery_arbitrage),
            Cell::new(""),
        ]);
    }
    table.add_row(vec![
        Cell::new("Baseline").add_attribute(Attribute::Dim),
        Cell::new(attribution.baseline_cost).set_alignment(CellAlignment::Right),
        Cell::new(""),
    ]);
    table.add_row(vec![
        Cell::new("Actual").add_attribute(Attribute::Dim),
        Cell::new(attribution.actual_cost).set_alignment(CellAlignment::Right),
        Cell::new(attribution.solar_self_consumption_ratio.map_or_else(String::new, |ratio| {
            format!("{:.0}% solar used", ratio * 100.0)
        }))
        .set_alignment(CellAlignment::Right),
    ]);
    table
}

#[must_use]
pub fn build_period_attribution_table(periods: &[PeriodAttribution]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Period", "Rate", "Consumption", "Actual", "Flat", "Saving"]);
    for period in periods {
        table.add_row(vec![
            Cell::new(&period.label),
            Cell::new(period.rate).set_alignment(CellAlignment::Right),
            Cell::new(period.consumption).set_alignment(CellAlignment::Right),
            Cell::new(period.actual_cost).set_alignment(CellAlignment::Right),
            Cell::new(period.flat_cost)
                .set_alignment(CellAlignment::Right)
                .add_attribute(Attribute::Dim),
            Cell::new(period.saving).set_alignment(CellAlignment::Right).fg(
                if period.saving >= Cost::ZERO { Color::Green } else { Color::Red },
            ),
        ]);
    }
    table
}

#[must_use]
pub fn build_tariff_table(schedule: &TariffSchedule, active: &TariffPeriod) -> Table {
    let average_rate = schedule.day_average_rate();
    let mut table = new_table();
    table.set_header(vec!["Start", "End", "Rate", "Label"]);
    for period in schedule.periods().iter().sorted_by_key(|period| period.start_offset) {
        let label = Cell::new(&period.label);
        table.add_row(vec![
            Cell::new(format_offset(period.start_offset)),
            Cell::new(format_offset(period.end_offset)).add_attribute(Attribute::Dim),
            Cell::new(period.rate).fg(rate_color(period.rate, average_rate)),
            if period == active { label.add_attribute(Attribute::Bold) } else { label },
        ]);
    }
    table
}

fn format_offset(offset: u16) -> String {
    format!("{:02}:{:02}", offset / 60, offset % 60)
}
