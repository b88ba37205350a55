use std::cmp::Ordering;

use crate::{
    dispatch::{soc_grid::EnergyLevel, transition::Transition},
    quantity::cost::Cost,
};

/// Best known way to arrive at a given `(slot, level)` state.
#[derive(Copy, Clone, Debug)]
pub struct Node {
    /// Cumulative cost from the start of the horizon up to and including this slot.
    pub cost: Cost,

    /// Level at the start of the slot.
    pub previous: EnergyLevel,

    pub transition: Transition,
}

/// Costs within this tolerance are considered equal.
const COST_TOLERANCE: f64 = 1e-9;

impl Node {
    /// Whether the candidate arrival is preferable over this one.
    ///
    /// Ties are broken towards the higher previous level, which keeps more energy in reserve.
    #[must_use]
    pub fn is_worse_than(&self, cost: Cost, previous: EnergyLevel) -> bool {
        let difference = cost.0 - self.cost.0;
        difference < -COST_TOLERANCE
            || (difference.abs() <= COST_TOLERANCE && previous > self.previous)
    }
}

/// Compare the final costs: cheaper first, then higher level.
#[must_use]
pub fn compare_final(lhs: (EnergyLevel, Cost), rhs: (EnergyLevel, Cost)) -> Ordering {
    let difference = lhs.1.0 - rhs.1.0;
    if difference.abs() <= COST_TOLERANCE {
        rhs.0.cmp(&lhs.0)
    } else {
        lhs.1.cmp(&rhs.1)
    }
}

pub struct SolutionSpace {
    /// Energy dimension size.
    max_level: EnergyLevel,

    /// Time dimension size.
    n_slots: usize,

    /// Flattened 2D array of the nodes to speed up the lookups.
    ///
    /// Here, [`None`] means the state is unreachable.
    flat_matrix: Vec<Option<Node>>,
}

impl SolutionSpace {
    pub fn new(n_slots: usize, max_level: EnergyLevel) -> Self {
        let flat_matrix = vec![None; n_slots * (max_level.0 + 1)];
        Self { max_level, n_slots, flat_matrix }
    }

    pub fn get(&self, slot: usize, level: EnergyLevel) -> Option<&Node> {
        self.flat_matrix[self.flat_index(slot, level)].as_ref()
    }

    pub fn get_mut(&mut self, slot: usize, level: EnergyLevel) -> &mut Option<Node> {
        let flat_index = self.flat_index(slot, level);
        &mut self.flat_matrix[flat_index]
    }

    /// Reachable final states with their cumulative costs.
    pub fn finals(&self) -> impl Iterator<Item = (EnergyLevel, Cost)> {
        let last_slot = self.n_slots.checked_sub(1);
        (0..=self.max_level.0).map(EnergyLevel).filter_map(move |level| {
            self.get(last_slot?, level).map(|node| (level, node.cost))
        })
    }

    /// Walk the predecessors back from the final level.
    ///
    /// Returns the nodes in chronological order, or [`None`] if the chain is broken.
    pub fn backtrack(mut self, final_level: EnergyLevel) -> Option<Vec<(EnergyLevel, Node)>> {
        let mut level = final_level;
        let mut nodes = Vec::with_capacity(self.n_slots);
        for slot in (0..self.n_slots).rev() {
            let flat_index = self.flat_index(slot, level);
            let node = self.flat_matrix[flat_index].take()?;
            nodes.push((level, node));
            level = node.previous;
        }
        nodes.reverse();
        Some(nodes)
    }

    /// Convert the indices into the respective index in the flattened array.
    #[must_use]
    fn flat_index(&self, slot: usize, level: EnergyLevel) -> usize {
        debug_assert!(slot < self.n_slots, "slot index is out of bounds ({slot})");
        debug_assert!(level <= self.max_level);
        slot * (self.max_level.0 + 1) + level.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::Quantity;

    #[test]
    fn test_compare_final_prefers_cheaper() {
        assert_eq!(
            compare_final((EnergyLevel(5), Quantity(1.0)), (EnergyLevel(1), Quantity(2.0))),
            Ordering::Less,
        );
    }

    #[test]
    fn test_compare_final_prefers_higher_level_on_tie() {
        assert_eq!(
            compare_final((EnergyLevel(5), Quantity(1.0)), (EnergyLevel(1), Quantity(1.0))),
            Ordering::Less,
        );
    }
}
