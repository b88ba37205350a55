use std::fmt::{Debug, Formatter};

use crate::{battery::BatteryState, quantity::energy::KilowattHours};

/// Discrete state-of-charge level expressed in quanta above the minimum SoC.
#[must_use]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EnergyLevel(pub usize);

impl Debug for EnergyLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discretization of the allowed SoC range `[min_soc, max_soc]`.
///
/// Level zero is exactly the minimum SoC, and the top level is the highest one not exceeding
/// the maximum SoC, so that every level is an allowed state.
#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct SocGrid {
    min_soc: KilowattHours,
    quantum: KilowattHours,
    max_level: EnergyLevel,
}

impl SocGrid {
    /// Build the grid with the step expressed in percent of the battery capacity.
    pub fn new(battery: &BatteryState, step_percent: f64) -> Self {
        let quantum = battery.capacity * (step_percent / 100.0);
        let max_level = if quantum > KilowattHours::ZERO {
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let max_level = ((battery.max_soc - battery.min_soc) / quantum + 1e-9).floor() as usize;
            max_level
        } else {
            0
        };
        Self { min_soc: battery.min_soc, quantum, max_level: EnergyLevel(max_level) }
    }

    pub const fn max_level(self) -> EnergyLevel {
        self.max_level
    }

    #[must_use]
    pub const fn n_levels(self) -> usize {
        self.max_level.0 + 1
    }

    pub const fn quantum(self) -> KilowattHours {
        self.quantum
    }

    /// Nearest level to the energy, clamped to the grid.
    #[expect(clippy::cast_possible_truncation)]
    #[expect(clippy::cast_sign_loss)]
    pub fn quantize(self, energy: KilowattHours) -> EnergyLevel {
        if self.quantum <= KilowattHours::ZERO {
            return EnergyLevel(0);
        }
        let level = ((energy - self.min_soc) / self.quantum).round().max(0.0) as usize;
        EnergyLevel(level.min(self.max_level.0))
    }

    /// Number of whole quanta within the energy, rounded down.
    #[expect(clippy::cast_possible_truncation)]
    #[expect(clippy::cast_sign_loss)]
    #[must_use]
    pub fn floor_quanta(self, energy: KilowattHours) -> usize {
        if self.quantum <= KilowattHours::ZERO {
            return 0;
        }
        (energy / self.quantum + 1e-9).floor().max(0.0) as usize
    }

    /// Convert the level back to conventional energy.
    #[expect(clippy::cast_precision_loss)]
    pub fn dequantize(self, level: EnergyLevel) -> KilowattHours {
        self.min_soc + self.quantum * (level.0 as f64)
    }

    pub fn levels(self) -> impl Iterator<Item = EnergyLevel> {
        (0..=self.max_level.0).map(EnergyLevel)
    }
}
