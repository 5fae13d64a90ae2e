//! Parameter records for the examined vehicles.
//!
//! Pack voltage limits come from the recorded data, cell limits and
//! capacities from the datasheets.

use serde::{Deserialize, Serialize};

/// Electrical parameters of one vehicle's traction battery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleParameters {
    /// Minimum cell voltage (V).
    pub min_cell_volt: f64,
    /// Maximum cell voltage (V).
    pub max_cell_volt: f64,
    /// Nominal cell capacity (Ah).
    pub nom_cell_cap: f64,
    /// Serially connected cells.
    pub n_s: u32,
    /// Parallel connected cells.
    pub n_p: u32,
    /// Maximum pack voltage seen in the data (V).
    pub max_pack_volt: f64,
    /// Minimum pack voltage seen in the data (V).
    pub min_pack_volt: f64,
    /// Nominal pack capacity (Ah).
    pub nom_pack_cap: f64,
}

const TESLA: VehicleParameters = VehicleParameters {
    min_cell_volt: 3.2,
    max_cell_volt: 3.6,
    nom_cell_cap: 161.0,
    n_s: 106,
    n_p: 1,
    max_pack_volt: 390.0,
    min_pack_volt: 340.0,
    nom_pack_cap: 161.0,
};

const VW: VehicleParameters = VehicleParameters {
    min_cell_volt: 2.8,
    max_cell_volt: 4.2,
    nom_cell_cap: 78.0,
    n_s: 108,
    n_p: 2,
    max_pack_volt: 450.0,
    min_pack_volt: 360.0,
    nom_pack_cap: 2.0 * 78.0,
};

impl VehicleParameters {
    /// Pack voltage range observed in the data, as `(lower, upper)`.
    pub fn pack_voltage_window(&self) -> (f64, f64) {
        (self.min_pack_volt, self.max_pack_volt)
    }

    /// Cell voltage limits scaled to the string of `n_s` cells.
    pub fn cell_voltage_window_scaled(&self) -> (f64, f64) {
        let n_s = f64::from(self.n_s);
        (self.min_cell_volt * n_s, self.max_cell_volt * n_s)
    }

    /// Total number of cells in the pack.
    pub fn cell_count(&self) -> u32 {
        self.n_s * self.n_p
    }
}

/// Vehicles with known battery parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vehicle {
    Tesla,
    Vw,
    /// Shares the VW pack.
    Cupra,
}

impl Vehicle {
    /// All known vehicles.
    pub const ALL: [Vehicle; 3] = [Vehicle::Tesla, Vehicle::Vw, Vehicle::Cupra];

    pub fn parameters(&self) -> VehicleParameters {
        match self {
            Self::Tesla => TESLA,
            Self::Vw | Self::Cupra => VW,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tesla => "tesla",
            Self::Vw => "vw",
            Self::Cupra => "cupra",
        }
    }
}
