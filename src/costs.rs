use serde::{Deserialize, Serialize};

/// Futures-style cost model: a fixed commission per contract, charged on
/// each side of a round trip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CommissionModel {
    pub per_contract: f64,
}

impl Default for CommissionModel {
    fn default() -> Self {
        Self { per_contract: 2.5 }
    }
}

impl CommissionModel {
    pub fn zero() -> Self {
        Self { per_contract: 0.0 }
    }

    /// Commission for one side of a trade of `size` contracts.
    pub fn side(&self, size: i64) -> f64 {
        self.per_contract * size.unsigned_abs() as f64
    }

    /// Commission for a full round trip (entry plus exit).
    pub fn round_trip(&self, size: i64) -> f64 {
        2.0 * self.side(size)
    }
}
