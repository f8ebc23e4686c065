//! Protocol constants, typed so an embedding oracle service or miner
//! pre-flight tool can load them from its own configuration file instead of
//! this crate hard-coding mainnet values.

use serde::{Deserialize, Serialize};

/// The denominator used for all percentage arithmetic (e.g. `1000` for
/// tenths-of-a-percent granularity), and the ring size bounds. Defaults
/// match the mainnet protocol values this engine mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fee_percentage_base: u32,
    pub min_ring_size: usize,
    pub max_ring_size: usize,
    /// The rebate rate applied alongside `burn_rate` in the fee/burn
    /// distribution step. The accounting path for this exists but the
    /// protocol this engine mirrors never activates it; kept as a
    /// configurable knob rather than a literal so the structure generalizes
    /// if it is ever turned on. `Config::default()` preserves the
    /// always-zero behavior.
    pub rebate_rate: u32,
    /// ERC1400 `canSend` status codes treated as success.
    #[serde(skip)]
    pub can_send_success_codes: [u8; 3],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fee_percentage_base: 1000,
            min_ring_size: 2,
            max_ring_size: 8,
            rebate_rate: 0,
            can_send_success_codes: [0xa0, 0xa1, 0xa2],
        }
    }
}

impl Config {
    pub fn can_send_ok(&self, status: u8) -> bool {
        self.can_send_success_codes.contains(&status)
    }
}
