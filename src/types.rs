// omnipool_rs/src/types.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// Assets and agents are identified by name. The intermediary asset has no entry of its own;
// it only exists as the `intermediary` side of each asset's sub-account.
pub type Asset = String;
pub type AgentId = String;

/// Name under which agents hold the intermediary asset. No listed asset may use it.
pub const LRNA: &str = "LRNA";

// f64 throughout. No intermediate rounding is applied.
pub type Amount = f64;
pub type Price = f64;
pub type Fee = f64; // fraction in [0, 1)

/// Signed per-asset quantities held by an external party.
pub type Holdings = HashMap<Asset, Amount>;

/// Change to a single asset's sub-account: real-asset reserve and intermediary balance.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AssetDelta {
    pub reserve: Amount,
    pub intermediary: Amount,
}

impl AssetDelta {
    pub fn new(reserve: Amount, intermediary: Amount) -> Self {
        Self { reserve, intermediary }
    }
}

/// A bundle of changes committed to a `PoolState` in one step.
///
/// Nothing in a `PoolDelta` is applied until `PoolState::apply_delta` has checked
/// every resulting value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoolDelta {
    pub assets: HashMap<Asset, AssetDelta>,
    /// ΔL, change to the imbalance counter.
    pub imbalance: Amount,
    /// ΔQ_H, change to the sub-pool balance.
    pub sub_pool: Amount,
}

impl PoolDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` to whatever is already staged for `asset`.
    pub fn add_asset(&mut self, asset: &str, delta: AssetDelta) -> &mut Self {
        let entry = self.assets.entry(asset.to_string()).or_default();
        entry.reserve += delta.reserve;
        entry.intermediary += delta.intermediary;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && self.imbalance == 0.0 && self.sub_pool == 0.0
    }
}

/// Outcome of a swap, expressed from the pool's point of view.
///
/// Positive deltas flow into the pool, negative deltas flow out of it. The trader's
/// change in holdings is the negation of `delta_reserve_in` / `delta_reserve_out`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapResult {
    pub asset_in: Asset,
    pub asset_out: Asset,
    /// ΔR_i, always positive.
    pub delta_reserve_in: Amount,
    /// ΔR_j after the asset fee, always negative.
    pub delta_reserve_out: Amount,
    /// ΔQ_i, always negative.
    pub delta_intermediary_in: Amount,
    /// ΔQ_j after the protocol fee, always positive.
    pub delta_intermediary_out: Amount,
    /// Protocol fee taken on the intermediary leg, `-ΔQ_i * f_P`.
    pub fee_amount: Amount,
    /// ΔL
    pub delta_imbalance: Amount,
    /// ΔQ_H
    pub delta_sub_pool: Amount,
    /// Asset whose intermediary balance receives ΔQ_H, if the pool designates one.
    #[serde(default)]
    pub sub_pool_asset: Option<Asset>,
    /// `PoolState::sequence` at quote time.
    #[serde(default)]
    pub pool_sequence: u64,
}

impl SwapResult {
    /// Quantity of `asset_in` the trader pays.
    pub fn amount_in(&self) -> Amount {
        self.delta_reserve_in
    }

    /// Quantity of `asset_out` the trader receives.
    pub fn amount_out(&self) -> Amount {
        -self.delta_reserve_out
    }

    /// Effective price paid, in units of `asset_in` per unit of `asset_out`.
    pub fn execution_price(&self) -> Price {
        self.amount_in() / self.amount_out()
    }

    pub fn to_pool_delta(&self) -> PoolDelta {
        let mut delta = PoolDelta::new();
        delta
            .add_asset(
                &self.asset_in,
                AssetDelta::new(self.delta_reserve_in, self.delta_intermediary_in),
            )
            .add_asset(
                &self.asset_out,
                AssetDelta::new(self.delta_reserve_out, self.delta_intermediary_out),
            );
        if let Some(asset) = &self.sub_pool_asset {
            if self.delta_sub_pool > 0.0 {
                delta.add_asset(asset, AssetDelta::new(0.0, self.delta_sub_pool));
            }
        }
        delta.imbalance = self.delta_imbalance;
        delta.sub_pool = self.delta_sub_pool;
        delta
    }
}

/// Outcome of trading the intermediary asset directly for a listed asset.
///
/// The trader pays `delta_intermediary` LRNA into the asset's sub-account and receives
/// `-delta_reserve` of the asset. The LRNA entering the pool deepens the imbalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LrnaSwapResult {
    pub asset: Asset,
    /// ΔR_i after the asset fee, always negative.
    pub delta_reserve: Amount,
    /// ΔQ_i, always positive.
    pub delta_intermediary: Amount,
    /// ΔL, always negative.
    pub delta_imbalance: Amount,
    #[serde(default)]
    pub pool_sequence: u64,
}

impl LrnaSwapResult {
    /// LRNA paid.
    pub fn amount_in(&self) -> Amount {
        self.delta_intermediary
    }

    pub fn amount_out(&self) -> Amount {
        -self.delta_reserve
    }

    /// LRNA paid per unit of asset received.
    pub fn execution_price(&self) -> Price {
        self.amount_in() / self.amount_out()
    }

    pub fn to_pool_delta(&self) -> PoolDelta {
        let mut delta = PoolDelta::new();
        delta.add_asset(&self.asset, AssetDelta::new(self.delta_reserve, self.delta_intermediary));
        delta.imbalance = self.delta_imbalance;
        delta
    }
}

#[derive(Debug, Error)]
pub enum OmnipoolError {
    #[error("Unknown asset: {0}")]
    UnknownAsset(Asset),

    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Amount, reason: String },

    #[error("Invalid {name} {value}: fees must lie in [0, 1)")]
    InvalidFee { name: &'static str, value: Fee },

    #[error("Cannot swap {0} for itself")]
    SameAsset(Asset),

    #[error("State corruption: {0}")]
    StateCorruption(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Optimization error: {0}")]
    Optimization(String),

    #[error("Stale quote: priced at pool sequence {quoted}, pool is at {current}")]
    StaleQuote { quoted: u64, current: u64 },
}

impl OmnipoolError {
    pub(crate) fn invalid_amount(amount: Amount, reason: impl Into<String>) -> Self {
        OmnipoolError::InvalidAmount { amount, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, OmnipoolError>;

// Missing entries read as zero; agents that never touched an asset hold none of it.
pub(crate) fn get_or_zero(map: &HashMap<Asset, f64>, asset: &str) -> f64 {
    *map.get(asset).unwrap_or(&0.0)
}
