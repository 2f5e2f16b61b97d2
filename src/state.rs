// omnipool_rs/src/state.rs
use crate::fees::FeeSchedule;
use crate::types::{Amount, Asset, AssetDelta, OmnipoolError, PoolDelta, Price, Result, LRNA};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error};

/// One asset's sub-account in the Omnipool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetState {
    /// R, quantity of the real asset held by the pool.
    pub reserve: Amount,
    /// Q, intermediary asset allocated to this asset.
    pub intermediary: Amount,
}

impl AssetState {
    pub fn new(reserve: Amount, intermediary: Amount) -> Result<Self> {
        let state = Self { reserve, intermediary };
        if !state.is_valid() {
            return Err(OmnipoolError::invalid_amount(
                if reserve.is_finite() && reserve > 0.0 { intermediary } else { reserve },
                "reserve and intermediary balance must be finite and positive",
            ));
        }
        Ok(state)
    }

    /// R * Q, conserved by fee-less swaps.
    pub fn invariant(&self) -> f64 {
        self.reserve * self.intermediary
    }

    /// Spot price in units of the intermediary asset.
    pub fn price(&self) -> Price {
        self.intermediary / self.reserve
    }

    fn is_valid(&self) -> bool {
        self.reserve.is_finite()
            && self.intermediary.is_finite()
            && self.reserve > 0.0
            && self.intermediary > 0.0
    }

    fn apply(&self, delta: &AssetDelta) -> AssetState {
        AssetState {
            reserve: self.reserve + delta.reserve,
            intermediary: self.intermediary + delta.intermediary,
        }
    }
}

/// Reserves, imbalance and sub-pool balance of one Omnipool instance.
///
/// Invariants, checked on every commit:
///   - every reserve and intermediary balance is strictly positive,
///   - the imbalance L is never positive,
///   - the sub-pool balance Q_H is never negative.
///
/// Q_H counts every fee routed to the sub-pool. When a sub-pool asset is designated, the
/// same amounts are also credited to that asset's intermediary balance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoolState {
    assets: HashMap<Asset, AssetState>,
    imbalance: Amount,
    sub_pool_balance: Amount,
    #[serde(default)]
    sub_pool_asset: Option<Asset>,
    #[serde(default)]
    fees: FeeSchedule,
    /// Bumped on every change that affects pricing; quotes carry the value they saw.
    #[serde(default)]
    sequence: u64,
}

impl PoolState {
    pub fn new(fees: FeeSchedule) -> Self {
        Self {
            assets: HashMap::new(),
            imbalance: 0.0,
            sub_pool_balance: 0.0,
            sub_pool_asset: None,
            fees,
            sequence: 0,
        }
    }

    /// Registers a new asset. Initialization only; swaps never add assets.
    pub fn add_asset(
        &mut self,
        asset: impl Into<Asset>,
        reserve: Amount,
        intermediary: Amount,
    ) -> Result<()> {
        let asset = asset.into();
        if asset == LRNA {
            return Err(OmnipoolError::Config(format!("{} names the intermediary asset", LRNA)));
        }
        if self.assets.contains_key(&asset) {
            return Err(OmnipoolError::Config(format!("asset {} is already listed", asset)));
        }
        let state = AssetState::new(reserve, intermediary)?;
        debug!(%asset, reserve, intermediary, "asset added to pool");
        self.assets.insert(asset, state);
        Ok(())
    }

    /// Sets the starting imbalance. Must be <= 0.
    pub fn with_imbalance(mut self, imbalance: Amount) -> Result<Self> {
        if !imbalance.is_finite() || imbalance > 0.0 {
            return Err(OmnipoolError::invalid_amount(imbalance, "imbalance must be <= 0"));
        }
        self.imbalance = imbalance;
        Ok(self)
    }

    /// Sets the starting sub-pool balance. Must be >= 0.
    pub fn with_sub_pool_balance(mut self, balance: Amount) -> Result<Self> {
        if !balance.is_finite() || balance < 0.0 {
            return Err(OmnipoolError::invalid_amount(balance, "sub-pool balance must be >= 0"));
        }
        self.sub_pool_balance = balance;
        Ok(self)
    }

    /// Designates the listed asset whose intermediary balance receives sub-pool fees.
    pub fn with_sub_pool_asset(mut self, asset: &str) -> Result<Self> {
        self.asset_state(asset)?;
        self.sub_pool_asset = Some(asset.to_string());
        Ok(self)
    }

    pub fn contains(&self, asset: &str) -> bool {
        self.assets.contains_key(asset)
    }

    pub fn asset_state(&self, asset: &str) -> Result<AssetState> {
        self.assets
            .get(asset)
            .copied()
            .ok_or_else(|| OmnipoolError::UnknownAsset(asset.to_string()))
    }

    pub fn reserve(&self, asset: &str) -> Result<Amount> {
        Ok(self.asset_state(asset)?.reserve)
    }

    pub fn intermediary(&self, asset: &str) -> Result<Amount> {
        Ok(self.asset_state(asset)?.intermediary)
    }

    pub fn imbalance(&self) -> Amount {
        self.imbalance
    }

    pub fn sub_pool_balance(&self) -> Amount {
        self.sub_pool_balance
    }

    pub fn sub_pool_asset(&self) -> Option<&str> {
        self.sub_pool_asset.as_deref()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn bump_sequence(&mut self) {
        self.sequence += 1;
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    pub(crate) fn fees_mut(&mut self) -> &mut FeeSchedule {
        &mut self.fees
    }

    /// Listed assets in sorted order.
    pub fn asset_names(&self) -> Vec<Asset> {
        let mut names: Vec<Asset> = self.assets.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn assets(&self) -> &HashMap<Asset, AssetState> {
        &self.assets
    }

    /// Price of `asset` in units of the intermediary asset.
    pub fn price(&self, asset: &str) -> Result<Price> {
        Ok(self.asset_state(asset)?.price())
    }

    /// Price of `asset` denominated in `numeraire`.
    pub fn price_in(&self, asset: &str, numeraire: &str) -> Result<Price> {
        Ok(self.price(asset)? / self.price(numeraire)?)
    }

    /// Sum of all intermediary balances.
    pub fn total_intermediary(&self) -> Amount {
        self.assets.values().map(|s| s.intermediary).sum()
    }

    /// Returns an error describing the first violated invariant, if any.
    pub fn check_invariants(&self) -> Result<()> {
        for (asset, state) in &self.assets {
            if !state.is_valid() {
                return Err(OmnipoolError::StateCorruption(format!(
                    "asset {} has reserve {} and intermediary {}",
                    asset, state.reserve, state.intermediary
                )));
            }
        }
        Self::check_counters(self.imbalance, self.sub_pool_balance)?;
        self.fees.validate()
    }

    /// Commits every field of `delta` or none of them.
    ///
    /// All resulting values are staged and checked before the first write. Any violated
    /// invariant fails with `StateCorruption` and leaves the pool exactly as it was.
    pub fn apply_delta(&mut self, delta: &PoolDelta) -> Result<()> {
        let mut staged: Vec<(&Asset, AssetState)> = Vec::with_capacity(delta.assets.len());
        for (asset, asset_delta) in &delta.assets {
            let next = self.asset_state(asset)?.apply(asset_delta);
            if !next.is_valid() {
                let err = OmnipoolError::StateCorruption(format!(
                    "commit would leave {} with reserve {} and intermediary {}",
                    asset, next.reserve, next.intermediary
                ));
                error!(%asset, error = %err, "rejecting pool delta");
                return Err(err);
            }
            staged.push((asset, next));
        }

        let imbalance = self.imbalance + delta.imbalance;
        let sub_pool_balance = self.sub_pool_balance + delta.sub_pool;
        if let Err(err) = Self::check_counters(imbalance, sub_pool_balance) {
            error!(error = %err, "rejecting pool delta");
            return Err(err);
        }

        for (asset, next) in staged {
            if let Some(slot) = self.assets.get_mut(asset) {
                *slot = next;
            }
        }
        self.imbalance = imbalance;
        self.sub_pool_balance = sub_pool_balance;
        self.sequence += 1;
        debug!(
            assets = delta.assets.len(),
            imbalance, sub_pool_balance, "pool delta committed"
        );
        Ok(())
    }

    /// Applies `delta` to a copy, leaving `self` untouched.
    pub fn with_delta(&self, delta: &PoolDelta) -> Result<PoolState> {
        let mut next = self.clone();
        next.apply_delta(delta)?;
        Ok(next)
    }

    fn check_counters(imbalance: Amount, sub_pool_balance: Amount) -> Result<()> {
        if !imbalance.is_finite() || imbalance > 0.0 {
            return Err(OmnipoolError::StateCorruption(format!(
                "imbalance would become {}",
                imbalance
            )));
        }
        if !sub_pool_balance.is_finite() || sub_pool_balance < 0.0 {
            return Err(OmnipoolError::StateCorruption(format!(
                "sub-pool balance would become {}",
                sub_pool_balance
            )));
        }
        Ok(())
    }
}
