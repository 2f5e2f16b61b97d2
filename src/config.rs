// omnipool_rs/src/config.rs
//
// Initial pool layout loaded from JSON. The simulation driver owns where the file comes from;
// this module only turns a description into a validated `PoolState`.
use crate::fees::FeeSchedule;
use crate::state::PoolState;
use crate::types::{Amount, Asset, Fee, OmnipoolError, Price, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Starting position of one asset. Give either `intermediary` directly or a `price`
/// in units of the intermediary asset, from which `intermediary = reserve * price`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct AssetConfig {
    pub reserve: Amount,
    #[serde(default)]
    pub intermediary: Option<Amount>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub asset_fee: Option<Fee>,
    #[serde(default)]
    pub protocol_fee: Option<Fee>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct OmnipoolConfig {
    pub assets: BTreeMap<Asset, AssetConfig>,
    #[serde(default)]
    pub asset_fee: Fee,
    #[serde(default)]
    pub protocol_fee: Fee,
    #[serde(default)]
    pub imbalance: Amount,
    #[serde(default)]
    pub sub_pool_balance: Amount,
    /// Listed asset whose intermediary balance receives sub-pool fees.
    #[serde(default)]
    pub sub_pool_asset: Option<Asset>,
}

impl OmnipoolConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        info!(path = %path.display(), assets = config.assets.len(), "loaded omnipool config");
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Builds the initial pool, checking every invariant.
    pub fn build(&self) -> Result<PoolState> {
        if self.assets.len() < 2 {
            return Err(OmnipoolError::Config(
                "an omnipool needs at least two assets".to_string(),
            ));
        }

        let mut fees = FeeSchedule::new(self.asset_fee, self.protocol_fee)?;
        for (asset, asset_config) in &self.assets {
            if asset_config.asset_fee.is_some() || asset_config.protocol_fee.is_some() {
                fees.set_override(asset, asset_config.asset_fee, asset_config.protocol_fee)?;
            }
        }

        let mut pool = PoolState::new(fees);
        for (asset, asset_config) in &self.assets {
            let intermediary = match (asset_config.intermediary, asset_config.price) {
                (Some(intermediary), None) => intermediary,
                (None, Some(price)) => asset_config.reserve * price,
                _ => {
                    return Err(OmnipoolError::Config(format!(
                        "asset {} needs exactly one of `intermediary` or `price`",
                        asset
                    )))
                }
            };
            pool.add_asset(asset.as_str(), asset_config.reserve, intermediary)?;
        }

        let mut pool = pool
            .with_imbalance(self.imbalance)?
            .with_sub_pool_balance(self.sub_pool_balance)?;
        if let Some(asset) = &self.sub_pool_asset {
            pool = pool.with_sub_pool_asset(asset).map_err(|_| {
                OmnipoolError::Config(format!("sub-pool asset {} is not listed", asset))
            })?;
        }
        pool.check_invariants()?;
        info!(
            assets = pool.assets().len(),
            asset_fee = self.asset_fee,
            protocol_fee = self.protocol_fee,
            "omnipool initialized"
        );
        Ok(pool)
    }
}
