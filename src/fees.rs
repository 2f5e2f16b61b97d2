// omnipool_rs/src/fees.rs
use crate::types::{Amount, Asset, Fee, OmnipoolError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Checks that `value` is a usable fee fraction, i.e. finite and in [0, 1).
pub fn validate_fee(name: &'static str, value: Fee) -> Result<Fee> {
    if value.is_finite() && (0.0..1.0).contains(&value) {
        Ok(value)
    } else {
        Err(OmnipoolError::InvalidFee { name, value })
    }
}

/// Per-asset replacement for one or both global fees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeeOverride {
    #[serde(default)]
    pub asset_fee: Option<Fee>,
    #[serde(default)]
    pub protocol_fee: Option<Fee>,
}

/// Asset fee f_A and protocol fee f_P, globally and per asset.
///
/// For a swap i -> j the asset fee comes from the output asset j (it is charged on the
/// real-asset leg leaving the pool) and the protocol fee comes from the input asset i
/// (it is charged on the intermediary leg leaving i's sub-account).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeeSchedule {
    asset_fee: Fee,
    protocol_fee: Fee,
    #[serde(default)]
    overrides: HashMap<Asset, FeeOverride>,
}

impl FeeSchedule {
    pub fn new(asset_fee: Fee, protocol_fee: Fee) -> Result<Self> {
        Ok(Self {
            asset_fee: validate_fee("asset fee", asset_fee)?,
            protocol_fee: validate_fee("protocol fee", protocol_fee)?,
            overrides: HashMap::new(),
        })
    }

    pub fn asset_fee(&self) -> Fee {
        self.asset_fee
    }

    pub fn protocol_fee(&self) -> Fee {
        self.protocol_fee
    }

    pub fn overrides(&self) -> &HashMap<Asset, FeeOverride> {
        &self.overrides
    }

    /// Replaces the global pair. Neither fee changes unless both are valid.
    pub fn set_global(&mut self, asset_fee: Fee, protocol_fee: Fee) -> Result<()> {
        let asset_fee = validate_fee("asset fee", asset_fee)?;
        let protocol_fee = validate_fee("protocol fee", protocol_fee)?;
        self.asset_fee = asset_fee;
        self.protocol_fee = protocol_fee;
        Ok(())
    }

    /// Sets the override for `asset`. `None` falls back to the global value.
    pub fn set_override(
        &mut self,
        asset: &str,
        asset_fee: Option<Fee>,
        protocol_fee: Option<Fee>,
    ) -> Result<()> {
        if let Some(fee) = asset_fee {
            validate_fee("asset fee", fee)?;
        }
        if let Some(fee) = protocol_fee {
            validate_fee("protocol fee", fee)?;
        }
        if asset_fee.is_none() && protocol_fee.is_none() {
            self.overrides.remove(asset);
        } else {
            self.overrides.insert(asset.to_string(), FeeOverride { asset_fee, protocol_fee });
        }
        Ok(())
    }

    pub fn asset_fee_for(&self, asset: &str) -> Fee {
        self.overrides
            .get(asset)
            .and_then(|o| o.asset_fee)
            .unwrap_or(self.asset_fee)
    }

    pub fn protocol_fee_for(&self, asset: &str) -> Fee {
        self.overrides
            .get(asset)
            .and_then(|o| o.protocol_fee)
            .unwrap_or(self.protocol_fee)
    }

    /// Validates every configured value. Needed after deserialization, which bypasses the setters.
    pub fn validate(&self) -> Result<()> {
        validate_fee("asset fee", self.asset_fee)?;
        validate_fee("protocol fee", self.protocol_fee)?;
        for fee_override in self.overrides.values() {
            if let Some(fee) = fee_override.asset_fee {
                validate_fee("asset fee", fee)?;
            }
            if let Some(fee) = fee_override.protocol_fee {
                validate_fee("protocol fee", fee)?;
            }
        }
        Ok(())
    }
}

/// How a protocol fee is divided between repaying the imbalance and the sub-pool.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeeSplit {
    /// ΔL, never more than the outstanding deficit.
    pub delta_imbalance: Amount,
    /// ΔQ_H, whatever is left once the deficit is repaid.
    pub delta_sub_pool: Amount,
}

pub struct FeeAccountant;

impl FeeAccountant {
    /// Splits `fee_amount` of intermediary asset against the current imbalance L (L <= 0).
    ///
    /// ΔL = min(fee, -L), ΔQ_H = fee - ΔL. The imbalance is never pushed above zero and the
    /// sub-pool only receives revenue once the deficit is fully repaid.
    pub fn split(fee_amount: Amount, current_imbalance: Amount) -> Result<FeeSplit> {
        if !fee_amount.is_finite() || fee_amount < 0.0 {
            return Err(OmnipoolError::invalid_amount(
                fee_amount,
                "fee amount must be finite and non-negative",
            ));
        }
        if !current_imbalance.is_finite() || current_imbalance > 0.0 {
            return Err(OmnipoolError::StateCorruption(format!(
                "imbalance {} is positive",
                current_imbalance
            )));
        }

        let delta_imbalance = fee_amount.min(-current_imbalance);
        Ok(FeeSplit {
            delta_imbalance,
            delta_sub_pool: fee_amount - delta_imbalance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn validate_fee_range() {
        assert!(validate_fee("asset fee", 0.0).is_ok());
        assert!(validate_fee("asset fee", 0.9999).is_ok());
        assert!(matches!(
            validate_fee("asset fee", 1.0),
            Err(OmnipoolError::InvalidFee { name: "asset fee", .. })
        ));
        assert!(validate_fee("protocol fee", -0.001).is_err());
        assert!(validate_fee("protocol fee", f64::NAN).is_err());
    }

    #[test]
    fn split_with_no_deficit_goes_to_sub_pool() {
        let split = FeeAccountant::split(0.5, 0.0).unwrap();
        assert_eq!(split.delta_imbalance, 0.0);
        assert_eq!(split.delta_sub_pool, 0.5);
    }

    #[test]
    fn split_repays_deficit_first() {
        let split = FeeAccountant::split(0.5, -2.0).unwrap();
        assert_eq!(split.delta_imbalance, 0.5);
        assert_eq!(split.delta_sub_pool, 0.0);
    }

    #[test]
    fn split_overflowing_deficit() {
        let split = FeeAccountant::split(3.0, -1.25).unwrap();
        assert_eq!(split.delta_imbalance, 1.25);
        assert_abs_diff_eq!(split.delta_sub_pool, 1.75, epsilon = 1e-12);
        // Repaying exactly lands on zero.
        assert_eq!(-1.25 + split.delta_imbalance, 0.0);
    }

    #[test]
    fn split_rejects_bad_inputs() {
        assert!(matches!(
            FeeAccountant::split(-1.0, 0.0),
            Err(OmnipoolError::InvalidAmount { .. })
        ));
        assert!(matches!(
            FeeAccountant::split(1.0, 0.1),
            Err(OmnipoolError::StateCorruption(_))
        ));
    }

    #[test]
    fn schedule_overrides_fall_back_to_global() {
        let mut fees = FeeSchedule::new(0.002, 0.0005).unwrap();
        fees.set_override("HDX", Some(0.01), None).unwrap();

        assert_eq!(fees.asset_fee_for("HDX"), 0.01);
        assert_eq!(fees.protocol_fee_for("HDX"), 0.0005);
        assert_eq!(fees.asset_fee_for("DOT"), 0.002);

        fees.set_override("HDX", None, None).unwrap();
        assert!(fees.overrides().is_empty());
        assert_eq!(fees.asset_fee_for("HDX"), 0.002);
    }

    #[test]
    fn set_global_is_all_or_nothing() {
        let mut fees = FeeSchedule::new(0.002, 0.0005).unwrap();
        assert!(fees.set_global(0.003, 1.5).is_err());
        assert_eq!(fees.asset_fee(), 0.002);
        assert_eq!(fees.protocol_fee(), 0.0005);
    }

    #[test]
    fn deserialized_schedule_is_validated() {
        let fees: FeeSchedule =
            serde_json::from_str(r#"{"asset_fee": 0.002, "protocol_fee": 1.2}"#).unwrap();
        assert!(matches!(
            fees.validate(),
            Err(OmnipoolError::InvalidFee { name: "protocol fee", .. })
        ));
    }
}
