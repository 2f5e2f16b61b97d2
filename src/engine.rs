// omnipool_rs/src/engine.rs
use crate::fees::{validate_fee, FeeAccountant, FeeSchedule};
use crate::ledger::AgentLedger;
use crate::state::{AssetState, PoolState};
use crate::types::{Amount, Fee, LrnaSwapResult, OmnipoolError, Result, SwapResult, LRNA};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Everything a quote needs about the two assets involved in a trade.
struct TradeContext {
    state_in: AssetState,
    state_out: AssetState,
    asset_fee: Fee,
    protocol_fee: Fee,
}

/// Swap math for the two trade directions.
///
/// Quotes are computed against a read-only `PoolState`; committing them is the job of
/// `Omnipool` (or any caller holding the pool mutably).
pub struct SwapEngine;

impl SwapEngine {
    /// Quotes selling exactly `amount_in` of `asset_in` for `asset_out`.
    ///
    /// ΔQ_i  = Q_i * (-ΔR_i) / (R_i + ΔR_i)
    /// ΔQ_j' = -ΔQ_i * (1 - f_P)
    /// ΔR_j' = R_j * (-ΔQ_j') / (Q_j + ΔQ_j')
    /// ΔR_j  = ΔR_j' * (1 - f_A)
    pub fn quote_sell(
        pool: &PoolState,
        asset_in: &str,
        asset_out: &str,
        amount_in: Amount,
    ) -> Result<SwapResult> {
        let ctx = Self::trade_context(pool, asset_in, asset_out)?;
        Self::check_positive(amount_in)?;
        if amount_in >= ctx.state_in.reserve {
            return Err(OmnipoolError::invalid_amount(
                amount_in,
                format!("sell amount must be below the {} reserve {}", asset_in, ctx.state_in.reserve),
            ));
        }

        let delta_reserve_in = amount_in;
        let delta_intermediary_in =
            ctx.state_in.intermediary * -delta_reserve_in / (ctx.state_in.reserve + delta_reserve_in);
        let delta_intermediary_out = -delta_intermediary_in * (1.0 - ctx.protocol_fee);
        let delta_reserve_out_gross = ctx.state_out.reserve * -delta_intermediary_out
            / (ctx.state_out.intermediary + delta_intermediary_out);
        let delta_reserve_out = delta_reserve_out_gross * (1.0 - ctx.asset_fee);
        Self::check_remaining(asset_out, ctx.state_out.reserve, delta_reserve_out_gross, amount_in)?;
        Self::check_remaining(asset_out, ctx.state_out.reserve, delta_reserve_out, amount_in)?;

        Self::settle(
            pool,
            asset_in,
            asset_out,
            &ctx,
            delta_reserve_in,
            delta_reserve_out,
            delta_intermediary_in,
            delta_intermediary_out,
        )
    }

    /// Quotes buying exactly `amount_out` of `asset_out`, paid in `asset_in`.
    ///
    /// Solves the sell equations backwards through both fee legs:
    /// ΔQ_j = Q_j * (-ΔR_j) / (R_j * (1 - f_A) + ΔR_j)
    /// ΔQ_i = -ΔQ_j / (1 - f_P)
    /// ΔR_i = R_i * (-ΔQ_i) / (Q_i + ΔQ_i)
    pub fn quote_buy(
        pool: &PoolState,
        asset_in: &str,
        asset_out: &str,
        amount_out: Amount,
    ) -> Result<SwapResult> {
        let ctx = Self::trade_context(pool, asset_in, asset_out)?;
        Self::check_positive(amount_out)?;

        let available_out = ctx.state_out.reserve * (1.0 - ctx.asset_fee);
        if amount_out >= available_out {
            return Err(OmnipoolError::invalid_amount(
                amount_out,
                format!("buy amount must be below {} of {} after fees", available_out, asset_out),
            ));
        }

        let delta_reserve_out = -amount_out;
        let delta_intermediary_out =
            ctx.state_out.intermediary * -delta_reserve_out / (available_out + delta_reserve_out);
        let delta_intermediary_in = -delta_intermediary_out / (1.0 - ctx.protocol_fee);
        if ctx.state_in.intermediary + delta_intermediary_in <= 0.0 {
            return Err(OmnipoolError::invalid_amount(
                amount_out,
                format!("buy would drain the {} intermediary balance", asset_in),
            ));
        }
        let delta_reserve_in = ctx.state_in.reserve * -delta_intermediary_in
            / (ctx.state_in.intermediary + delta_intermediary_in);

        Self::settle(
            pool,
            asset_in,
            asset_out,
            &ctx,
            delta_reserve_in,
            delta_reserve_out,
            delta_intermediary_in,
            delta_intermediary_out,
        )
    }

    /// Quotes selling exactly `lrna_in` of the intermediary asset for `asset_out`.
    ///
    /// ΔQ_i = lrna_in
    /// ΔR_i = R_i * (-ΔQ_i) / (Q_i + ΔQ_i) * (1 - f_A)
    /// ΔL   = -ΔQ_i * (1 + (1 - f_A) * Q_i / (Q_i + ΔQ_i))
    pub fn quote_sell_lrna(pool: &PoolState, asset_out: &str, lrna_in: Amount) -> Result<LrnaSwapResult> {
        let (state, asset_fee) = Self::lrna_context(pool, asset_out)?;
        Self::check_positive(lrna_in)?;

        let delta_intermediary = lrna_in;
        let delta_reserve_gross = state.reserve * -delta_intermediary / (state.intermediary + delta_intermediary);
        let delta_reserve = delta_reserve_gross * (1.0 - asset_fee);
        Self::check_remaining(asset_out, state.reserve, delta_reserve_gross, lrna_in)?;
        Self::check_remaining(asset_out, state.reserve, delta_reserve, lrna_in)?;

        Ok(Self::settle_lrna(pool, asset_out, &state, asset_fee, delta_reserve, delta_intermediary))
    }

    /// Quotes buying exactly `amount_out` of `asset_out`, paid in the intermediary asset.
    ///
    /// ΔQ_i = Q_i * amount_out / (R_i * (1 - f_A) - amount_out)
    pub fn quote_buy_with_lrna(pool: &PoolState, asset_out: &str, amount_out: Amount) -> Result<LrnaSwapResult> {
        let (state, asset_fee) = Self::lrna_context(pool, asset_out)?;
        Self::check_positive(amount_out)?;

        let available_out = state.reserve * (1.0 - asset_fee);
        if amount_out >= available_out {
            return Err(OmnipoolError::invalid_amount(
                amount_out,
                format!("buy amount must be below {} of {} after fees", available_out, asset_out),
            ));
        }
        let delta_reserve = -amount_out;
        let delta_intermediary = state.intermediary * amount_out / (available_out - amount_out);

        Ok(Self::settle_lrna(pool, asset_out, &state, asset_fee, delta_reserve, delta_intermediary))
    }

    fn lrna_context(pool: &PoolState, asset: &str) -> Result<(AssetState, Fee)> {
        let state = pool.asset_state(asset)?;
        let asset_fee = validate_fee("asset fee", pool.fees().asset_fee_for(asset))?;
        Ok((state, asset_fee))
    }

    // LRNA entering the pool is matched by a deeper imbalance.
    fn settle_lrna(
        pool: &PoolState,
        asset: &str,
        state: &AssetState,
        asset_fee: Fee,
        delta_reserve: Amount,
        delta_intermediary: Amount,
    ) -> LrnaSwapResult {
        let delta_imbalance = -delta_intermediary
            * (1.0 + (1.0 - asset_fee) * state.intermediary / (state.intermediary + delta_intermediary));
        let result = LrnaSwapResult {
            asset: asset.to_string(),
            delta_reserve,
            delta_intermediary,
            delta_imbalance,
            pool_sequence: pool.sequence(),
        };
        debug!(
            asset,
            lrna_in = result.amount_in(),
            amount_out = result.amount_out(),
            delta_imbalance,
            "lrna swap quoted"
        );
        result
    }

    fn trade_context(pool: &PoolState, asset_in: &str, asset_out: &str) -> Result<TradeContext> {
        let state_in = pool.asset_state(asset_in)?;
        let state_out = pool.asset_state(asset_out)?;
        if asset_in == asset_out {
            return Err(OmnipoolError::SameAsset(asset_in.to_string()));
        }
        let fees = pool.fees();
        Ok(TradeContext {
            state_in,
            state_out,
            asset_fee: validate_fee("asset fee", fees.asset_fee_for(asset_out))?,
            protocol_fee: validate_fee("protocol fee", fees.protocol_fee_for(asset_in))?,
        })
    }

    fn check_positive(amount: Amount) -> Result<()> {
        if amount.is_finite() && amount > 0.0 {
            Ok(())
        } else {
            Err(OmnipoolError::invalid_amount(amount, "trade amount must be finite and positive"))
        }
    }

    // Rounding can wipe out a reserve even when the exact result stays positive.
    fn check_remaining(asset: &str, reserve: Amount, delta_reserve: Amount, amount: Amount) -> Result<()> {
        if reserve + delta_reserve > 0.0 {
            Ok(())
        } else {
            Err(OmnipoolError::invalid_amount(
                amount,
                format!("trade would exhaust the {} reserve", asset),
            ))
        }
    }

    // Both directions end here: the protocol fee is read off the intermediary leg and split
    // against the imbalance the same way.
    #[allow(clippy::too_many_arguments)]
    fn settle(
        pool: &PoolState,
        asset_in: &str,
        asset_out: &str,
        ctx: &TradeContext,
        delta_reserve_in: Amount,
        delta_reserve_out: Amount,
        delta_intermediary_in: Amount,
        delta_intermediary_out: Amount,
    ) -> Result<SwapResult> {
        let fee_amount = -delta_intermediary_in * ctx.protocol_fee;
        let split = FeeAccountant::split(fee_amount, pool.imbalance())?;

        let result = SwapResult {
            asset_in: asset_in.to_string(),
            asset_out: asset_out.to_string(),
            delta_reserve_in,
            delta_reserve_out,
            delta_intermediary_in,
            delta_intermediary_out,
            fee_amount,
            delta_imbalance: split.delta_imbalance,
            delta_sub_pool: split.delta_sub_pool,
            sub_pool_asset: pool.sub_pool_asset().map(str::to_string),
            pool_sequence: pool.sequence(),
        };
        debug!(
            asset_in,
            asset_out,
            amount_in = result.amount_in(),
            amount_out = result.amount_out(),
            fee_amount,
            "swap quoted"
        );
        Ok(result)
    }
}

/// A pool together with the ledger of the parties trading against it.
///
/// This is the unit of atomicity: a swap updates both or neither.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Omnipool {
    pool: PoolState,
    ledger: AgentLedger,
}

impl Omnipool {
    pub fn new(pool: PoolState) -> Self {
        Self { pool, ledger: AgentLedger::new() }
    }

    pub fn with_ledger(pool: PoolState, ledger: AgentLedger) -> Self {
        Self { pool, ledger }
    }

    pub fn pool(&self) -> &PoolState {
        &self.pool
    }

    pub fn ledger(&self) -> &AgentLedger {
        &self.ledger
    }

    /// Direct ledger access, e.g. for funding agents. Pool reserves are only reachable through swaps.
    pub fn ledger_mut(&mut self) -> &mut AgentLedger {
        &mut self.ledger
    }

    pub fn into_parts(self) -> (PoolState, AgentLedger) {
        (self.pool, self.ledger)
    }

    pub fn sell(
        &mut self,
        agent: &str,
        asset_in: &str,
        asset_out: &str,
        amount_in: Amount,
    ) -> Result<SwapResult> {
        let result = SwapEngine::quote_sell(&self.pool, asset_in, asset_out, amount_in)
            .inspect_err(|err| warn!(agent, asset_in, asset_out, amount_in, error = %err, "sell rejected"))?;
        self.commit(agent, &result)?;
        Ok(result)
    }

    pub fn buy(
        &mut self,
        agent: &str,
        asset_in: &str,
        asset_out: &str,
        amount_out: Amount,
    ) -> Result<SwapResult> {
        let result = SwapEngine::quote_buy(&self.pool, asset_in, asset_out, amount_out)
            .inspect_err(|err| warn!(agent, asset_in, asset_out, amount_out, error = %err, "buy rejected"))?;
        self.commit(agent, &result)?;
        Ok(result)
    }

    /// Sells `lrna_in` of the intermediary asset for `asset_out`. The agent's LRNA holding
    /// is debited like any other asset.
    pub fn sell_lrna(&mut self, agent: &str, asset_out: &str, lrna_in: Amount) -> Result<LrnaSwapResult> {
        let result = SwapEngine::quote_sell_lrna(&self.pool, asset_out, lrna_in)
            .inspect_err(|err| warn!(agent, asset_out, lrna_in, error = %err, "lrna sell rejected"))?;
        self.commit_lrna(agent, &result)?;
        Ok(result)
    }

    pub fn buy_with_lrna(&mut self, agent: &str, asset_out: &str, amount_out: Amount) -> Result<LrnaSwapResult> {
        let result = SwapEngine::quote_buy_with_lrna(&self.pool, asset_out, amount_out)
            .inspect_err(|err| warn!(agent, asset_out, amount_out, error = %err, "lrna buy rejected"))?;
        self.commit_lrna(agent, &result)?;
        Ok(result)
    }

    /// Commits a quote computed against the current state. Quotes priced against any
    /// earlier state are rejected with `StaleQuote`. The ledger is only touched once the
    /// pool has accepted the delta.
    pub fn commit(&mut self, agent: &str, result: &SwapResult) -> Result<()> {
        self.check_fresh(result.pool_sequence)?;
        self.pool.apply_delta(&result.to_pool_delta())?;
        self.ledger.apply(
            agent,
            &result.asset_in,
            &result.asset_out,
            result.delta_reserve_in,
            result.delta_reserve_out,
        );
        Ok(())
    }

    pub fn commit_lrna(&mut self, agent: &str, result: &LrnaSwapResult) -> Result<()> {
        self.check_fresh(result.pool_sequence)?;
        self.pool.apply_delta(&result.to_pool_delta())?;
        self.ledger.credit(agent, LRNA, -result.delta_intermediary);
        self.ledger.credit(agent, &result.asset, -result.delta_reserve);
        Ok(())
    }

    fn check_fresh(&self, quoted: u64) -> Result<()> {
        let current = self.pool.sequence();
        if quoted == current {
            Ok(())
        } else {
            warn!(quoted, current, "stale quote rejected");
            Err(OmnipoolError::StaleQuote { quoted, current })
        }
    }

    pub fn configure_fees(&mut self, asset_fee: Fee, protocol_fee: Fee) -> Result<()> {
        self.pool.fees_mut().set_global(asset_fee, protocol_fee)?;
        self.pool.bump_sequence();
        info!(asset_fee, protocol_fee, "global fees configured");
        Ok(())
    }

    pub fn configure_asset_fees(
        &mut self,
        asset: &str,
        asset_fee: Option<Fee>,
        protocol_fee: Option<Fee>,
    ) -> Result<()> {
        self.pool.asset_state(asset)?;
        self.pool.fees_mut().set_override(asset, asset_fee, protocol_fee)?;
        self.pool.bump_sequence();
        info!(asset, ?asset_fee, ?protocol_fee, "asset fees configured");
        Ok(())
    }

    pub fn fees(&self) -> &FeeSchedule {
        self.pool.fees()
    }
}

pub fn sell(
    pool: &mut Omnipool,
    agent: &str,
    asset_in: &str,
    asset_out: &str,
    amount_in: Amount,
) -> Result<SwapResult> {
    pool.sell(agent, asset_in, asset_out, amount_in)
}

pub fn buy(
    pool: &mut Omnipool,
    agent: &str,
    asset_in: &str,
    asset_out: &str,
    amount_out: Amount,
) -> Result<SwapResult> {
    pool.buy(agent, asset_in, asset_out, amount_out)
}

pub fn sell_lrna(pool: &mut Omnipool, agent: &str, asset_out: &str, lrna_in: Amount) -> Result<LrnaSwapResult> {
    pool.sell_lrna(agent, asset_out, lrna_in)
}

pub fn buy_with_lrna(
    pool: &mut Omnipool,
    agent: &str,
    asset_out: &str,
    amount_out: Amount,
) -> Result<LrnaSwapResult> {
    pool.buy_with_lrna(agent, asset_out, amount_out)
}

pub fn configure_fees(pool: &mut Omnipool, asset_fee: Fee, protocol_fee: Fee) -> Result<()> {
    pool.configure_fees(asset_fee, protocol_fee)
}

pub fn get_reserve(pool: &Omnipool, asset: &str) -> Result<Amount> {
    pool.pool().reserve(asset)
}

pub fn get_imbalance(pool: &Omnipool) -> Amount {
    pool.pool().imbalance()
}

pub fn get_sub_pool_balance(pool: &Omnipool) -> Amount {
    pool.pool().sub_pool_balance()
}
