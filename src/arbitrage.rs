// omnipool_rs/src/arbitrage.rs
use crate::engine::{Omnipool, SwapEngine};
use crate::fees::validate_fee;
use crate::solvers::{self, ScalarObjective};
use crate::state::PoolState;
use crate::types::{Amount, Asset, Fee, OmnipoolError, Price, Result, SwapResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

// Keeps the search strictly inside the region where quotes are defined.
const EDGE_MARGIN: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArbitrageDirection {
    /// Buy `tkn` from the Omnipool with `numeraire`, sell it on the external market.
    BuyFromPool,
    /// Buy `tkn` on the external market, sell it into the Omnipool for `numeraire`.
    SellToPool,
}

/// Settings for searching against an external market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArbitrageParams {
    /// Fee charged by the external market on each leg.
    pub cex_fee: Fee,
    /// Iteration cap for the 1-D solver.
    pub max_iterations: u64,
    /// Opportunities at or below this profit (in numeraire) are ignored.
    pub min_profit: Amount,
}

impl Default for ArbitrageParams {
    fn default() -> Self {
        Self {
            cex_fee: 0.0,
            max_iterations: 100,
            min_profit: 0.0,
        }
    }
}

/// Best trade found for one asset against its external price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageResult {
    pub tkn: Asset,
    pub numeraire: Asset,
    /// External price of `tkn` in `numeraire`.
    pub cex_price: Price,
    pub cex_fee: Fee,
    /// `None` when no direction is profitable.
    pub direction: Option<ArbitrageDirection>,
    /// Quantity of `tkn` traded on both legs.
    pub amount: Amount,
    /// Expected profit in `numeraire`.
    pub profit: Amount,
    /// Omnipool leg, quoted against the state the search ran on.
    pub swap: Option<SwapResult>,
}

impl ArbitrageResult {
    fn none(tkn: &str, numeraire: &str, cex_price: Price, cex_fee: Fee) -> Self {
        Self {
            tkn: tkn.to_string(),
            numeraire: numeraire.to_string(),
            cex_price,
            cex_fee,
            direction: None,
            amount: 0.0,
            profit: 0.0,
            swap: None,
        }
    }

    pub fn is_profitable(&self) -> bool {
        self.direction.is_some()
    }
}

/// Result of running `find_arbitrage` over several assets in sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    /// Only the profitable trades, in execution order.
    pub trades: Vec<ArbitrageResult>,
    pub total_profit: Amount,
    /// Pool state after every trade's Omnipool leg.
    pub pool: PoolState,
}

struct BuyFromPoolProfit<'a> {
    pool: &'a PoolState,
    tkn: &'a str,
    numeraire: &'a str,
    cex_bid: Price,
}

impl<'a> ScalarObjective for BuyFromPoolProfit<'a> {
    fn evaluate(&self, x: f64) -> Result<f64> {
        if x <= 0.0 {
            return Ok(0.0);
        }
        let swap = SwapEngine::quote_buy(self.pool, self.numeraire, self.tkn, x)?;
        Ok(x * self.cex_bid - swap.amount_in())
    }
}

struct SellToPoolProfit<'a> {
    pool: &'a PoolState,
    tkn: &'a str,
    numeraire: &'a str,
    cex_ask: Price,
}

impl<'a> ScalarObjective for SellToPoolProfit<'a> {
    fn evaluate(&self, x: f64) -> Result<f64> {
        if x <= 0.0 {
            return Ok(0.0);
        }
        let swap = SwapEngine::quote_sell(self.pool, self.tkn, self.numeraire, x)?;
        Ok(swap.amount_out() - x * self.cex_ask)
    }
}

/// Finds the most profitable trade of `tkn` against `numeraire` given an external price.
///
/// Compares the fee-adjusted marginal Omnipool prices with the external bid/ask:
///   buy spot  = p / ((1 - f_A(tkn)) * (1 - f_P(numeraire)))
///   sell spot = p * (1 - f_P(tkn)) * (1 - f_A(numeraire))
/// and, for a direction that is profitable at the margin, maximizes profit over the trade size.
pub fn find_arbitrage(
    pool: &PoolState,
    tkn: &str,
    numeraire: &str,
    cex_price: Price,
    params: &ArbitrageParams,
) -> Result<ArbitrageResult> {
    if tkn == numeraire {
        return Err(OmnipoolError::SameAsset(tkn.to_string()));
    }
    if !cex_price.is_finite() || cex_price <= 0.0 {
        return Err(OmnipoolError::invalid_amount(cex_price, "external price must be positive"));
    }
    let cex_fee = validate_fee("external market fee", params.cex_fee)?;

    let tkn_state = pool.asset_state(tkn)?;
    let numeraire_state = pool.asset_state(numeraire)?;
    let fees = pool.fees();
    let spot = pool.price_in(tkn, numeraire)?;

    let cex_bid = cex_price * (1.0 - cex_fee);
    let cex_ask = cex_price / (1.0 - cex_fee);
    let buy_spot = spot / ((1.0 - fees.asset_fee_for(tkn)) * (1.0 - fees.protocol_fee_for(numeraire)));
    let sell_spot = spot * (1.0 - fees.protocol_fee_for(tkn)) * (1.0 - fees.asset_fee_for(numeraire));

    let mut best = ArbitrageResult::none(tkn, numeraire, cex_price, cex_fee);

    if buy_spot < cex_bid {
        // Largest buy that keeps the numeraire's intermediary balance positive.
        let available = tkn_state.reserve * (1.0 - fees.asset_fee_for(tkn));
        let numeraire_q = numeraire_state.intermediary * (1.0 - fees.protocol_fee_for(numeraire));
        let upper = available * numeraire_q / (tkn_state.intermediary + numeraire_q);

        let problem = BuyFromPoolProfit { pool, tkn, numeraire, cex_bid };
        let (amount, profit) =
            solvers::maximize_on_interval(&problem, 0.0, upper * (1.0 - EDGE_MARGIN), params.max_iterations)?;
        if profit > best.profit.max(params.min_profit) {
            best.direction = Some(ArbitrageDirection::BuyFromPool);
            best.amount = amount;
            best.profit = profit;
            best.swap = Some(SwapEngine::quote_buy(pool, numeraire, tkn, amount)?);
        }
    }

    if sell_spot > cex_ask {
        let upper = tkn_state.reserve;
        let problem = SellToPoolProfit { pool, tkn, numeraire, cex_ask };
        let (amount, profit) =
            solvers::maximize_on_interval(&problem, 0.0, upper * (1.0 - EDGE_MARGIN), params.max_iterations)?;
        if profit > best.profit.max(params.min_profit) {
            best.direction = Some(ArbitrageDirection::SellToPool);
            best.amount = amount;
            best.profit = profit;
            best.swap = Some(SwapEngine::quote_sell(pool, tkn, numeraire, amount)?);
        }
    }

    debug!(
        tkn,
        numeraire,
        cex_price,
        spot,
        direction = ?best.direction,
        amount = best.amount,
        profit = best.profit,
        "arbitrage search finished"
    );
    Ok(best)
}

/// Runs `find_arbitrage` for every priced asset (sorted by name), applying each trade's
/// Omnipool leg to a scratch copy before searching the next asset.
pub fn sweep_arbitrage(
    pool: &PoolState,
    prices: &HashMap<Asset, Price>,
    numeraire: &str,
    params: &ArbitrageParams,
) -> Result<SweepResult> {
    pool.asset_state(numeraire)?;

    let mut tokens: Vec<&Asset> = prices.keys().filter(|t| t.as_str() != numeraire).collect();
    tokens.sort();

    let mut scratch = pool.clone();
    let mut trades = Vec::new();
    let mut total_profit = 0.0;
    for tkn in tokens {
        let result = find_arbitrage(&scratch, tkn, numeraire, prices[tkn], params)?;
        if let Some(swap) = &result.swap {
            scratch.apply_delta(&swap.to_pool_delta())?;
            total_profit += result.profit;
            trades.push(result);
        }
    }

    info!(trades = trades.len(), total_profit, "arbitrage sweep finished");
    Ok(SweepResult { trades, total_profit, pool: scratch })
}

/// Executes both legs of `result` for `agent`: the Omnipool swap, then the external-market
/// leg booked directly in the ledger. The swap is re-quoted against the current pool, so the
/// realized profit can differ from `result.profit` if the pool moved.
///
/// Returns the committed swap. Nothing is booked if the swap is rejected.
pub fn execute_arbitrage(omnipool: &mut Omnipool, agent: &str, result: &ArbitrageResult) -> Result<Option<SwapResult>> {
    let direction = match result.direction {
        Some(direction) => direction,
        None => return Ok(None),
    };
    let tkn = result.tkn.as_str();
    let numeraire = result.numeraire.as_str();

    let swap = match direction {
        ArbitrageDirection::BuyFromPool => {
            let swap = omnipool.buy(agent, numeraire, tkn, result.amount)?;
            let ledger = omnipool.ledger_mut();
            ledger.credit(agent, tkn, -result.amount);
            ledger.credit(agent, numeraire, result.amount * result.cex_price * (1.0 - result.cex_fee));
            swap
        }
        ArbitrageDirection::SellToPool => {
            let swap = omnipool.sell(agent, tkn, numeraire, result.amount)?;
            let ledger = omnipool.ledger_mut();
            ledger.credit(agent, tkn, result.amount);
            ledger.credit(agent, numeraire, -result.amount * result.cex_price / (1.0 - result.cex_fee));
            swap
        }
    };
    info!(agent, tkn, numeraire, ?direction, amount = result.amount, "arbitrage executed");
    Ok(Some(swap))
}
