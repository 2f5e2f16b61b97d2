//! Swap Property Tests
//!
//! Properties that every sell and buy must satisfy, independent of the
//! particular pool shape, fee levels, or trade size.

use approx::relative_eq;
use omnipool_rs::{FeeSchedule, Omnipool, OmnipoolError, PoolState, SwapEngine, LRNA};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct PoolShape {
    reserve_in: f64,
    intermediary_in: f64,
    reserve_out: f64,
    intermediary_out: f64,
}

fn build_pool(shape: &PoolShape, asset_fee: f64, protocol_fee: f64, imbalance: f64) -> Omnipool {
    let mut pool = PoolState::new(FeeSchedule::new(asset_fee, protocol_fee).unwrap());
    pool.add_asset("IN", shape.reserve_in, shape.intermediary_in).unwrap();
    pool.add_asset("OUT", shape.reserve_out, shape.intermediary_out).unwrap();
    Omnipool::new(pool.with_imbalance(imbalance).unwrap())
}

// Largest OUT purchase the IN side's intermediary balance can fund.
fn max_buy(shape: &PoolShape, asset_fee: f64, protocol_fee: f64) -> f64 {
    let funding = shape.intermediary_in * (1.0 - protocol_fee);
    shape.reserve_out * (1.0 - asset_fee) * funding / (shape.intermediary_out + funding)
}

fn conserved_total(pool: &PoolState) -> f64 {
    pool.total_intermediary() + pool.imbalance() + pool.sub_pool_balance()
}

// Property test strategies
prop_compose! {
    fn valid_balance()
        (balance in 1_000.0f64..1e9) -> f64 {
        balance
    }
}

prop_compose! {
    fn valid_fee()
        (fee_basis_points in 0u32..500u32) -> f64 {
        fee_basis_points as f64 / 10_000.0
    }
}

prop_compose! {
    fn pool_shape()
        (
            reserve_in in valid_balance(),
            intermediary_in in valid_balance(),
            reserve_out in valid_balance(),
            intermediary_out in valid_balance(),
        ) -> PoolShape {
        PoolShape { reserve_in, intermediary_in, reserve_out, intermediary_out }
    }
}

proptest! {
    /// Property: without fees each touched asset keeps R * Q constant.
    #[test]
    fn zero_fee_sell_preserves_products(
        shape in pool_shape(),
        fraction in 1e-6f64..0.9,
    ) {
        let mut omnipool = build_pool(&shape, 0.0, 0.0, 0.0);
        let amount = shape.reserve_in * fraction;
        omnipool.sell("trader", "IN", "OUT", amount).unwrap();

        let k_in = omnipool.pool().asset_state("IN").unwrap().invariant();
        let k_out = omnipool.pool().asset_state("OUT").unwrap().invariant();
        prop_assert!(relative_eq!(k_in, shape.reserve_in * shape.intermediary_in, max_relative = 1e-7));
        prop_assert!(relative_eq!(k_out, shape.reserve_out * shape.intermediary_out, max_relative = 1e-7));
    }

    /// Property: the imbalance only moves toward zero and never crosses it.
    #[test]
    fn imbalance_moves_toward_zero(
        shape in pool_shape(),
        asset_fee in valid_fee(),
        protocol_fee in valid_fee(),
        imbalance in -1_000.0f64..=0.0,
        fraction in 1e-6f64..0.9,
    ) {
        let mut omnipool = build_pool(&shape, asset_fee, protocol_fee, imbalance);
        let result = omnipool.sell("trader", "IN", "OUT", shape.reserve_in * fraction).unwrap();

        let after = omnipool.pool().imbalance();
        prop_assert!(after >= imbalance);
        prop_assert!(after <= 0.0);
        prop_assert!(result.delta_imbalance >= 0.0);
        prop_assert!(result.delta_sub_pool >= 0.0);
    }

    /// Property: buys move the imbalance toward zero as well.
    #[test]
    fn buy_moves_imbalance_toward_zero(
        shape in pool_shape(),
        asset_fee in valid_fee(),
        protocol_fee in valid_fee(),
        imbalance in -1_000.0f64..=0.0,
        fraction in 1e-6f64..0.9,
    ) {
        let mut omnipool = build_pool(&shape, asset_fee, protocol_fee, imbalance);
        let amount = max_buy(&shape, asset_fee, protocol_fee) * fraction;
        let result = omnipool.buy("trader", "IN", "OUT", amount).unwrap();

        let after = omnipool.pool().imbalance();
        prop_assert!(after >= imbalance);
        prop_assert!(after <= 0.0);
        prop_assert!(result.fee_amount >= 0.0);
        prop_assert!(result.delta_sub_pool >= 0.0);
    }

    /// Property: selling LRNA directly only ever deepens the imbalance.
    #[test]
    fn lrna_sell_deepens_imbalance(
        shape in pool_shape(),
        asset_fee in valid_fee(),
        imbalance in -1_000.0f64..=0.0,
        fraction in 1e-6f64..10.0,
    ) {
        let mut omnipool = build_pool(&shape, asset_fee, 0.0, imbalance);
        let lrna_in = shape.intermediary_out * fraction;
        let result = omnipool.sell_lrna("trader", "OUT", lrna_in).unwrap();

        prop_assert!(result.delta_imbalance < 0.0);
        prop_assert!(omnipool.pool().imbalance() < imbalance);
        prop_assert_eq!(omnipool.ledger().balance("trader", LRNA), -lrna_in);
        prop_assert!(omnipool.pool().reserve("OUT").unwrap() > 0.0);
    }

    /// Property: the sub-pool only accrues once the imbalance is fully repaid.
    #[test]
    fn sub_pool_accrues_only_after_repayment(
        shape in pool_shape(),
        protocol_fee in valid_fee(),
        imbalance in -10.0f64..=0.0,
        fraction in 1e-6f64..0.9,
    ) {
        let mut omnipool = build_pool(&shape, 0.0, protocol_fee, imbalance);
        let result = omnipool.sell("trader", "IN", "OUT", shape.reserve_in * fraction).unwrap();

        if result.delta_sub_pool > 0.0 {
            prop_assert_eq!(omnipool.pool().imbalance(), 0.0);
        }
        prop_assert!(relative_eq!(
            result.delta_imbalance + result.delta_sub_pool,
            result.fee_amount,
            epsilon = 1e-12,
            max_relative = 1e-12
        ));
    }

    /// Property: buys route fees the same way, from the back-solved intermediary leg.
    #[test]
    fn buy_sub_pool_accrues_only_after_repayment(
        shape in pool_shape(),
        protocol_fee in valid_fee(),
        imbalance in -10.0f64..=0.0,
        fraction in 1e-6f64..0.9,
    ) {
        let mut omnipool = build_pool(&shape, 0.0, protocol_fee, imbalance);
        let amount = max_buy(&shape, 0.0, protocol_fee) * fraction;
        let result = omnipool.buy("trader", "IN", "OUT", amount).unwrap();

        if result.delta_sub_pool > 0.0 {
            prop_assert_eq!(omnipool.pool().imbalance(), 0.0);
        }
        prop_assert!(relative_eq!(
            result.fee_amount,
            -result.delta_intermediary_in * protocol_fee,
            epsilon = 1e-12,
            max_relative = 1e-12
        ));
        prop_assert!(relative_eq!(
            result.delta_imbalance + result.delta_sub_pool,
            result.fee_amount,
            epsilon = 1e-12,
            max_relative = 1e-12
        ));
    }

    /// Property: agent holdings move opposite to the pool reserves.
    #[test]
    fn ledger_mirrors_reserve_changes(
        shape in pool_shape(),
        asset_fee in valid_fee(),
        protocol_fee in valid_fee(),
        fraction in 1e-6f64..0.9,
    ) {
        let mut omnipool = build_pool(&shape, asset_fee, protocol_fee, 0.0);
        let amount = max_buy(&shape, asset_fee, protocol_fee) * fraction;
        let result = omnipool.buy("trader", "IN", "OUT", amount).unwrap();

        let ledger = omnipool.ledger();
        prop_assert_eq!(ledger.balance("trader", "IN"), -result.delta_reserve_in);
        prop_assert_eq!(ledger.balance("trader", "OUT"), -result.delta_reserve_out);
        prop_assert_eq!(ledger.balance("trader", "OUT"), amount);
    }

    /// Property: selling the whole reserve or more is rejected with no state change.
    #[test]
    fn oversized_sell_is_rejected(
        shape in pool_shape(),
        asset_fee in valid_fee(),
        protocol_fee in valid_fee(),
        multiple in 1.0f64..10.0,
    ) {
        let mut omnipool = build_pool(&shape, asset_fee, protocol_fee, 0.0);
        let before = omnipool.clone();
        let err = omnipool.sell("trader", "IN", "OUT", shape.reserve_in * multiple).unwrap_err();
        let is_invalid_amount = matches!(err, OmnipoolError::InvalidAmount { .. });
        prop_assert!(is_invalid_amount);
        prop_assert_eq!(omnipool, before);
    }

    /// Property: intermediary balances plus both fee counters are conserved.
    #[test]
    fn intermediary_is_conserved(
        shape in pool_shape(),
        asset_fee in valid_fee(),
        protocol_fee in valid_fee(),
        imbalance in -100.0f64..=0.0,
        fraction in 1e-6f64..0.9,
    ) {
        let mut omnipool = build_pool(&shape, asset_fee, protocol_fee, imbalance);
        let total = conserved_total(omnipool.pool());
        omnipool.sell("trader", "IN", "OUT", shape.reserve_in * fraction).unwrap();
        prop_assert!(relative_eq!(conserved_total(omnipool.pool()), total, max_relative = 1e-9));
    }

    /// Property: buys conserve the intermediary balances plus both fee counters.
    #[test]
    fn buy_conserves_intermediary(
        shape in pool_shape(),
        asset_fee in valid_fee(),
        protocol_fee in valid_fee(),
        imbalance in -100.0f64..=0.0,
        fraction in 1e-6f64..0.9,
    ) {
        let mut omnipool = build_pool(&shape, asset_fee, protocol_fee, imbalance);
        let total = conserved_total(omnipool.pool());
        let amount = max_buy(&shape, asset_fee, protocol_fee) * fraction;
        omnipool.buy("trader", "IN", "OUT", amount).unwrap();
        prop_assert!(relative_eq!(conserved_total(omnipool.pool()), total, max_relative = 1e-9));
    }

    /// Property: without fees, buying back what was sold restores the pool and costs
    /// exactly what the sale paid out.
    #[test]
    fn zero_fee_round_trip(
        shape in pool_shape(),
        fraction in 1e-4f64..0.5,
    ) {
        let omnipool = build_pool(&shape, 0.0, 0.0, 0.0);
        let amount = shape.reserve_in * fraction;

        let sold = SwapEngine::quote_sell(omnipool.pool(), "IN", "OUT", amount).unwrap();
        let after_sell = omnipool.pool().with_delta(&sold.to_pool_delta()).unwrap();
        let bought = SwapEngine::quote_buy(&after_sell, "OUT", "IN", amount).unwrap();
        let after_buy = after_sell.with_delta(&bought.to_pool_delta()).unwrap();

        prop_assert!(relative_eq!(bought.amount_in(), sold.amount_out(), max_relative = 1e-9));
        for asset in ["IN", "OUT"] {
            let start = omnipool.pool().asset_state(asset).unwrap();
            let end = after_buy.asset_state(asset).unwrap();
            prop_assert!(relative_eq!(end.reserve, start.reserve, max_relative = 1e-9));
            prop_assert!(relative_eq!(end.intermediary, start.intermediary, max_relative = 1e-9));
        }
    }
}
