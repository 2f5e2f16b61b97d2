// omnipool_rs/src/lib.rs

pub mod arbitrage;
pub mod config;
pub mod engine;
pub mod fees;
pub mod ledger;
pub mod shared;
pub mod solvers;
pub mod state;
pub mod types;

// Re-export key types and functions for easier use by library consumers.
pub use arbitrage::{
    execute_arbitrage, find_arbitrage, sweep_arbitrage, ArbitrageDirection, ArbitrageParams,
    ArbitrageResult, SweepResult,
};
pub use config::{AssetConfig, OmnipoolConfig};
pub use engine::{
    buy, buy_with_lrna, configure_fees, get_imbalance, get_reserve, get_sub_pool_balance, sell,
    sell_lrna, Omnipool, SwapEngine,
};
pub use fees::{FeeAccountant, FeeOverride, FeeSchedule, FeeSplit};
pub use ledger::AgentLedger;
pub use shared::SharedOmnipool;
pub use state::{AssetState, PoolState};
pub use types::{
    AgentId, Amount, Asset, Fee, Holdings, Price, // Basic types
    AssetDelta, LrnaSwapResult, PoolDelta, SwapResult, LRNA, // Deltas and results
    OmnipoolError, Result, // Error handling
};
