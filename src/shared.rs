// omnipool_rs/src/shared.rs
use crate::engine::{Omnipool, SwapEngine};
use crate::types::{Amount, Fee, LrnaSwapResult, Result, SwapResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// Thread-safe handle to one Omnipool instance.
///
/// Every swap quotes and commits under the same write lock, so two swaps can never be
/// priced off the same stale snapshot. Reads only take the read lock. Clones share the pool.
#[derive(Debug, Clone, Default)]
pub struct SharedOmnipool {
    inner: Arc<RwLock<Omnipool>>,
}

impl SharedOmnipool {
    pub fn new(omnipool: Omnipool) -> Self {
        Self { inner: Arc::new(RwLock::new(omnipool)) }
    }

    pub fn sell(&self, agent: &str, asset_in: &str, asset_out: &str, amount_in: Amount) -> Result<SwapResult> {
        self.inner.write().sell(agent, asset_in, asset_out, amount_in)
    }

    pub fn buy(&self, agent: &str, asset_in: &str, asset_out: &str, amount_out: Amount) -> Result<SwapResult> {
        self.inner.write().buy(agent, asset_in, asset_out, amount_out)
    }

    pub fn sell_lrna(&self, agent: &str, asset_out: &str, lrna_in: Amount) -> Result<LrnaSwapResult> {
        self.inner.write().sell_lrna(agent, asset_out, lrna_in)
    }

    pub fn buy_with_lrna(&self, agent: &str, asset_out: &str, amount_out: Amount) -> Result<LrnaSwapResult> {
        self.inner.write().buy_with_lrna(agent, asset_out, amount_out)
    }

    pub fn quote_sell(&self, asset_in: &str, asset_out: &str, amount_in: Amount) -> Result<SwapResult> {
        SwapEngine::quote_sell(self.inner.read().pool(), asset_in, asset_out, amount_in)
    }

    pub fn quote_buy(&self, asset_in: &str, asset_out: &str, amount_out: Amount) -> Result<SwapResult> {
        SwapEngine::quote_buy(self.inner.read().pool(), asset_in, asset_out, amount_out)
    }

    pub fn configure_fees(&self, asset_fee: Fee, protocol_fee: Fee) -> Result<()> {
        self.inner.write().configure_fees(asset_fee, protocol_fee)
    }

    pub fn reserve(&self, asset: &str) -> Result<Amount> {
        self.inner.read().pool().reserve(asset)
    }

    pub fn imbalance(&self) -> Amount {
        self.inner.read().pool().imbalance()
    }

    pub fn sub_pool_balance(&self) -> Amount {
        self.inner.read().pool().sub_pool_balance()
    }

    /// Consistent copy of the pool and ledger at one point in time.
    pub fn snapshot(&self) -> Omnipool {
        self.inner.read().clone()
    }

    /// Runs `f` with exclusive access, e.g. to fund agents or batch several swaps.
    pub fn with_mut<T>(&self, f: impl FnOnce(&mut Omnipool) -> T) -> T {
        let mut guard = self.inner.write();
        f(&mut *guard)
    }
}
