// omnipool_rs/demos/omnipool_demo.rs

use omnipool_rs::{
    find_arbitrage, sweep_arbitrage, ArbitrageParams, Omnipool, OmnipoolConfig, PoolState,
    SharedOmnipool,
};
use std::collections::HashMap;
use tracing::info;

const DEFAULT_CONFIG: &str = r#"{
    "asset_fee": 0.0025,
    "protocol_fee": 0.0005,
    "imbalance": -50.0,
    "sub_pool_asset": "HDX",
    "assets": {
        "USDT": { "reserve": 1000000.0, "price": 1.0 },
        "DOT":  { "reserve": 100000.0, "price": 5.0 },
        "HDX":  { "reserve": 50000000.0, "price": 0.008, "asset_fee": 0.005 },
        "WETH": { "reserve": 400.0, "price": 2500.0 }
    }
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("omnipool_rs=info".parse()?),
        )
        .init();

    println!("Omnipool Example");

    // 1. Load the pool, from a file if one is given.
    let config = match std::env::args().nth(1) {
        Some(path) => OmnipoolConfig::from_json_file(path)?,
        None => OmnipoolConfig::from_json_str(DEFAULT_CONFIG)?,
    };
    let pool = config.build()?;
    print_pool("Initial pool", &pool);

    // 2. A few agents trade against a shared handle.
    let shared = SharedOmnipool::new(Omnipool::new(pool));
    let sold = shared.sell("alice", "DOT", "USDT", 1_000.0)?;
    println!(
        "\nalice sold {:.2} DOT for {:.2} USDT (price {:.4}, fee {:.6} LRNA)",
        sold.amount_in(),
        sold.amount_out(),
        sold.execution_price(),
        sold.fee_amount
    );
    let bought = shared.buy("bob", "USDT", "WETH", 2.0)?;
    println!(
        "bob bought {:.2} WETH for {:.2} USDT (price {:.4})",
        bought.amount_out(),
        bought.amount_in(),
        bought.execution_price()
    );
    let lrna = shared.sell_lrna("dave", "DOT", 250.0)?;
    println!(
        "dave paid {:.2} LRNA for {:.4} DOT, imbalance moved by {:.4}",
        lrna.amount_in(),
        lrna.amount_out(),
        lrna.delta_imbalance
    );
    if let Err(e) = shared.sell("carol", "WETH", "USDT", 10_000.0) {
        println!("carol's oversized sell was rejected: {}", e);
    }
    println!(
        "imbalance {:.6}, sub-pool {:.6}",
        shared.imbalance(),
        shared.sub_pool_balance()
    );

    // 3. Look for arbitrage against external prices, in USDT.
    let snapshot = shared.snapshot();
    let mut prices = HashMap::new();
    prices.insert("DOT".to_string(), 5.2);
    prices.insert("HDX".to_string(), 0.0079);
    prices.insert("WETH".to_string(), 2500.0);
    let params = ArbitrageParams { cex_fee: 0.001, ..ArbitrageParams::default() };

    println!("\nSingle-asset searches:");
    for tkn in ["DOT", "HDX", "WETH"] {
        let result = find_arbitrage(snapshot.pool(), tkn, "USDT", prices[tkn], &params)?;
        match result.direction {
            Some(direction) => println!(
                "  {}: {:?} {:.4} for {:.2} USDT profit",
                tkn, direction, result.amount, result.profit
            ),
            None => println!("  {}: no opportunity", tkn),
        }
    }

    let sweep = sweep_arbitrage(snapshot.pool(), &prices, "USDT", &params)?;
    info!(trades = sweep.trades.len(), "sweep complete");
    println!("\nSweep executed {} trades for {:.2} USDT total", sweep.trades.len(), sweep.total_profit);
    print_pool("Pool after sweep", &sweep.pool);

    // 4. Agent holdings after the swaps in step 2.
    println!("\nHoldings:");
    let ledger = snapshot.ledger();
    let mut agents: Vec<_> = ledger.agents().collect();
    agents.sort();
    for agent in agents {
        if let Some(holdings) = ledger.holdings(agent) {
            let mut entries: Vec<_> = holdings.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            println!("  {}: {:?}", agent, entries);
        }
    }

    Ok(())
}

fn print_pool(title: &str, pool: &PoolState) {
    println!("\n{}:", title);
    for asset in pool.asset_names() {
        if let (Ok(state), Ok(price)) = (pool.asset_state(&asset), pool.price_in(&asset, "USDT")) {
            println!(
                "  {:<5} R = {:>16.4}  Q = {:>14.4}  price = {:.6} USDT",
                asset, state.reserve, state.intermediary, price
            );
        }
    }
    println!("  imbalance = {:.6}, sub-pool = {:.6}", pool.imbalance(), pool.sub_pool_balance());
}
