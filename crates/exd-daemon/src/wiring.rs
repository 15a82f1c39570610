//! Engine construction from configuration.
//!
//! One [`OrderManager`] per configured strategy, each with its own journal
//! and order-store database files under `data_dir` and its own gateway
//! instance, mirroring the per-strategy isolation of the stores.

use std::sync::Arc;

use anyhow::{Context, Result};

use exd_broker_paper::PaperGateway;
use exd_config::{EngineConfig, GatewayKind};
use exd_engine::Engine;
use exd_execution::{AllowAll, ExecutionGateway, OrderManager, OrderManagerConfig};
use exd_journal::Journal;
use exd_portfolio::PositionKeeper;
use exd_store::OrderStore;

/// Build an engine with one manager per configured strategy. Does not run
/// recovery or start the poller; the caller drives lifecycle.
pub async fn build_engine(config: &EngineConfig) -> Result<Engine> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("create data dir {}", config.data_dir.display()))?;

    let mut engine = Engine::new(config.fill_poll_interval());

    for strategy in &config.strategies {
        let journal_path = config.data_dir.join(format!("{}_journal.db", strategy.id));
        let store_path = config.data_dir.join(format!("{}_orders.db", strategy.id));

        let journal = Arc::new(
            Journal::open_file(&journal_path)
                .await
                .with_context(|| format!("open journal for {}", strategy.id))?,
        );
        let store = Arc::new(
            OrderStore::open_file(&store_path)
                .await
                .with_context(|| format!("open order store for {}", strategy.id))?,
        );

        let gateway: Arc<dyn ExecutionGateway> = match strategy.gateway {
            GatewayKind::Paper => Arc::new(PaperGateway::new()),
        };

        let manager = OrderManager::new(
            OrderManagerConfig::new(&strategy.id)
                .account_id(&strategy.account_id)
                .cancel_grace(config.cancel_grace()),
            gateway,
            journal,
            store,
            Arc::new(PositionKeeper::new()),
            Arc::new(AllowAll),
        );

        engine.register_strategy(Arc::new(manager));
    }

    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use exd_config::StrategyConfig;

    #[tokio::test]
    async fn builds_one_manager_per_strategy_with_file_backed_stores() {
        let dir = tempfile::tempdir().unwrap();
        let mut config: EngineConfig =
            serde_json::from_value(serde_json::json!({})).unwrap();
        config.data_dir = dir.path().to_path_buf();
        config.strategies = vec![
            StrategyConfig {
                id: "ALPHA".to_string(),
                gateway: GatewayKind::Paper,
                account_id: "paper".to_string(),
            },
            StrategyConfig {
                id: "BETA".to_string(),
                gateway: GatewayKind::Paper,
                account_id: "paper".to_string(),
            },
        ];

        let engine = build_engine(&config).await.unwrap();
        let mut ids = engine.strategy_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec!["ALPHA", "BETA"]);

        // Per-strategy database files exist on disk.
        assert!(dir.path().join("ALPHA_journal.db").exists());
        assert!(dir.path().join("ALPHA_orders.db").exists());
        assert!(dir.path().join("BETA_journal.db").exists());
        assert!(dir.path().join("BETA_orders.db").exists());

        engine.start().await.unwrap();
    }
}

