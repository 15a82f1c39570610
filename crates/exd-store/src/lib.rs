//! Durable order store backed by SQLite.
//!
//! Each row carries the queryable lifecycle columns (status, broker id,
//! fill accounting, timestamps) plus the full [`Order`] as an opaque
//! serialized blob, so schema evolution never requires re-encoding history.
//! The `broker_id` and fill columns are authoritative over the blob: they
//! are updated in place after submission while the blob keeps the order as
//! it was created.
//!
//! Status updates enforce the lifecycle DAG. Re-asserting the current
//! status is an idempotent success (cancelling an already-cancelled order
//! must not fail); any other illegal transition is a `State` error.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use exd_schemas::{
    iso_millis, parse_iso_millis, EngineError, EngineResult, Order, OrderStatus, StoredOrder,
};

const SCHEMA_SQL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS orders (
       local_id TEXT PRIMARY KEY,
       broker_id TEXT UNIQUE,
       symbol TEXT NOT NULL,
       side INTEGER NOT NULL,
       quantity REAL NOT NULL,
       price REAL,
       order_type INTEGER NOT NULL,
       status INTEGER NOT NULL,
       time_in_force INTEGER NOT NULL,
       account_id TEXT NOT NULL,
       strategy_id TEXT NOT NULL,
       created_at TEXT NOT NULL,
       updated_at TEXT,
       filled_quantity REAL DEFAULT 0.0,
       avg_fill_price REAL DEFAULT 0.0,
       order_proto BLOB NOT NULL
     )",
    "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)",
    "CREATE INDEX IF NOT EXISTS idx_orders_strategy ON orders(strategy_id)",
    "CREATE INDEX IF NOT EXISTS idx_orders_broker_id ON orders(broker_id)",
    "CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders(created_at)",
];

pub struct OrderStore {
    pool: SqlitePool,
}

impl OrderStore {
    /// Open (creating if missing) an order store at `path`.
    pub async fn open_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        Self::open_with(opts).await
    }

    /// Open an in-memory store; used by tests and dry runs.
    pub async fn open_in_memory() -> EngineResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| EngineError::persistence(format!("order store options: {e}")))?;
        Self::open_with(opts).await
    }

    async fn open_with(opts: SqliteConnectOptions) -> EngineResult<Self> {
        // One connection: the store serializes its own writes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(|e| EngineError::persistence(format!("open order store database: {e}")))?;

        for statement in SCHEMA_SQL {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| {
                    EngineError::persistence(format!("create order store schema: {e}"))
                })?;
        }

        Ok(Self { pool })
    }

    /// Insert a new order row. Fails if the local id already exists.
    pub async fn store_order(&self, stored: &StoredOrder) -> EngineResult<()> {
        let order = &stored.order;
        let payload = serde_json::to_vec(order)
            .map_err(|e| EngineError::persistence(format!("serialize order payload: {e}")))?;

        sqlx::query(
            "INSERT INTO orders (\
               local_id, broker_id, symbol, side, quantity, price, \
               order_type, status, time_in_force, account_id, strategy_id, \
               created_at, filled_quantity, avg_fill_price, order_proto\
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.local_id)
        .bind(order.broker_id.as_deref())
        .bind(&order.symbol)
        .bind(order.side.code())
        .bind(order.quantity)
        .bind(order.limit_price)
        .bind(order.order_type.code())
        .bind(stored.status.code())
        .bind(order.time_in_force.code())
        .bind(&order.account_id)
        .bind(&order.strategy_id)
        .bind(iso_millis(&stored.created_at))
        .bind(stored.filled_quantity)
        .bind(stored.avg_fill_price)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::persistence(format!("insert order: {e}")))?;

        Ok(())
    }

    /// Move an order to `new_status`, stamping `updated_at`.
    ///
    /// Re-asserting the current status succeeds without touching the row;
    /// transitions that leave the lifecycle DAG are a `State` error.
    pub async fn update_order_status(
        &self,
        local_id: &str,
        new_status: OrderStatus,
    ) -> EngineResult<()> {
        let current = self.get_order(local_id).await?.status;

        if current == new_status {
            return Ok(());
        }
        if !current.can_transition_to(new_status) {
            return Err(EngineError::state(format!(
                "Illegal status transition for {local_id}: {current} -> {new_status}"
            )));
        }

        sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE local_id = ?")
            .bind(new_status.code())
            .bind(iso_millis(&Utc::now()))
            .bind(local_id)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::persistence(format!("update order status: {e}")))?;

        Ok(())
    }

    /// Record the broker-assigned id after the gateway accepts.
    pub async fn update_broker_id(&self, local_id: &str, broker_id: &str) -> EngineResult<()> {
        let done = sqlx::query("UPDATE orders SET broker_id = ?, updated_at = ? WHERE local_id = ?")
            .bind(broker_id)
            .bind(iso_millis(&Utc::now()))
            .bind(local_id)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::persistence(format!("update broker id: {e}")))?;

        if done.rows_affected() == 0 {
            return Err(EngineError::state(format!("Order not found: {local_id}")));
        }
        Ok(())
    }

    /// Overwrite the cumulative fill columns with the broker-reported values.
    pub async fn update_fill_info(
        &self,
        local_id: &str,
        filled_quantity: f64,
        avg_price: f64,
    ) -> EngineResult<()> {
        let done = sqlx::query(
            "UPDATE orders SET filled_quantity = ?, avg_fill_price = ?, updated_at = ? \
             WHERE local_id = ?",
        )
        .bind(filled_quantity)
        .bind(avg_price)
        .bind(iso_millis(&Utc::now()))
        .bind(local_id)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::persistence(format!("update fill info: {e}")))?;

        if done.rows_affected() == 0 {
            return Err(EngineError::state(format!("Order not found: {local_id}")));
        }
        Ok(())
    }

    pub async fn get_order(&self, local_id: &str) -> EngineResult<StoredOrder> {
        let row = sqlx::query(SELECT_COLUMNS_WHERE_LOCAL_ID)
            .bind(local_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::persistence(format!("select order: {e}")))?;

        match row {
            Some(row) => parse_order(&row),
            None => Err(EngineError::state(format!("Order not found: {local_id}"))),
        }
    }

    /// Orders that a fill or a kill-switch sweep can still touch, oldest first.
    pub async fn get_open_orders(&self) -> EngineResult<Vec<StoredOrder>> {
        let rows = sqlx::query(
            "SELECT local_id, broker_id, status, created_at, updated_at, \
                    filled_quantity, avg_fill_price, order_proto \
             FROM orders WHERE status IN (?, ?, ?, ?) ORDER BY created_at ASC",
        )
        .bind(OrderStatus::PendingSubmission.code())
        .bind(OrderStatus::Submitted.code())
        .bind(OrderStatus::Accepted.code())
        .bind(OrderStatus::PartiallyFilled.code())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::persistence(format!("select open orders: {e}")))?;

        rows.iter().map(parse_order).collect()
    }

    pub async fn get_orders_by_status(&self, status: OrderStatus) -> EngineResult<Vec<StoredOrder>> {
        let rows = sqlx::query(
            "SELECT local_id, broker_id, status, created_at, updated_at, \
                    filled_quantity, avg_fill_price, order_proto \
             FROM orders WHERE status = ? ORDER BY created_at ASC",
        )
        .bind(status.code())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::persistence(format!("select orders by status: {e}")))?;

        rows.iter().map(parse_order).collect()
    }

    /// Closes the underlying pool. Subsequent calls fail with `Persistence`
    /// errors — tests use this to exercise failure paths.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

const SELECT_COLUMNS_WHERE_LOCAL_ID: &str =
    "SELECT local_id, broker_id, status, created_at, updated_at, \
            filled_quantity, avg_fill_price, order_proto \
     FROM orders WHERE local_id = ?";

fn parse_order(row: &SqliteRow) -> EngineResult<StoredOrder> {
    let payload: Vec<u8> = row.get("order_proto");
    let mut order: Order = serde_json::from_slice(&payload)
        .map_err(|e| EngineError::persistence(format!("deserialize order payload: {e}")))?;

    // Columns updated after creation win over the creation-time blob.
    order.broker_id = row.get::<Option<String>, _>("broker_id");

    let status_code: i64 = row.get("status");
    let created: String = row.get("created_at");
    let updated: Option<String> = row.get("updated_at");

    Ok(StoredOrder {
        order,
        status: OrderStatus::from_code(status_code)
            .ok_or_else(|| EngineError::persistence(format!("unknown status code: {status_code}")))?,
        filled_quantity: row.get("filled_quantity"),
        avg_fill_price: row.get("avg_fill_price"),
        created_at: parse_iso_millis(&created)
            .ok_or_else(|| EngineError::persistence(format!("bad created_at: {created}")))?,
        updated_at: updated.as_deref().and_then(parse_iso_millis),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use exd_schemas::{OrderType, Side, TimeInForce};
    use std::collections::BTreeMap;

    fn order(local_id: &str, symbol: &str, qty: f64) -> StoredOrder {
        StoredOrder::pending(Order {
            local_id: local_id.to_string(),
            broker_id: None,
            symbol: symbol.to_string(),
            side: Side::Buy,
            quantity: qty,
            limit_price: None,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Day,
            account_id: "paper".to_string(),
            strategy_id: "TEST".to_string(),
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
        })
    }

    async fn store() -> OrderStore {
        OrderStore::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn store_then_get_round_trips() {
        let s = store().await;
        let stored = order("ORD_1", "AAPL", 10.0);
        s.store_order(&stored).await.unwrap();

        let got = s.get_order("ORD_1").await.unwrap();
        assert_eq!(got.order, stored.order);
        assert_eq!(got.status, OrderStatus::PendingSubmission);
        assert_eq!(got.filled_quantity, 0.0);
        assert!(got.updated_at.is_none());
    }

    #[tokio::test]
    async fn get_unknown_order_is_a_state_error() {
        let s = store().await;
        let err = s.get_order("NONEXISTENT").await.unwrap_err();
        assert_eq!(err.kind, exd_schemas::ErrorKind::State);
        assert!(err.message.contains("NONEXISTENT"));
    }

    #[tokio::test]
    async fn status_update_stamps_updated_at() {
        let s = store().await;
        s.store_order(&order("ORD_2", "AAPL", 10.0)).await.unwrap();
        s.update_order_status("ORD_2", OrderStatus::Submitted)
            .await
            .unwrap();

        let got = s.get_order("ORD_2").await.unwrap();
        assert_eq!(got.status, OrderStatus::Submitted);
        assert!(got.updated_at.is_some());
    }

    #[tokio::test]
    async fn cancelling_twice_is_idempotent() {
        let s = store().await;
        s.store_order(&order("ORD_3", "AAPL", 10.0)).await.unwrap();
        s.update_order_status("ORD_3", OrderStatus::Submitted)
            .await
            .unwrap();
        s.update_order_status("ORD_3", OrderStatus::Cancelled)
            .await
            .unwrap();
        // Second cancel: success, no transition.
        s.update_order_status("ORD_3", OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(
            s.get_order("ORD_3").await.unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let s = store().await;
        s.store_order(&order("ORD_4", "AAPL", 10.0)).await.unwrap();
        s.update_order_status("ORD_4", OrderStatus::Submitted)
            .await
            .unwrap();
        s.update_order_status("ORD_4", OrderStatus::Filled)
            .await
            .unwrap();

        let err = s
            .update_order_status("ORD_4", OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert_eq!(err.kind, exd_schemas::ErrorKind::State);

        // The row is untouched.
        assert_eq!(
            s.get_order("ORD_4").await.unwrap().status,
            OrderStatus::Filled
        );
    }

    #[tokio::test]
    async fn broker_id_column_wins_over_payload() {
        let s = store().await;
        s.store_order(&order("ORD_5", "AAPL", 10.0)).await.unwrap();
        s.update_broker_id("ORD_5", "BRK_1").await.unwrap();

        let got = s.get_order("ORD_5").await.unwrap();
        assert_eq!(got.broker_id(), Some("BRK_1"));
    }

    #[tokio::test]
    async fn fill_info_updates_cumulative_columns() {
        let s = store().await;
        s.store_order(&order("ORD_6", "AAPL", 10.0)).await.unwrap();
        s.update_fill_info("ORD_6", 4.0, 150.0).await.unwrap();

        let got = s.get_order("ORD_6").await.unwrap();
        assert_eq!(got.filled_quantity, 4.0);
        assert_eq!(got.avg_fill_price, 150.0);

        s.update_fill_info("ORD_6", 10.0, 152.5).await.unwrap();
        let got = s.get_order("ORD_6").await.unwrap();
        assert_eq!(got.filled_quantity, 10.0);
        assert_eq!(got.avg_fill_price, 152.5);
    }

    #[tokio::test]
    async fn open_orders_exclude_terminal_states() {
        let s = store().await;
        s.store_order(&order("ORD_7", "AAPL", 10.0)).await.unwrap();
        s.store_order(&order("ORD_8", "MSFT", 5.0)).await.unwrap();
        s.update_order_status("ORD_8", OrderStatus::Submitted)
            .await
            .unwrap();
        s.store_order(&order("ORD_9", "TSLA", 3.0)).await.unwrap();
        s.update_order_status("ORD_9", OrderStatus::Rejected)
            .await
            .unwrap();

        let open = s.get_open_orders().await.unwrap();
        let ids: Vec<&str> = open.iter().map(|o| o.local_id()).collect();
        assert!(ids.contains(&"ORD_7"));
        assert!(ids.contains(&"ORD_8"));
        assert!(!ids.contains(&"ORD_9"));
    }

    #[tokio::test]
    async fn orders_by_status_filters_exactly() {
        let s = store().await;
        s.store_order(&order("ORD_A", "AAPL", 10.0)).await.unwrap();
        s.store_order(&order("ORD_B", "MSFT", 5.0)).await.unwrap();
        s.update_order_status("ORD_B", OrderStatus::Submitted)
            .await
            .unwrap();

        let pending = s
            .get_orders_by_status(OrderStatus::PendingSubmission)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].local_id(), "ORD_A");
    }

    #[tokio::test]
    async fn duplicate_local_id_insert_fails() {
        let s = store().await;
        s.store_order(&order("ORD_C", "AAPL", 10.0)).await.unwrap();
        let err = s.store_order(&order("ORD_C", "AAPL", 10.0)).await.unwrap_err();
        assert_eq!(err.kind, exd_schemas::ErrorKind::Persistence);
    }

    #[tokio::test]
    async fn closed_store_reports_persistence_errors() {
        let s = store().await;
        s.close().await;
        let err = s.store_order(&order("ORD_D", "AAPL", 1.0)).await.unwrap_err();
        assert_eq!(err.kind, exd_schemas::ErrorKind::Persistence);
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.db");

        {
            let s = OrderStore::open_file(&path).await.unwrap();
            s.store_order(&order("ORD_E", "AAPL", 10.0)).await.unwrap();
        }

        let s = OrderStore::open_file(&path).await.unwrap();
        assert_eq!(s.get_order("ORD_E").await.unwrap().order.symbol, "AAPL");
    }
}
