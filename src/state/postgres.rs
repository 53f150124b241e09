//! PostgreSQL state store

use super::{OracleStore, SwapRepository};
use crate::config::DatabaseConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{FeeStatus, Hash, InteropBlock, InteropTransaction, PendingFee};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

/// State store for PostgreSQL persistence
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store
    pub async fn new(config: &DatabaseConfig) -> BridgeResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> BridgeResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS bridge_settled (
                source_hash BYTEA PRIMARY KEY,
                destination_hash BYTEA NOT NULL,
                settled_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bridge_pending (
                position BIGSERIAL,
                source_hash BYTEA PRIMARY KEY,
                destination_hash BYTEA NOT NULL,
                settle_hash BYTEA,
                time TIMESTAMPTZ NOT NULL,
                status VARCHAR(20) NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bridge_inprogress (
                source_hash BYTEA PRIMARY KEY,
                foreign_tx TEXT,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bridge_usedrpc (
                source_hash BYTEA PRIMARY KEY,
                endpoint TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS interop_cursors (
                platform VARCHAR(64) PRIMARY KEY,
                height BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS interop_blocks (
                platform VARCHAR(64) NOT NULL,
                height BIGINT NOT NULL,
                data JSONB NOT NULL,
                PRIMARY KEY (platform, height)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS interop_transactions (
                platform VARCHAR(64) NOT NULL,
                hash BYTEA NOT NULL,
                data JSONB NOT NULL,
                PRIMARY KEY (platform, hash)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!("Database migrations complete");
        Ok(())
    }

    fn row_to_fee(row: &PgRow) -> BridgeResult<PendingFee> {
        let status: String = row.get("status");
        let settle_hash: Option<Vec<u8>> = row.get("settle_hash");
        Ok(PendingFee {
            source_hash: bytes_to_hash(row.get("source_hash"))?,
            destination_hash: bytes_to_hash(row.get("destination_hash"))?,
            settle_hash: settle_hash.map(bytes_to_hash).transpose()?,
            time: row.get::<DateTime<Utc>, _>("time"),
            status: FeeStatus::parse(&status)
                .ok_or_else(|| BridgeError::Internal(format!("Unknown fee status {}", status)))?,
        })
    }
}

fn bytes_to_hash(bytes: Vec<u8>) -> BridgeResult<Hash> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| BridgeError::InvalidHash(hex::encode(b)))?;
    Ok(Hash(arr))
}

#[async_trait]
impl SwapRepository for PgStore {
    async fn in_progress(&self, source: &Hash) -> BridgeResult<Option<Option<String>>> {
        let row = sqlx::query("SELECT foreign_tx FROM bridge_inprogress WHERE source_hash = $1")
            .bind(&source.0[..])
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<Option<String>, _>("foreign_tx")))
    }

    async fn claim(&self, source: &Hash) -> BridgeResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO bridge_inprogress (source_hash, foreign_tx)
            VALUES ($1, NULL)
            ON CONFLICT (source_hash) DO NOTHING
            "#,
        )
        .bind(&source.0[..])
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_in_progress(&self, source: &Hash, foreign_tx: &str) -> BridgeResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bridge_inprogress (source_hash, foreign_tx, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (source_hash)
            DO UPDATE SET foreign_tx = $2, updated_at = NOW()
            "#,
        )
        .bind(&source.0[..])
        .bind(foreign_tx)
        .execute(&self.pool)
        .await?;

        debug!("Recorded foreign tx {} for swap {}", foreign_tx, source);
        Ok(())
    }

    async fn clear_in_progress_if(&self, source: &Hash, expected: Option<&str>) -> BridgeResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM bridge_inprogress
            WHERE source_hash = $1 AND foreign_tx IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(&source.0[..])
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn settled(&self, source: &Hash) -> BridgeResult<Option<Hash>> {
        let row = sqlx::query("SELECT destination_hash FROM bridge_settled WHERE source_hash = $1")
            .bind(&source.0[..])
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| bytes_to_hash(r.get("destination_hash")))
            .transpose()
    }

    async fn pending_fees(&self) -> BridgeResult<Vec<PendingFee>> {
        let rows = sqlx::query(
            r#"
            SELECT source_hash, destination_hash, settle_hash, time, status
            FROM bridge_pending
            ORDER BY position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_fee).collect()
    }

    async fn push_pending_fee(&self, fee: &PendingFee) -> BridgeResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bridge_pending (source_hash, destination_hash, settle_hash, time, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_hash) DO NOTHING
            "#,
        )
        .bind(&fee.source_hash.0[..])
        .bind(&fee.destination_hash.0[..])
        .bind(fee.settle_hash.map(|h| h.0.to_vec()))
        .bind(fee.time)
        .bind(fee.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_pending_fee(&self, fee: &PendingFee) -> BridgeResult<()> {
        sqlx::query(
            r#"
            UPDATE bridge_pending
            SET settle_hash = $2, time = $3, status = $4
            WHERE source_hash = $1
            "#,
        )
        .bind(&fee.source_hash.0[..])
        .bind(fee.settle_hash.map(|h| h.0.to_vec()))
        .bind(fee.time)
        .bind(fee.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finish_swap(&self, source: &Hash, destination: &Hash) -> BridgeResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bridge_settled (source_hash, destination_hash)
            VALUES ($1, $2)
            ON CONFLICT (source_hash) DO NOTHING
            "#,
        )
        .bind(&source.0[..])
        .bind(&destination.0[..])
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM bridge_inprogress WHERE source_hash = $1")
            .bind(&source.0[..])
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM bridge_pending WHERE source_hash = $1")
            .bind(&source.0[..])
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM bridge_usedrpc WHERE source_hash = $1")
            .bind(&source.0[..])
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Swap {} settled as {}", source, destination);
        Ok(())
    }

    async fn used_endpoint(&self, source: &Hash) -> BridgeResult<Option<String>> {
        let row = sqlx::query("SELECT endpoint FROM bridge_usedrpc WHERE source_hash = $1")
            .bind(&source.0[..])
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("endpoint")))
    }

    async fn set_used_endpoint(&self, source: &Hash, endpoint: &str) -> BridgeResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bridge_usedrpc (source_hash, endpoint)
            VALUES ($1, $2)
            ON CONFLICT (source_hash) DO UPDATE SET endpoint = $2
            "#,
        )
        .bind(&source.0[..])
        .bind(endpoint)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> BridgeResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OracleStore for PgStore {
    async fn cursor(&self, platform: &str) -> BridgeResult<Option<u64>> {
        let row = sqlx::query("SELECT height FROM interop_cursors WHERE platform = $1")
            .bind(platform)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<i64, _>("height") as u64))
    }

    async fn save_cursor(&self, platform: &str, height: u64) -> BridgeResult<()> {
        sqlx::query(
            r#"
            INSERT INTO interop_cursors (platform, height, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (platform)
            DO UPDATE SET height = GREATEST(interop_cursors.height, $2), updated_at = NOW()
            "#,
        )
        .bind(platform)
        .bind(height as i64)
        .execute(&self.pool)
        .await?;

        debug!("Saved cursor for {}: block {}", platform, height);
        Ok(())
    }

    async fn cached_blocks(&self, platform: &str) -> BridgeResult<Vec<InteropBlock>> {
        let rows = sqlx::query("SELECT data FROM interop_blocks WHERE platform = $1 ORDER BY height")
            .bind(platform)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|r| serde_json::from_value(r.get("data")).map_err(BridgeError::from))
            .collect()
    }

    async fn cached_block(&self, platform: &str, height: u64) -> BridgeResult<Option<InteropBlock>> {
        let row = sqlx::query("SELECT data FROM interop_blocks WHERE platform = $1 AND height = $2")
            .bind(platform)
            .bind(height as i64)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| serde_json::from_value(r.get("data")).map_err(BridgeError::from))
            .transpose()
    }

    async fn store_block(&self, block: &InteropBlock) -> BridgeResult<()> {
        sqlx::query(
            r#"
            INSERT INTO interop_blocks (platform, height, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (platform, height) DO UPDATE SET data = $3
            "#,
        )
        .bind(&block.platform)
        .bind(block.height as i64)
        .bind(serde_json::to_value(block)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cached_transaction(
        &self,
        platform: &str,
        hash: &Hash,
    ) -> BridgeResult<Option<InteropTransaction>> {
        let row = sqlx::query("SELECT data FROM interop_transactions WHERE platform = $1 AND hash = $2")
            .bind(platform)
            .bind(&hash.0[..])
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| serde_json::from_value(r.get("data")).map_err(BridgeError::from))
            .transpose()
    }

    async fn store_transaction(&self, tx: &InteropTransaction) -> BridgeResult<()> {
        sqlx::query(
            r#"
            INSERT INTO interop_transactions (platform, hash, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (platform, hash) DO NOTHING
            "#,
        )
        .bind(&tx.platform)
        .bind(&tx.hash.0[..])
        .bind(serde_json::to_value(tx)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_hash;

    async fn connect() -> Option<PgStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let store = PgStore::new(&DatabaseConfig {
            url,
            max_connections: 2,
            min_connections: 1,
            in_memory: false,
        })
        .await
        .ok()?;
        store.run_migrations().await.ok()?;
        Some(store)
    }

    #[tokio::test]
    async fn test_claim_and_finish_roundtrip() {
        let Some(store) = connect().await else {
            return;
        };
        let src = Hash([0xf1; 32]);
        let dst = test_hash(0xf2);
        sqlx::query("DELETE FROM bridge_inprogress WHERE source_hash = $1")
            .bind(&src.0[..])
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(store.claim(&src).await.unwrap());
        assert!(!store.claim(&src).await.unwrap());
        store.set_in_progress(&src, "0xabc").await.unwrap();
        assert!(!store.clear_in_progress_if(&src, None).await.unwrap());
        store.set_used_endpoint(&src, "http://seed1:10332").await.unwrap();
        store
            .push_pending_fee(&PendingFee::new(src, dst, Utc::now()))
            .await
            .unwrap();
        store.finish_swap(&src, &dst).await.unwrap();

        assert_eq!(store.settled(&src).await.unwrap(), Some(dst));
        assert_eq!(store.in_progress(&src).await.unwrap(), None);
        assert_eq!(store.used_endpoint(&src).await.unwrap(), None);
        assert!(store
            .pending_fees()
            .await
            .unwrap()
            .iter()
            .all(|f| f.source_hash != src));
    }
}
