use crate::config::DatabaseConfig;
use crate::vin::{parse_photo_url, DecodedAttributes, VinNumber, VinRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Record store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a record for VIN {0} already exists")]
    DuplicateKey(VinNumber),

    #[error("stored record for VIN {vin:?} is invalid: {reason}")]
    CorruptRecord { vin: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Key-value-by-VIN persistence for lookup results
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_key(&self, vin: &VinNumber) -> Result<Option<VinRecord>, StoreError>;

    /// Fails with `DuplicateKey` if a record for the VIN already exists
    async fn insert(&self, record: &VinRecord) -> Result<(), StoreError>;

    /// All records in insertion order
    async fn list_all(&self) -> Result<Vec<VinRecord>, StoreError>;

    /// Returns true iff a record was removed
    async fn delete_by_key(&self, vin: &VinNumber) -> Result<bool, StoreError>;

    /// Cheap connectivity probe for readiness checks
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Row shape of the `vin_records` table
#[derive(Debug, FromRow)]
struct VinRow {
    vin_number: String,
    make: String,
    model: String,
    model_year: String,
    body_class: String,
    photo_url: Option<String>,
}

impl TryFrom<VinRow> for VinRecord {
    type Error = StoreError;

    fn try_from(row: VinRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::CorruptRecord {
            vin: row.vin_number.clone(),
            reason,
        };

        let vin = VinNumber::normalize(&row.vin_number).map_err(|e| corrupt(e.to_string()))?;
        let attributes = DecodedAttributes::new(&row.make, &row.model, &row.model_year, &row.body_class)
            .map_err(|e| corrupt(e.to_string()))?;
        let photo_url = row
            .photo_url
            .as_deref()
            .map(parse_photo_url)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(VinRecord::new(vin, attributes, photo_url))
    }
}

/// SQLite-backed record store
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Create a new record store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("Invalid database URL {:?}", config.url))?
            .create_if_missing(true);

        let pool_options = if config.is_in_memory() {
            // Every connection to :memory: is a separate database, so keep exactly one alive
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .idle_timeout(Some(config.idle_timeout()))
        };

        let pool = pool_options
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite")?;

        info!(url = %config.url, "Connected to record store");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Delete every record (startup cache reset)
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM vin_records")
            .execute(&self.pool)
            .await
            .context("Failed to clear record store")?;

        info!(deleted_count = result.rows_affected(), "Record store cleared");

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    #[instrument(skip(self), fields(vin = %vin))]
    async fn find_by_key(&self, vin: &VinNumber) -> Result<Option<VinRecord>, StoreError> {
        let row = sqlx::query_as::<_, VinRow>(
            r#"
            SELECT vin_number, make, model, model_year, body_class, photo_url
            FROM vin_records
            WHERE vin_number = ?
            "#,
        )
        .bind(vin.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(VinRecord::try_from).transpose()
    }

    #[instrument(skip(self, record), fields(vin = %record.vin_number()))]
    async fn insert(&self, record: &VinRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO vin_records (
                vin_number, make, model, model_year, body_class, photo_url
            ) VALUES (
                ?, ?, ?, ?, ?, ?
            )
            ON CONFLICT(vin_number) DO NOTHING
            "#,
        )
        .bind(record.vin_number().as_str())
        .bind(record.make())
        .bind(record.model())
        .bind(record.model_year())
        .bind(record.body_class())
        .bind(record.photo_url().map(|url| url.as_str()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateKey(record.vin_number().clone()));
        }

        debug!(has_photo = record.photo_url().is_some(), "VIN record inserted");

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<VinRecord>, StoreError> {
        let rows = sqlx::query_as::<_, VinRow>(
            r#"
            SELECT vin_number, make, model, model_year, body_class, photo_url
            FROM vin_records
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VinRecord::try_from).collect()
    }

    #[instrument(skip(self), fields(vin = %vin))]
    async fn delete_by_key(&self, vin: &VinNumber) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM vin_records WHERE vin_number = ?")
            .bind(vin.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Migrated store on a private in-memory database
    pub(crate) async fn memory_store() -> SqliteRecordStore {
        let store = SqliteRecordStore::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        store.run_migrations().await.unwrap();
        store
    }

    /// Store whose writes always fail; reads fail too when `reads_fail` is set
    pub(crate) struct FailingStore {
        pub(crate) reads_fail: bool,
    }

    #[async_trait]
    impl RecordStore for FailingStore {
        async fn find_by_key(&self, _vin: &VinNumber) -> Result<Option<VinRecord>, StoreError> {
            if self.reads_fail {
                return Err(sqlx::Error::PoolClosed.into());
            }
            Ok(None)
        }

        async fn insert(&self, _record: &VinRecord) -> Result<(), StoreError> {
            Err(sqlx::Error::PoolClosed.into())
        }

        async fn list_all(&self) -> Result<Vec<VinRecord>, StoreError> {
            Err(sqlx::Error::PoolClosed.into())
        }

        async fn delete_by_key(&self, _vin: &VinNumber) -> Result<bool, StoreError> {
            Err(sqlx::Error::PoolClosed.into())
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(sqlx::Error::PoolClosed.into())
        }
    }

    pub(crate) fn record(vin: &str, photo: Option<&str>) -> VinRecord {
        VinRecord::new(
            VinNumber::normalize(vin).unwrap(),
            DecodedAttributes::new("Honda", "Accord", "2003", "Sedan").unwrap(),
            photo.map(|p| parse_photo_url(p).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = memory_store().await;
        let record = record("1HGCM82633A123456", Some("https://img.example.com/accord.jpg"));

        store.insert(&record).await.unwrap();

        let found = store.find_by_key(record.vin_number()).await.unwrap();
        assert_eq!(found, Some(record));
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let store = memory_store().await;
        let vin = VinNumber::normalize("5YJSA1E14HF000001").unwrap();

        assert!(store.find_by_key(&vin).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let store = memory_store().await;
        let first = record("1HGCM82633A123456", None);
        store.insert(&first).await.unwrap();

        let err = store.insert(&first).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(ref vin) if vin == first.vin_number()));

        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_all_in_insertion_order() {
        let store = memory_store().await;
        let vins = ["5YJSA1E14HF000001", "1HGCM82633A123456", "JH4KA7561PC008269"];
        for vin in vins {
            store.insert(&record(vin, None)).await.unwrap();
        }

        let listed: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .iter()
            .map(|r| r.vin_number().to_string())
            .collect();
        assert_eq!(listed, vins);
    }

    #[tokio::test]
    async fn test_delete_by_key() {
        let store = memory_store().await;
        let record = record("1HGCM82633A123456", None);
        store.insert(&record).await.unwrap();

        assert!(store.delete_by_key(record.vin_number()).await.unwrap());
        assert!(!store.delete_by_key(record.vin_number()).await.unwrap());
        assert!(store.find_by_key(record.vin_number()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_and_ping() {
        let store = memory_store().await;
        store.insert(&record("1HGCM82633A123456", None)).await.unwrap();
        store.insert(&record("5YJSA1E14HF000001", None)).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.list_all().await.unwrap().is_empty());
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_row_is_surfaced() {
        let store = memory_store().await;
        sqlx::query(
            "INSERT INTO vin_records (vin_number, make, model, model_year, body_class) \
             VALUES ('1HGCM82633A123456', '', 'Accord', '2003', 'Sedan')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let vin = VinNumber::normalize("1HGCM82633A123456").unwrap();
        let err = store.find_by_key(&vin).await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { .. }));
    }
}
