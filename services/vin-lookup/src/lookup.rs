//! Cache-first VIN resolution.
//!
//! A lookup walks a fixed sequence of states:
//!
//! ```text
//! Validate ──▶ CacheProbe ──hit──▶ Return(cached = true)
//!                  │
//!                 miss
//!                  ▼
//!               Decode ──NotFound──▶ VinNotFound
//!                  │   ──Provider──▶ UpstreamUnavailable(decode)
//!                  ▼
//!             EnrichPhoto ──any failure──▶ continue without photo
//!                  ▼
//!               Persist ──DuplicateKey──▶ re-read winner
//!                  ▼
//!             Return(cached = false)
//! ```
//!
//! Decode failures are fatal, photo failures only degrade the record. Races
//! between concurrent first-time lookups of the same VIN are settled by the
//! store's uniqueness constraint; there is no application-level lock.

use crate::providers::{DecodeError, DecodeProvider, PhotoError, PhotoProvider, Provider};
use crate::record_store::{RecordStore, StoreError};
use crate::vin::{InvalidVinFormat, VinNumber, VinRecord};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Why a lookup did not produce a record
#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    InvalidFormat(#[from] InvalidVinFormat),

    #[error("VIN {0} not found")]
    VinNotFound(VinNumber),

    #[error("{provider} provider unavailable: {message}")]
    UpstreamUnavailable { provider: Provider, message: String },

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<StoreError> for LookupError {
    fn from(err: StoreError) -> Self {
        LookupError::Unexpected(err.to_string())
    }
}

/// A successfully resolved VIN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub record: VinRecord,
    /// True when served from the record store without provider calls
    pub cached: bool,
}

/// Composes the record store and both providers. Stateless between calls.
pub struct LookupOrchestrator {
    store: Arc<dyn RecordStore>,
    decoder: Arc<dyn DecodeProvider>,
    photos: Arc<dyn PhotoProvider>,
}

impl LookupOrchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        decoder: Arc<dyn DecodeProvider>,
        photos: Arc<dyn PhotoProvider>,
    ) -> Self {
        Self {
            store,
            decoder,
            photos,
        }
    }

    /// Resolve a raw VIN, consulting the store before any provider
    #[instrument(skip(self))]
    pub async fn resolve(&self, raw_vin: &str) -> Result<Resolution, LookupError> {
        let vin = VinNumber::normalize(raw_vin)?;

        if let Some(record) = self.store.find_by_key(&vin).await? {
            debug!(vin = %vin, "Cache hit");
            metrics::counter!("vin_lookup.cache.hits").increment(1);
            return Ok(Resolution {
                record,
                cached: true,
            });
        }

        metrics::counter!("vin_lookup.cache.misses").increment(1);

        let attributes = self.decoder.decode(&vin).await.map_err(|e| match e {
            DecodeError::NotFound { vin, reason } => {
                info!(vin = %vin, reason = %reason, "VIN not found upstream");
                LookupError::VinNotFound(vin)
            }
            DecodeError::Provider(failure) => {
                warn!(vin = %vin, error = %failure, "Decode provider failed");
                metrics::counter!("vin_lookup.provider.errors", "provider" => Provider::Decode.as_str())
                    .increment(1);
                LookupError::UpstreamUnavailable {
                    provider: Provider::Decode,
                    message: failure.to_string(),
                }
            }
        })?;

        let photo_url = self
            .enrich_photo(
                &vin,
                attributes.make(),
                attributes.model(),
                attributes.model_year(),
            )
            .await;

        let record = VinRecord::new(vin, attributes, photo_url);
        self.persist(record).await
    }

    /// Best-effort photo lookup; every failure degrades to "no photo"
    async fn enrich_photo(
        &self,
        vin: &VinNumber,
        make: &str,
        model: &str,
        model_year: &str,
    ) -> Option<Url> {
        match self.photos.find_photo(make, model, model_year).await {
            Ok(Some(url)) => Some(url),
            Ok(None) => {
                debug!(vin = %vin, "No photo available");
                metrics::counter!("vin_lookup.photo.missing").increment(1);
                None
            }
            Err(PhotoError::InvalidArgument(reason)) => {
                warn!(vin = %vin, reason = %reason, "Photo lookup skipped");
                metrics::counter!("vin_lookup.photo.missing").increment(1);
                None
            }
            Err(PhotoError::Provider(failure)) => {
                warn!(vin = %vin, error = %failure, "Photo provider failed, storing record without photo");
                metrics::counter!("vin_lookup.provider.errors", "provider" => Provider::Photo.as_str())
                    .increment(1);
                metrics::counter!("vin_lookup.photo.missing").increment(1);
                None
            }
        }
    }

    async fn persist(&self, record: VinRecord) -> Result<Resolution, LookupError> {
        match self.store.insert(&record).await {
            Ok(()) => {
                info!(
                    vin = %record.vin_number(),
                    has_photo = record.photo_url().is_some(),
                    "VIN record persisted"
                );
                metrics::counter!("vin_lookup.records.persisted").increment(1);
                Ok(Resolution {
                    record,
                    cached: false,
                })
            }
            Err(StoreError::DuplicateKey(vin)) => {
                // Lost the race to a concurrent lookup; return the winner's record
                debug!(vin = %vin, "Insert conflict, re-reading stored record");
                metrics::counter!("vin_lookup.insert.conflicts").increment(1);

                let stored = self.store.find_by_key(&vin).await?.ok_or_else(|| {
                    LookupError::Unexpected(format!(
                        "record for VIN {vin} vanished after an insert conflict"
                    ))
                })?;

                Ok(Resolution {
                    record: stored,
                    cached: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Validate and delete; true iff a record existed
    #[instrument(skip(self))]
    pub async fn remove(&self, raw_vin: &str) -> Result<(VinNumber, bool), LookupError> {
        let vin = VinNumber::normalize(raw_vin)?;
        let removed = self.store.delete_by_key(&vin).await?;

        info!(vin = %vin, removed = removed, "VIN removal requested");

        Ok((vin, removed))
    }

    /// Every cached record
    pub async fn list(&self) -> Result<Vec<VinRecord>, LookupError> {
        Ok(self.store.list_all().await?)
    }
}
