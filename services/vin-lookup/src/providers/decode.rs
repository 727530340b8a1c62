//! VIN decode provider backed by the NHTSA vPIC `DecodeVinValues` endpoint.

use super::{ClientBuildError, HttpTransport, Provider, ProviderFailure};
use crate::config::ProviderConfig;
use crate::vin::{DecodedAttributes, VinNumber};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

/// Outcome of a failed decode
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The provider answered, but has nothing usable for this VIN
    #[error("VIN {vin} not found: {reason}")]
    NotFound { vin: VinNumber, reason: String },

    #[error(transparent)]
    Provider(#[from] ProviderFailure),
}

/// Translates a VIN into make/model/year/body class
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecodeProvider: Send + Sync {
    async fn decode(&self, vin: &VinNumber) -> Result<DecodedAttributes, DecodeError>;
}

/// Top-level vPIC response
#[derive(Debug, Deserialize)]
struct VpicResponse {
    #[serde(rename = "Results")]
    results: Vec<VpicResult>,
}

/// The subset of a vPIC result row we consume. vPIC reports unknown values
/// as empty strings or nulls.
#[derive(Debug, Deserialize)]
struct VpicResult {
    #[serde(rename = "Make", default)]
    make: Option<String>,
    #[serde(rename = "Model", default)]
    model: Option<String>,
    #[serde(rename = "ModelYear", default)]
    model_year: Option<String>,
    #[serde(rename = "BodyClass", default)]
    body_class: Option<String>,
}

/// vPIC HTTP client
pub struct VpicClient {
    transport: HttpTransport,
}

impl VpicClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ClientBuildError> {
        Ok(Self {
            transport: HttpTransport::new(Provider::Decode, config)?,
        })
    }
}

#[async_trait]
impl DecodeProvider for VpicClient {
    #[instrument(skip(self), fields(vin = %vin))]
    async fn decode(&self, vin: &VinNumber) -> Result<DecodedAttributes, DecodeError> {
        let mut url = self
            .transport
            .endpoint(&format!("api/vehicles/DecodeVinValues/{vin}"))?;
        url.query_pairs_mut().append_pair("format", "json");

        let response = self.transport.get(url).await?;
        let body = response.text().await.map_err(ProviderFailure::Transport)?;

        let payload: VpicResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderFailure::Payload(format!("invalid vPIC JSON: {e}")))?;

        let first = payload.results.into_iter().next().ok_or_else(|| DecodeError::NotFound {
            vin: vin.clone(),
            reason: "empty result set".to_string(),
        })?;

        let attributes = DecodedAttributes::new(
            first.make.as_deref().unwrap_or_default(),
            first.model.as_deref().unwrap_or_default(),
            first.model_year.as_deref().unwrap_or_default(),
            first.body_class.as_deref().unwrap_or_default(),
        )
        .map_err(|e| DecodeError::NotFound {
            vin: vin.clone(),
            reason: e.to_string(),
        })?;

        debug!(
            make = attributes.make(),
            model = attributes.model(),
            model_year = attributes.model_year(),
            "VIN decoded"
        );

        Ok(attributes)
    }
}
