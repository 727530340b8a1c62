//! VIN Lookup Service
//!
//! Resolves Vehicle Identification Numbers into vehicle descriptions. A lookup
//! is answered from the local record store when possible; otherwise the VIN is
//! decoded by the NHTSA vPIC API, enriched with a representative photo from
//! CarImagery, persisted, and returned.
//!
//! ## Features
//!
//! - **Cache-first resolution**: the first successful lookup of a VIN is the
//!   last one that touches the network
//! - **Graceful degradation**: a failing photo provider yields a record without
//!   a photo, never a failed lookup
//! - **Race-safe persistence**: concurrent first-time lookups of one VIN store
//!   exactly one record
//! - **Cache management API**: list, remove and CSV export over HTTP
//!
//! ## Architecture
//!
//! ```text
//!  HTTP clients
//!       │
//!       ▼
//! ┌──────────────┐        ┌──────────────┐
//! │ Lookup API   │───────▶│ Export       │
//! │ (axum)       │        │ (csv)        │
//! └──────────────┘        └──────────────┘
//!       │
//!       ▼
//! ┌──────────────┐        ┌──────────────┐        ┌──────────────┐
//! │ Lookup       │───────▶│ Decode       │───────▶│ NHTSA vPIC   │
//! │ Orchestrator │        │ Provider     │        └──────────────┘
//! └──────────────┘        └──────────────┘
//!       │   │             ┌──────────────┐        ┌──────────────┐
//!       │   └────────────▶│ Photo        │───────▶│ CarImagery   │
//!       │                 │ Provider     │        └──────────────┘
//!       ▼                 └──────────────┘
//! ┌──────────────┐
//! │ Record Store │
//! │ (SQLite)     │
//! └──────────────┘
//! ```

pub mod api;
pub mod config;
pub mod export;
pub mod lookup;
pub mod providers;
pub mod record_store;
pub mod vin;

pub use api::{create_router, start_api_server, AppState};
pub use config::Config;
pub use export::{export_records, ExportError, ExportFormat};
pub use lookup::{LookupError, LookupOrchestrator, Resolution};
pub use providers::{CarImageryClient, DecodeProvider, PhotoProvider, VpicClient};
pub use record_store::{RecordStore, SqliteRecordStore, StoreError};
pub use vin::{DecodedAttributes, InvalidVinFormat, VinNumber, VinRecord};
