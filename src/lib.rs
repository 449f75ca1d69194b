//! # Docsilo
//!
//! A document ingestion pipeline for building searchable archives out of
//! mixed uploads: emails, office documents, scans, and plain text.
//!
//! Each inbound file is fingerprinted and deduplicated, moved into
//! content-addressed storage, and then routed down one of two branches:
//! text-native formats are extracted, chunked, scanned for dates and
//! sensitive data, and committed ready for embedding; everything else is
//! converted to PDF and handed to the OCR splitting stage via a durable
//! job queue.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌───────────────┐   ┌──────────────────┐
//! │ Inbound │──▶│  Fingerprint  │──▶│ Content-addressed │
//! │  files  │   │    + dedup    │   │     storage       │
//! └─────────┘   └───────────────┘   └────────┬─────────┘
//!                                            │
//!                         ┌──────────────────┴─────────────┐
//!                         ▼                                ▼
//!                  ┌─────────────┐                 ┌──────────────┐
//!                  │ Text branch │                 │ PDF convert  │
//!                  │ chunk+detect│                 │   branch     │
//!                  └──────┬──────┘                 └──────┬───────┘
//!                         ▼                               ▼
//!                  ┌─────────────┐                 ┌──────────────┐
//!                  │ embed queue │                 │ split queue  │
//!                  └─────────────┘                 └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and metadata mapping |
//! | [`fingerprint`] | Content fingerprinting (SHA-256) |
//! | [`storage`] | Content-addressed placement, holding areas, quarantine |
//! | [`extract`] | Text-native classification and extraction |
//! | [`convert`] | PDF conversion for the OCR branch |
//! | [`chunker`] | Overlapping text chunking |
//! | [`detect`] | Timeline and sensitive-data detectors |
//! | [`store`] | SQLite persistence and atomic commits |
//! | [`queue`] | Durable per-stage job queues |
//! | [`ingest`] | The pipeline itself |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunker;
pub mod config;
pub mod convert;
pub mod db;
pub mod detect;
pub mod extract;
pub mod fingerprint;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod queue;
pub mod storage;
pub mod store;
