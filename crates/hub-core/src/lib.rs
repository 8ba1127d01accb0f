//! # Hub Core
//!
//! Core library for a decentralized node-coordination hub: it fans reads
//! out to registered data nodes, votes on what they return, keeps a
//! reliability score per node, and refreshes node status once per epoch.
//!
//! - **[`router`]**: concurrent fan-out where the first valid response wins,
//!   with every response collected for later verification.
//!
//! - **[`distributor`]**: request validation and node selection from the
//!   qualified pools and the worker capability snapshot.
//!
//! - **[`enforcer`]**: response voting, partial cross-checks, reliability
//!   scoring and per-epoch status maintenance.
//!
//! - **[`index`]**: score-ordered qualified-node pools mirrored into the
//!   backing store.
//!
//! - **[`store`]**, **[`repository`]**, **[`settlement`]**: seams to the
//!   key-value store, the node database and the chain settlement service.
//!
//! - **[`metrics`]**: Prometheus metrics collection.
//!
//! ## Request Flow
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────┐
//! │ Distributor │ ─── Invalid query ──► Error Response
//! └──────┬──────┘
//!        │ selected nodes
//!        ▼
//! ┌─────────────┐
//! │   Router    │ ── first valid response ──► Client
//! └──────┬──────┘
//!        │ all responses (background)
//!        ▼
//! ┌─────────────┐
//! │  Enforcer   │ ── votes ──► stats, score, qualified index
//! └─────────────┘
//! ```

pub mod config;
pub mod distributor;
pub mod enforcer;
pub mod fetch;
pub mod index;
pub mod metrics;
pub mod payload;
pub mod repository;
pub mod router;
pub mod runtime;
pub mod settlement;
pub mod store;
pub mod types;
pub mod utils;
