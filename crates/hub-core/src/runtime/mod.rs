//! Hub runtime initialization and lifecycle management.
//!
//! Wires the fetcher, qualified-node index, router, enforcer and distributor
//! together, optionally starts the epoch listener, and coordinates graceful
//! shutdown of background tasks.
//!
//! # Example
//!
//! ```no_run
//! use hub_core::{config::AppConfig, runtime::HubRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!
//!     let runtime = HubRuntime::builder()
//!         .with_config(config)
//!         .enable_epoch_listener()
//!         .build()
//!         .await?;
//!
//!     let distributor = runtime.distributor();
//!     // ... serve routes ...
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod components;
pub mod lifecycle;

pub use builder::{HubRuntimeBuilder, RuntimeError};
pub use components::HubComponents;
pub use lifecycle::HubRuntime;
