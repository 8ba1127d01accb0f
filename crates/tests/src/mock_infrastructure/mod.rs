//! Mock infrastructure for hub integration tests.
//!
//! ## Components
//!
//! - `NodeMockBuilder`: wraps mockito to play a data node (`/workers_status`,
//!   `/decentralized/...`, `/rss/...`)
//! - Test helpers for fixtures and hub wiring
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{activity_body, NodeMockBuilder};
//!
//! let mut node = NodeMockBuilder::new().await;
//! node.mock_activity("0xabc", &activity_body("0xabc", "ethereum"));
//!
//! // Use node.url() as the node endpoint
//! ```

pub mod node_mock;
pub mod test_helpers;

pub use node_mock::NodeMockBuilder;
pub use test_helpers::*;
