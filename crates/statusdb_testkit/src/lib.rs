//! # StatusDB Testkit
//!
//! Test utilities for StatusDB.
//!
//! This crate provides:
//! - Engine fixtures with time windows tuned for tests
//! - Entity builders for common correlation scenarios
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use statusdb_testkit::prelude::*;
//!
//! #[test]
//! fn event_reaches_the_item() {
//!     let engine = TestEngine::new();
//!     engine.add_or_update_item(host_item("web-01")).unwrap();
//!     engine
//!         .add_or_update_event(host_event("e1", "web-01", BaseStatus::Major))
//!         .unwrap();
//!     engine.settle();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
