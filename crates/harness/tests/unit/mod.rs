//! # Unit Components
//!
//! This module serves as the central hub for the harness unit tests. It
//! organizes tests by the component under test, from passive parsing up to
//! live subprocess orchestration.


/// Unit tests for configuration defaults and deserialization.
pub mod config;




/// Unit tests for testlist loading and descriptor defaults.
pub mod testlist;
