//! Sales Atlas - geospatial sales dashboard for Tasty Bytes.
//!
//! This library exposes the core modules for use in integration tests.

pub mod analysis;
pub mod canvas;
pub mod config;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod pipeline;
pub mod render;
pub mod safety;
pub mod secrets;
pub mod table;
pub mod warehouse;
