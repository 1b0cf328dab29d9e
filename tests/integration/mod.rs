//! Integration tests for Sales Atlas.

pub mod pipeline_test;
pub mod postgres_test;
pub mod render_test;
pub mod snowflake_test;
