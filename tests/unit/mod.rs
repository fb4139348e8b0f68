//! Unit tests for individual components

mod config_test;
mod error_test;
mod ledger_test;
mod queue_test;
mod rate_limit_test;
mod retention_test;
mod util_test;
