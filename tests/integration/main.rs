//! Integration test modules.

mod connection_test;
mod device_churn_test;
mod support;
mod session_test;
