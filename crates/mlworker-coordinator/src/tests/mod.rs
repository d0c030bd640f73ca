//! Test suites for the coordinator.

mod support;
