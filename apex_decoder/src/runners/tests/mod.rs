//! Test suite for the run orchestrator.
//!
//! - `orchestrator_tests`: full runs with real threads, mock environments
//!   and mock policies. Covers budgets, supervision and fatal conditions.

mod orchestrator_tests;
