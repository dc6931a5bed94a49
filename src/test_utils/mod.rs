//! Test utilities.
//!
//! This module provides:
//! - Test data factories for creating valid fixtures
//! - In-memory repository implementations for mocking persistence
//! - A recording event sink and a scriptable payment gateway
//! - `TestBillingBuilder` for wiring the use cases over those mocks

mod app_state_builder;
mod billing_mocks;
mod factories;
mod gateway_mocks;

pub use app_state_builder::*;
pub use billing_mocks::*;
pub use factories::*;
pub use gateway_mocks::*;
