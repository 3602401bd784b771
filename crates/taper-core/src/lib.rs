//! Core types and utilities for the taper session layer.
//!
//! This crate provides the foundational types shared by every other crate:
//!
//! - **Identifiers**: Strongly-typed IDs for users, devices, and tokens
//! - **Clock**: An injectable UTC time source so expiry logic is testable
//!
//! # Example
//!
//! ```
//! use taper_core::{Clock, DeviceId, SystemClock, UserId};
//!
//! let user_id: UserId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
//! let device_id = DeviceId::generate();
//! let now = SystemClock.now();
//! # let _ = (user_id, device_id, now);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod ids;

pub use clock::{Clock, SystemClock};
pub use ids::{DeviceId, IdError, TokenId, UserId};

#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
