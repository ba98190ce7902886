//! API handlers for the receipts dashboard auth service.
//!
//! This module organizes the service's route handlers: login code issue and
//! verification under `/v1/auth`, the authenticated profile endpoint under
//! `/v1/me`, and the health/root probes.

pub mod auth;
pub mod health;
pub mod me;
pub mod root;
