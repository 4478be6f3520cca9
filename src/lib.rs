//! Discount resolution and best-deal pricing for cannabis retail.
//!
//! [`pricing::PricingOrchestrator`] is the entry point: it evaluates every
//! configured discount mechanism against a product line, applies at most one
//! discount, explains the decision and records it in an audit trail.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pricing;
pub mod validation;
