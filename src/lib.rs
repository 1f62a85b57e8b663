//! Paysim - Payment Platform Simulator Kernel
//!
//! This crate implements the simulation kernel for a Stripe-shaped billing
//! API: a pluggable clock, a namespaced concurrent store, request
//! deduplication, configurable fault injection, a subscription-billing
//! engine, and signed webhook delivery with bounded retries.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod observability;
pub mod ports;
