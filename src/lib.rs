//! Floodgate - Fixed-Window Admission Control
//!
//! This crate decides whether to admit or reject an action on behalf of a
//! caller. Throttle rules are keyed by (scope, action) with per-scope
//! wildcards, counter state lives in a pluggable store (in-process or
//! Redis-backed), and rejected callers are told how long to wait. The
//! request pipeline, rule sources, and response writing belong to the
//! embedding application.

pub mod config;
pub mod error;
pub mod identity;
pub mod store;
pub mod throttle;
