// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tenant Gate - Multi-Tenant Gateway Authorization Hand-Off
//!
//! The front-door process validates an opaque external key, resolves the
//! caller's tenant/application/package access rights, runs the request
//! through an ordered chain of security checks, and hands a sealed trust
//! context to the downstream service via a single transport header. The
//! downstream service reconstructs and trusts that context without
//! repeating the lookups.
//!
//! ## Modules
//!
//! - `gateway` - gateway-side trust context builder (middleware)
//! - `consumer` - service-side context consumer (middleware + extractors)
//! - `context` - the trust context envelope and its transport codec
//! - `pipeline` - ordered, short-circuiting security check chain
//! - `provision` - external key/package resolution and config merge
//! - `registry` - service registry snapshot and flag resolution
//! - `api` - router assembly and health endpoint (Axum)

pub mod api;
pub mod config;
pub mod consumer;
pub mod context;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod provision;
pub mod registry;
pub mod state;
