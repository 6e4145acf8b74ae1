// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Managed DNS directory integration.
//!
//! - [`client`] - typed HTTP client for the directory service
//! - [`rate_limit`] - server-driven throttling state shared by all requests
//! - [`records`] - translation of ingress load-balancer state into record requests
//! - [`state`] - persisted domain/token secret helpers
//! - [`types`] - wire types

pub mod client;
pub mod rate_limit;
pub mod records;
pub mod state;
pub mod types;

pub use client::{DirectoryApi, DirectoryClient};
pub use rate_limit::{RateLimiter, RequestClass};
pub use records::to_record_requests_and_hash;
pub use state::DomainState;
pub use types::{RecordRequest, RecordType, RenewRequest, RenewResponse};
