// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Wire types for the DNS directory HTTP API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Record types the directory accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "CNAME")]
    Cname,
    #[serde(rename = "TXT")]
    Txt,
}

impl RecordType {
    /// Wire name of the record type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Txt => "TXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record to create under the reserved domain. `name` is relative to the domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub values: Vec<String>,
}

/// Body of `POST /domains/{domain}/renew`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewRequest {
    pub records: Vec<RecordRequest>,
    pub version: String,
}

/// A record the directory reports as missing or stale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutOfSyncRecord {
    pub fqdn: String,
    #[serde(rename = "type")]
    pub record_type: String,
}

/// Response of `POST /domains/{domain}/renew`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewResponse {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "outOfSyncRecords")]
    pub out_of_sync_records: Vec<OutOfSyncRecord>,
}

/// Response of `POST /domains`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainResponse {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub token: String,
}

/// Error body returned alongside HTTP 401.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthErrorResponse {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: AuthErrorData,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthErrorData {
    #[serde(default, rename = "noDomain")]
    pub no_domain: bool,
}
