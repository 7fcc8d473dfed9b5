// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Catalog entity records.
//!
//! Entities reference each other by id only; navigation always goes back
//! through the repository. The open-ended `options`/`attributes` documents
//! are kept as JSON maps so keys added over time (`adopted`, `default`,
//! `group_replication_group_name`, ...) survive round trips.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An open-ended key/value document, stored as a JSON column.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// A named cluster, the root of the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cluster {
    /// Generated on insert; 0 until then.
    pub id: u64,
    pub name: String,
    pub description: String,
    pub options: Document,
    pub attributes: Document,
    /// The replica set new instances join by default, if one is set. Must
    /// reference a replica set owned by this cluster.
    pub default_replicaset: Option<u64>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Default::default()
        }
    }
}

/// The replication topology a replica set runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologyType {
    SinglePrimary,
    MultiPrimary,
}

impl TopologyType {
    /// The tag persisted in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            TopologyType::SinglePrimary => "pm",
            TopologyType::MultiPrimary => "mm",
        }
    }
}

impl fmt::Display for TopologyType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopologyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pm" => Ok(TopologyType::SinglePrimary),
            "mm" => Ok(TopologyType::MultiPrimary),
            other => Err(format!("unknown topology type tag: {}", other)),
        }
    }
}

/// A group of instances replicating as one unit. Always owned by exactly one
/// cluster; the only replication kind currently recorded is `"gr"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaSet {
    /// Generated on insert; 0 until then.
    pub id: u64,
    pub cluster_id: u64,
    pub name: String,
    pub topology_type: TopologyType,
    pub active: bool,
    pub attributes: Document,
}

impl ReplicaSet {
    pub fn new(cluster_id: u64, topology_type: TopologyType) -> Self {
        Self {
            id: 0,
            cluster_id,
            name: "default".into(),
            topology_type,
            active: true,
            attributes: Document::new(),
        }
    }
}

/// Identity of a machine that instances run on. Hosts are deduplicated on
/// (host name) or (non-empty IP address) at insert time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostInfo {
    pub host_name: String,
    pub ip_address: String,
    pub location: String,
}

/// A server instance to be registered on a replica set.
///
/// The three endpoint forms end up in the instance's `addresses` document
/// under `mysqlClassic`, `mysqlX` and `grLocal`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Instance {
    /// The engine-assigned, globally unique server UUID.
    pub server_uuid: String,
    pub label: String,
    pub role: String,
    /// Classic protocol endpoint, `host:port`.
    pub endpoint: String,
    /// X protocol endpoint.
    pub xendpoint: String,
    /// Group-communication endpoint.
    pub grendpoint: String,
    pub attributes: Document,
}

/// A membership row read back out of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub server_uuid: String,
    pub label: String,
    pub role: String,
    /// Classic protocol endpoint, extracted from the addresses document.
    pub classic_address: String,
}
