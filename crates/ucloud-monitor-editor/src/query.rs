//! The query record edited by the query editor and executed by the backend.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};

use crate::variables::{substitute, VariableTable};

/// A UCloud resource type understood by the `generic_api` resource endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// Cloud hosts.
    UHost,
    /// Elastic IPs.
    Eip,
    /// Load balancers.
    Ulb,
    /// Cloud databases.
    Udb,
    /// Distributed memory spaces.
    UMem,
    /// Dedicated private network links.
    Udpn,
    /// Physical hosts.
    PHost,
    /// Shared bandwidth packages.
    ShareBandwidth,
    /// Memcache groups.
    UMemCache,
    /// Redis groups.
    URedis,
    /// NAT gateways.
    NatGw,
    /// Object storage buckets.
    UFile,
    /// Load balancer virtual servers.
    UlbVServer,
    /// Data disks.
    UDisk,
    /// SSD cloud disks.
    UDiskSsd,
    /// RSSD cloud disks.
    UDiskRssd,
    /// System (boot) disks.
    UDiskSys,
}

impl ResourceType {
    /// Every resource type, in the order they are offered to users.
    pub const ALL: [ResourceType; 17] = [
        Self::UHost,
        Self::Eip,
        Self::Ulb,
        Self::Udb,
        Self::UMem,
        Self::Udpn,
        Self::PHost,
        Self::ShareBandwidth,
        Self::UMemCache,
        Self::URedis,
        Self::NatGw,
        Self::UFile,
        Self::UlbVServer,
        Self::UDisk,
        Self::UDiskSsd,
        Self::UDiskRssd,
        Self::UDiskSys,
    ];

    /// The wire name of this resource type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UHost => "uhost",
            Self::Eip => "eip",
            Self::Ulb => "ulb",
            Self::Udb => "udb",
            Self::UMem => "umem",
            Self::Udpn => "udpn",
            Self::PHost => "phost",
            Self::ShareBandwidth => "sharebandwidth",
            Self::UMemCache => "umemcache",
            Self::URedis => "uredis",
            Self::NatGw => "natgw",
            Self::UFile => "ufile",
            Self::UlbVServer => "ulb-vserver",
            Self::UDisk => "udisk",
            Self::UDiskSsd => "udisk_ssd",
            Self::UDiskRssd => "udisk_rssd",
            Self::UDiskSys => "udisk_sys",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error returned when parsing an unknown resource type.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource type {0}")]
pub struct UnknownResourceType(pub String);

impl FromStr for ResourceType {
    type Err = UnknownResourceType;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownResourceType(s.to_string()))
    }
}

/// A UCloud monitoring query.
///
/// All fields are plain strings so that users can type custom values and
/// template variables into any of them. `ulb_id` and `class_type` are only
/// meaningful for the `ulb-vserver` and `udb` resource types respectively.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Query {
    /// The UCloud project; falls back to the datasource's project when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// The region, e.g. `cn-bj2`.
    pub region: String,
    /// The resource type, e.g. `uhost`.
    pub resource_type: String,
    /// The metric to query.
    pub metric_name: String,
    /// The resource whose metric is queried.
    pub resource_id: String,
    /// Only list resources with this business tag.
    pub tag: String,
    /// Page size for resource id lookups.
    #[serde(deserialize_with = "string_or_number")]
    pub limit: String,
    /// Page offset for resource id lookups.
    #[serde(deserialize_with = "string_or_number")]
    pub offset: String,
    /// The load balancer owning the virtual servers (`ulb-vserver` only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ulb_id: Option<String>,
    /// The database class type (`udb` only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_type: Option<String>,
}

impl Query {
    /// The parsed resource type, if it is one the backend knows about.
    pub fn known_resource_type(&self) -> Option<ResourceType> {
        self.resource_type.parse().ok()
    }

    /// Return a copy of this query with template variables resolved in every field.
    ///
    /// This is the value handed to the host for execution.
    pub fn apply_template_variables(&self, table: &VariableTable) -> Self {
        let sub = |s: &String| substitute(s, table);
        Self {
            project_id: self.project_id.as_ref().map(sub),
            region: sub(&self.region),
            resource_type: sub(&self.resource_type),
            metric_name: sub(&self.metric_name),
            resource_id: sub(&self.resource_id),
            tag: sub(&self.tag),
            limit: sub(&self.limit),
            offset: sub(&self.offset),
            ulb_id: self.ulb_id.as_ref().map(sub),
            class_type: self.class_type.as_ref().map(sub),
        }
    }
}

// Saved queries from older editor revisions store `limit`/`offset` as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(serde_json::Number),
        Null(()),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
        Raw::Null(()) => String::new(),
    })
}
