/*! The lookups served by the `generic_api` resource.

Each lookup maps a flat parameter map to a list of strings for the query
editor's selectors. `GetResourceId` is routed further by `ResourceType`
through [`ResourceKind`], a table describing how each kind of UCloud resource
is listed.
*/
use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use ucloud_monitor_editor::{params::keys, Action, ResourceType};

use crate::client::{ApiRequest, UCloudApi, UCloudError};

/// Parameters of a lookup request.
pub type LookupParams = BTreeMap<String, String>;

const DEFAULT_LIMIT: i64 = 20;
const DEFAULT_OFFSET: i64 = 0;

/// Errors performing a lookup.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LookupError {
    /// A required parameter was not given.
    #[error("missing parameter {0}")]
    MissingParameter(&'static str),
    /// `Action` was not a known lookup.
    #[error("got invalid Action {0}")]
    UnknownAction(String),
    /// `ResourceType` was not a known resource kind.
    #[error("got invalid ResourceType {0}")]
    UnknownResourceType(String),
    /// A paging parameter was not an integer.
    #[error("{key} must be an integer, got {value:?}")]
    InvalidInteger {
        /// The parameter name.
        key: &'static str,
        /// The value given.
        value: String,
    },
    /// The UCloud API call failed.
    #[error(transparent)]
    UCloud(#[from] UCloudError),
}

/// How a resource listing handles the `Tag` parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagHandling {
    /// Sent to the API, which filters.
    Param,
    /// Matched against each item's `Tag` after listing.
    Filter,
    /// Not supported for this kind.
    Ignored,
}

/// How a resource listing handles `Limit` and `Offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Paging {
    /// Always sent; `20` and `0` when not given.
    Defaulted,
    /// Only sent when given.
    WhenGiven,
}

/// How one kind of resource is listed.
#[derive(Clone, Copy, Debug)]
pub struct ResourceKind {
    /// The UCloud action listing the resources.
    pub action: &'static str,
    /// The response array holding them.
    pub collection: &'static str,
    /// The id field of each item.
    pub id_key: &'static str,
    /// Tag handling.
    pub tag: TagHandling,
    /// Paging.
    pub paging: Paging,
    /// Whether `Region` is sent.
    pub regional: bool,
    /// Request parameter forwarded unchanged from the lookup, if any.
    pub forwarded: Option<&'static str>,
    /// Parameters always sent.
    pub fixed: &'static [(&'static str, &'static str)],
    /// Keep only boot disks.
    pub boot_only: bool,
    /// Use the long request timeout.
    pub long_running: bool,
}

impl ResourceKind {
    const fn new(action: &'static str, collection: &'static str, id_key: &'static str) -> Self {
        Self {
            action,
            collection,
            id_key,
            tag: TagHandling::Filter,
            paging: Paging::Defaulted,
            regional: true,
            forwarded: None,
            fixed: &[],
            boot_only: false,
            long_running: false,
        }
    }

    /// The listing for `resource_type`.
    pub fn of(resource_type: ResourceType) -> Self {
        use ResourceType::*;
        let data_set = |action, id_key| Self::new(action, "DataSet", id_key);
        let udisk = data_set("DescribeUDisk", "UDiskId");
        match resource_type {
            UHost => Self {
                tag: TagHandling::Param,
                long_running: true,
                ..Self::new("DescribeUHostInstance", "UHostSet", "UHostId")
            },
            Eip => Self::new("DescribeEIP", "EIPSet", "EIPId"),
            Ulb => data_set("DescribeULBSimple", "ULBId"),
            Udb => Self {
                forwarded: Some(keys::CLASS_TYPE),
                long_running: true,
                ..data_set("DescribeUDBInstance", "DBId")
            },
            UMem => data_set("DescribeUMemSpace", "SpaceId"),
            Udpn => Self {
                tag: TagHandling::Ignored,
                ..data_set("DescribeUDPN", "UDPNId")
            },
            PHost => Self::new("DescribePHost", "PHostSet", "PHostId"),
            ShareBandwidth => Self {
                tag: TagHandling::Ignored,
                paging: Paging::WhenGiven,
                ..data_set("DescribeShareBandwidth", "ShareBandwidthId")
            },
            UMemCache => data_set("DescribeUMemcacheGroup", "GroupId"),
            URedis => data_set("DescribeURedisGroup", "GroupId"),
            NatGw => data_set("DescribeNATGW", "NATGWId"),
            UFile => Self {
                regional: false,
                ..data_set("DescribeBucket", "BucketId")
            },
            UlbVServer => Self {
                tag: TagHandling::Ignored,
                forwarded: Some(keys::ULB_ID),
                ..data_set("DescribeVServer", "VServerId")
            },
            UDisk => Self {
                fixed: &[("DiskType", "DataDisk")],
                ..udisk
            },
            UDiskSsd => Self {
                fixed: &[
                    ("ProtocolVersion", "1"),
                    ("IsBoot", "False"),
                    ("DiskType", "CLOUD_SSD"),
                ],
                ..udisk
            },
            UDiskRssd => Self {
                fixed: &[
                    ("ProtocolVersion", "1"),
                    ("IsBoot", "False"),
                    ("DiskType", "CLOUD_RSSD"),
                ],
                ..udisk
            },
            UDiskSys => Self {
                boot_only: true,
                ..udisk
            },
        }
    }

    fn request(&self, params: &LookupParams) -> Result<ApiRequest, LookupError> {
        let get = |key: &str| params.get(key).map(String::as_str);
        let mut request = ApiRequest::new(self.action).opt_param(keys::PROJECT_ID, get(keys::PROJECT_ID));
        if self.regional {
            request = request.opt_param(keys::REGION, get(keys::REGION));
        }
        if self.tag == TagHandling::Param {
            request = request.opt_param(keys::TAG, get(keys::TAG));
        }
        if let Some(key) = self.forwarded {
            request = request.opt_param(key, get(key));
        }
        let limit = parse_int(params, keys::LIMIT)?;
        let offset = parse_int(params, keys::OFFSET)?;
        request = match self.paging {
            Paging::Defaulted => request
                .param(keys::LIMIT, limit.unwrap_or(DEFAULT_LIMIT))
                .param(keys::OFFSET, offset.unwrap_or(DEFAULT_OFFSET)),
            Paging::WhenGiven => request
                .opt_param(keys::LIMIT, limit)
                .opt_param(keys::OFFSET, offset),
        };
        for (key, value) in self.fixed {
            request = request.param(key, value);
        }
        if self.long_running {
            request = request.long_running();
        }
        Ok(request)
    }

    fn ids(&self, response: &Value, tag: Option<&str>) -> Vec<String> {
        items(response, self.collection)
            .filter(|item| match (self.tag, tag) {
                (TagHandling::Filter, Some(tag)) => {
                    item.get("Tag").and_then(Value::as_str) == Some(tag)
                }
                _ => true,
            })
            .filter(|item| {
                !self.boot_only || item.get("IsBoot").and_then(Value::as_str) == Some("True")
            })
            .filter_map(|item| string_field(item, self.id_key))
            .collect()
    }
}

fn parse_int(params: &LookupParams, key: &'static str) -> Result<Option<i64>, LookupError> {
    params
        .get(key)
        .map(|v| {
            v.trim().parse().map_err(|_| LookupError::InvalidInteger {
                key,
                value: v.clone(),
            })
        })
        .transpose()
}

fn items<'a>(response: &'a Value, collection: &str) -> impl Iterator<Item = &'a Value> {
    response
        .get(collection)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn string_field(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Perform the lookup described by `params`.
pub async fn lookup<A>(api: &A, params: &LookupParams) -> Result<Vec<String>, LookupError>
where
    A: UCloudApi + ?Sized,
{
    let action = params
        .get(keys::ACTION)
        .ok_or(LookupError::MissingParameter(keys::ACTION))?;
    let action: Action = action
        .parse()
        .map_err(|_| LookupError::UnknownAction(action.clone()))?;
    let values = match action {
        Action::GetProjectId => {
            let response = api.invoke(ApiRequest::new("GetProjectList")).await?;
            items(&response, "ProjectSet")
                .filter_map(|p| string_field(p, "ProjectId"))
                .collect()
        }
        Action::GetRegion => {
            let response = api.invoke(ApiRequest::new("GetRegion")).await?;
            let mut regions: Vec<String> = Vec::new();
            for region in items(&response, "Regions").filter_map(|r| string_field(r, "Region")) {
                if !regions.contains(&region) {
                    regions.push(region);
                }
            }
            regions
        }
        Action::GetResourceType => ResourceType::ALL
            .iter()
            .map(|t| t.as_str().to_string())
            .collect(),
        Action::GetMetricName => {
            let resource_type = params
                .get(keys::RESOURCE_TYPE)
                .ok_or(LookupError::MissingParameter(keys::RESOURCE_TYPE))?;
            let request =
                ApiRequest::new("DescribeResourceMetric").param(keys::RESOURCE_TYPE, resource_type);
            let response = api.invoke(request).await?;
            items(&response, "DataSet")
                .filter_map(|m| string_field(m, "MetricName"))
                .collect()
        }
        Action::GetResourceId => {
            let resource_type = params
                .get(keys::RESOURCE_TYPE)
                .ok_or(LookupError::MissingParameter(keys::RESOURCE_TYPE))?;
            let kind = resource_type
                .parse()
                .map(ResourceKind::of)
                .map_err(|_| LookupError::UnknownResourceType(resource_type.clone()))?;
            let request = kind.request(params)?;
            let response = api.invoke(request).await?;
            debug!(%resource_type, %response, "resource listing");
            kind.ids(&response, params.get(keys::TAG).map(String::as_str))
        }
    };
    debug!(action = %action, count = values.len(), "lookup complete");
    Ok(values)
}
