//! Building the flat parameter objects sent to the `generic_api` resource.
use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    query::{Query, ResourceType},
    variables::{substitute, VariableTable},
};

/// The name of the backend resource all lookups are multiplexed through.
pub const GENERIC_API: &str = "generic_api";

/// Parameter keys understood by the `generic_api` resource.
pub mod keys {
    /// The lookup being requested; always present.
    pub const ACTION: &str = "Action";
    /// The UCloud project.
    pub const PROJECT_ID: &str = "ProjectId";
    /// The UCloud region.
    pub const REGION: &str = "Region";
    /// The resource type.
    pub const RESOURCE_TYPE: &str = "ResourceType";
    /// Business tag filter.
    pub const TAG: &str = "Tag";
    /// Page size.
    pub const LIMIT: &str = "Limit";
    /// Page offset.
    pub const OFFSET: &str = "Offset";
    /// Load balancer id, for `ulb-vserver` lookups.
    pub const ULB_ID: &str = "ULBId";
    /// Database class type, for `udb` lookups.
    pub const CLASS_TYPE: &str = "ClassType";
}

/// A lookup served by the `generic_api` resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// List the projects visible to the configured credentials.
    GetProjectId,
    /// List the available regions.
    GetRegion,
    /// List the supported resource types.
    GetResourceType,
    /// List the metrics available for a resource type.
    GetMetricName,
    /// List resource ids of a resource type.
    GetResourceId,
}

impl Action {
    /// The wire name of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetProjectId => "GetProjectId",
            Self::GetRegion => "GetRegion",
            Self::GetResourceType => "GetResourceType",
            Self::GetMetricName => "GetMetricName",
            Self::GetResourceId => "GetResourceId",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error returned when parsing an unknown action.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown action {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GetProjectId" => Ok(Self::GetProjectId),
            "GetRegion" => Ok(Self::GetRegion),
            "GetResourceType" => Ok(Self::GetResourceType),
            "GetMetricName" => Ok(Self::GetMetricName),
            "GetResourceId" => Ok(Self::GetResourceId),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// A flat, string-keyed parameter object.
///
/// Always contains an `Action` key. Values are already variable-substituted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ParameterObject(BTreeMap<String, String>);

impl ParameterObject {
    /// Create a parameter object for the given action with no other keys.
    pub fn new(action: Action) -> Self {
        let mut map = BTreeMap::new();
        map.insert(keys::ACTION.to_string(), action.as_str().to_string());
        Self(map)
    }

    /// Insert `value` under `key`, unless it is empty.
    pub fn insert_non_empty(&mut self, key: &str, value: String) {
        if !value.is_empty() {
            self.0.insert(key.to_string(), value);
        }
    }

    /// Get the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterate over the key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The number of keys, including `Action`.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; a parameter object holds at least the action.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the object, returning the underlying map.
    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// Build the parameters for `action` from `query`.
///
/// Only the keys relevant to the action are included, each passed through
/// [`substitute`]; keys whose value is empty after substitution are left out.
pub fn build_params(action: Action, query: &Query, table: &VariableTable) -> ParameterObject {
    let mut params = ParameterObject::new(action);
    let sub = |s: &str| substitute(s, table);
    match action {
        Action::GetProjectId | Action::GetRegion | Action::GetResourceType => {}
        Action::GetMetricName => {
            params.insert_non_empty(keys::RESOURCE_TYPE, sub(&query.resource_type));
        }
        Action::GetResourceId => {
            let resource_type = sub(&query.resource_type);
            if let Some(project_id) = &query.project_id {
                params.insert_non_empty(keys::PROJECT_ID, sub(project_id));
            }
            params.insert_non_empty(keys::REGION, sub(&query.region));
            params.insert_non_empty(keys::TAG, sub(&query.tag));
            params.insert_non_empty(keys::LIMIT, sub(&query.limit));
            params.insert_non_empty(keys::OFFSET, sub(&query.offset));
            match resource_type.parse::<ResourceType>() {
                Ok(ResourceType::UlbVServer) => {
                    if let Some(ulb_id) = &query.ulb_id {
                        params.insert_non_empty(keys::ULB_ID, sub(ulb_id));
                    }
                }
                Ok(ResourceType::Udb) => {
                    if let Some(class_type) = &query.class_type {
                        params.insert_non_empty(keys::CLASS_TYPE, sub(class_type));
                    }
                }
                _ => {}
            }
            params.insert_non_empty(keys::RESOURCE_TYPE, resource_type);
        }
    }
    params
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::variables::Variable;

    fn pairs(params: &ParameterObject) -> Vec<(&str, &str)> {
        params.iter().collect()
    }

    #[test]
    fn metric_name_needs_only_resource_type() {
        let query = Query {
            resource_type: "uhost".to_string(),
            region: "cn-bj2".to_string(),
            tag: "web".to_string(),
            limit: "20".to_string(),
            ..Default::default()
        };
        let params = build_params(Action::GetMetricName, &query, &VariableTable::default());
        assert_eq!(
            pairs(&params),
            vec![("Action", "GetMetricName"), ("ResourceType", "uhost")]
        );
    }

    #[test]
    fn static_lookups_carry_only_action() {
        let query = Query {
            region: "cn-bj2".to_string(),
            ..Default::default()
        };
        for action in [Action::GetProjectId, Action::GetRegion, Action::GetResourceType] {
            let params = build_params(action, &query, &VariableTable::default());
            assert_eq!(pairs(&params), vec![("Action", action.as_str())]);
        }
    }

    #[test]
    fn resource_id_substitutes_every_field() {
        let table = VariableTable::new([
            Variable::new("project", "org-1"),
            Variable::new("region", "cn-sh2"),
            Variable::new("limit", "5"),
        ]);
        let query = Query {
            project_id: Some("$project".to_string()),
            region: "$region".to_string(),
            resource_type: "uhost".to_string(),
            tag: "web".to_string(),
            limit: "$limit".to_string(),
            offset: "0".to_string(),
            ..Default::default()
        };
        let params = build_params(Action::GetResourceId, &query, &table);
        assert_eq!(
            pairs(&params),
            vec![
                ("Action", "GetResourceId"),
                ("Limit", "5"),
                ("Offset", "0"),
                ("ProjectId", "org-1"),
                ("Region", "cn-sh2"),
                ("ResourceType", "uhost"),
                ("Tag", "web"),
            ]
        );
    }

    #[test]
    fn empty_multi_value_variable_is_omitted() {
        let table = VariableTable::new([Variable::multi("tags", Vec::<String>::new())]);
        let query = Query {
            resource_type: "uhost".to_string(),
            tag: "$tags".to_string(),
            ..Default::default()
        };
        let params = build_params(Action::GetResourceId, &query, &table);
        assert_eq!(params.get(keys::TAG), None);
    }

    #[test]
    fn conditional_fields_follow_resource_type() {
        let mut query = Query {
            resource_type: "ulb-vserver".to_string(),
            ulb_id: Some("ulb-abc".to_string()),
            class_type: Some("sql".to_string()),
            ..Default::default()
        };
        let table = VariableTable::default();
        let params = build_params(Action::GetResourceId, &query, &table);
        assert_eq!(params.get(keys::ULB_ID), Some("ulb-abc"));
        assert_eq!(params.get(keys::CLASS_TYPE), None);

        query.resource_type = "udb".to_string();
        let params = build_params(Action::GetResourceId, &query, &table);
        assert_eq!(params.get(keys::ULB_ID), None);
        assert_eq!(params.get(keys::CLASS_TYPE), Some("sql"));
    }

    #[test]
    fn resource_type_from_variable_selects_conditional_field() {
        let table = VariableTable::new([Variable::new("type", "udb")]);
        let query = Query {
            resource_type: "$type".to_string(),
            class_type: Some("nosql".to_string()),
            ..Default::default()
        };
        let params = build_params(Action::GetResourceId, &query, &table);
        assert_eq!(params.get(keys::RESOURCE_TYPE), Some("udb"));
        assert_eq!(params.get(keys::CLASS_TYPE), Some("nosql"));
    }

    #[test]
    fn serializes_as_flat_object() {
        let query = Query {
            resource_type: "eip".to_string(),
            ..Default::default()
        };
        let params = build_params(Action::GetMetricName, &query, &VariableTable::default());
        assert_eq!(
            serde_json::to_value(&params).expect("serializable"),
            serde_json::json!({"Action": "GetMetricName", "ResourceType": "eip"})
        );
    }

    #[test]
    fn action_names_parse() {
        assert_eq!("GetRegion".parse(), Ok(Action::GetRegion));
        assert_eq!(
            "GetMetric".parse::<Action>(),
            Err(UnknownAction("GetMetric".to_string()))
        );
    }
}
