//! Loading selectable options from the `generic_api` resource.
//!
//! Option loading fails soft: whatever goes wrong, callers receive an empty
//! list and the failure is only logged. An editor whose backend is unreachable
//! stays usable; users can still type custom values.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::{FetchError, VariableQueryError},
    params::{build_params, keys, Action, ParameterObject, GENERIC_API},
    query::Query,
    variables::{substitute, VariableTable},
};

/// One choice in a selection widget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    /// The text shown to the user.
    pub label: String,
    /// The value written into the query when selected.
    pub value: String,
    /// Set for options produced for template variable queries.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
}

impl SelectOption {
    /// An option whose label and value are both `v`.
    pub fn new(v: impl Into<String>) -> Self {
        let v = v.into();
        Self {
            label: v.clone(),
            value: v,
            text: None,
        }
    }

    /// An option for a template variable query, additionally carrying `text`.
    pub fn with_text(v: impl Into<String>) -> Self {
        let mut option = Self::new(v);
        option.text = Some(option.value.clone());
        option
    }
}

/// The capability to call a backend resource.
///
/// This is provided by the host. [`GrafanaResourceClient`][crate::http::GrafanaResourceClient]
/// implements it over Grafana's HTTP API.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Call the resource `name` with `params`, returning the decoded JSON response.
    async fn fetch_resource(
        &self,
        name: &str,
        params: &ParameterObject,
    ) -> Result<Value, FetchError>;
}

/// Convert a resource response into options.
///
/// Arrays map element-wise, in order; anything else yields no options.
pub fn options_from_response(response: &Value, with_text: bool) -> Vec<SelectOption> {
    let Some(items) = response.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let v = match item {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Object(o) => o
                    .get("value")
                    .or_else(|| o.get("text"))
                    .and_then(Value::as_str)?
                    .to_string(),
                _ => return None,
            };
            let label = match item {
                Value::Object(o) => o
                    .get("label")
                    .or_else(|| o.get("text"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| v.clone()),
                _ => v.clone(),
            };
            Some(SelectOption {
                label,
                text: with_text.then(|| v.clone()),
                value: v,
            })
        })
        .collect()
}

async fn fetch_options<F>(fetcher: &F, params: &ParameterObject, with_text: bool) -> Vec<SelectOption>
where
    F: ResourceFetcher + ?Sized,
{
    let action = params.get(keys::ACTION).unwrap_or_default();
    match fetcher.fetch_resource(GENERIC_API, params).await {
        Ok(response) => {
            if !response.is_array() {
                warn!(action, "resource returned a non-array response; using no options");
            }
            let options = options_from_response(&response, with_text);
            debug!(action, count = options.len(), "loaded options");
            options
        }
        Err(error) => {
            warn!(action, %error, "failed to load options");
            Vec::new()
        }
    }
}

/// Load the options for `action`, built from `query` with variables resolved from `table`.
pub async fn load_options<F>(
    fetcher: &F,
    action: Action,
    query: &Query,
    table: &VariableTable,
) -> Vec<SelectOption>
where
    F: ResourceFetcher + ?Sized,
{
    let params = build_params(action, query, table);
    fetch_options(fetcher, &params, false).await
}

/// Load options for an already-built parameter object.
pub async fn load_options_with_params<F>(fetcher: &F, params: &ParameterObject) -> Vec<SelectOption>
where
    F: ResourceFetcher + ?Sized,
{
    fetch_options(fetcher, params, false).await
}

/// A free-form template variable query, e.g.
/// `{"Action": "GetResourceId", "Region": "$region", "ResourceType": "uhost"}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VariableQuery {
    /// The lookup to perform.
    pub action: String,
    /// The UCloud project.
    #[serde(default)]
    pub project_id: Option<String>,
    /// The region.
    #[serde(default)]
    pub region: Option<String>,
    /// The resource type.
    #[serde(default)]
    pub resource_type: Option<String>,
}

impl VariableQuery {
    /// Parse a raw variable query string.
    pub fn parse(raw: &str) -> Result<Self, VariableQueryError> {
        serde_json::from_str(raw).map_err(|source| VariableQueryError::InvalidJson {
            query: raw.to_string(),
            source,
        })
    }

    /// Build the parameter object for this query, resolving variables from `table`.
    pub fn to_params(&self, table: &VariableTable) -> Result<ParameterObject, VariableQueryError> {
        let action: Action = substitute(&self.action, table).parse()?;
        let mut params = ParameterObject::new(action);
        for (key, value) in [
            (keys::PROJECT_ID, &self.project_id),
            (keys::REGION, &self.region),
            (keys::RESOURCE_TYPE, &self.resource_type),
        ] {
            if let Some(v) = value {
                params.insert_non_empty(key, substitute(v, table));
            }
        }
        Ok(params)
    }
}

/// Resolve a template variable query into options carrying `text`.
///
/// Malformed queries are logged and resolve to an empty list.
pub async fn metric_find_query<F>(fetcher: &F, raw: &str, table: &VariableTable) -> Vec<SelectOption>
where
    F: ResourceFetcher + ?Sized,
{
    let params = match VariableQuery::parse(raw).and_then(|q| q.to_params(table)) {
        Ok(params) => params,
        Err(error) => {
            warn!(%error, "ignoring malformed variable query");
            return Vec::new();
        }
    };
    fetch_options(fetcher, &params, true).await
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::variables::Variable;

    /// A fetcher returning a canned response and recording every call.
    pub(crate) struct MockFetcher {
        response: Mutex<Option<Value>>,
        pub(crate) calls: Mutex<Vec<(String, ParameterObject)>>,
    }

    impl MockFetcher {
        pub(crate) fn returning(response: Value) -> Self {
            Self {
                response: Mutex::new(Some(response)),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                response: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn set_response(&self, response: Value) {
            *self.response.lock().unwrap() = Some(response);
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub(crate) fn recorded_calls(&self) -> Vec<(String, ParameterObject)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResourceFetcher for MockFetcher {
        async fn fetch_resource(
            &self,
            name: &str,
            params: &ParameterObject,
        ) -> Result<Value, FetchError> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), params.clone()));
            self.response
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| FetchError::Status {
                    resource: name.to_string(),
                    status: 500,
                    body: r#"{"error":"boom"}"#.to_string(),
                })
        }
    }

    fn uhost_query() -> Query {
        Query {
            resource_type: "uhost".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn maps_string_array() {
        let fetcher = MockFetcher::returning(json!(["a", "b"]));
        let options = load_options(
            &fetcher,
            Action::GetMetricName,
            &uhost_query(),
            &VariableTable::default(),
        )
        .await;
        assert_eq!(options, vec![SelectOption::new("a"), SelectOption::new("b")]);
        let calls = fetcher.calls.lock().unwrap();
        assert_eq!(calls[0].0, "generic_api");
        assert_eq!(calls[0].1.get("ResourceType"), Some("uhost"));
    }

    #[tokio::test]
    async fn non_array_yields_nothing() {
        let fetcher = MockFetcher::returning(json!({}));
        let options = load_options(
            &fetcher,
            Action::GetRegion,
            &Query::default(),
            &VariableTable::default(),
        )
        .await;
        assert_eq!(options, vec![]);
    }

    #[tokio::test]
    async fn fetch_error_yields_nothing() {
        let fetcher = MockFetcher::failing();
        let options = load_options(
            &fetcher,
            Action::GetProjectId,
            &Query::default(),
            &VariableTable::default(),
        )
        .await;
        assert_eq!(options, vec![]);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[test]
    fn maps_mixed_elements() {
        let options = options_from_response(
            &json!([
                "x",
                3,
                true,
                {"label": "Host 1", "value": "uhost-1"},
                {"text": "t"},
                null,
                ["nested"]
            ]),
            false,
        );
        assert_eq!(
            options,
            vec![
                SelectOption::new("x"),
                SelectOption::new("3"),
                SelectOption::new("true"),
                SelectOption {
                    label: "Host 1".to_string(),
                    value: "uhost-1".to_string(),
                    text: None,
                },
                SelectOption::new("t"),
            ]
        );
    }

    #[tokio::test]
    async fn variable_query_resolves_with_text() {
        let fetcher = MockFetcher::returning(json!(["cn-bj2", "cn-sh2"]));
        let table = VariableTable::new([Variable::new("project", "org-7")]);
        let options = metric_find_query(
            &fetcher,
            r#"{"Action": "GetRegion", "ProjectId": "$project"}"#,
            &table,
        )
        .await;
        assert_eq!(
            options,
            vec![SelectOption::with_text("cn-bj2"), SelectOption::with_text("cn-sh2")]
        );
        let calls = fetcher.calls.lock().unwrap();
        assert_eq!(calls[0].1.get("Action"), Some("GetRegion"));
        assert_eq!(calls[0].1.get("ProjectId"), Some("org-7"));
    }

    #[tokio::test]
    async fn malformed_variable_query_yields_nothing() {
        let fetcher = MockFetcher::returning(json!(["never"]));
        let options = metric_find_query(&fetcher, "{not json", &VariableTable::default()).await;
        assert_eq!(options, vec![]);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_variable_query_action_yields_nothing() {
        let fetcher = MockFetcher::returning(json!(["never"]));
        let options = metric_find_query(
            &fetcher,
            r#"{"Action": "DeleteEverything"}"#,
            &VariableTable::default(),
        )
        .await;
        assert_eq!(options, vec![]);
        assert_eq!(fetcher.call_count(), 0);
    }
}
