//! Running metric queries.
use std::collections::BTreeMap;

use chrono::prelude::*;
use futures_util::stream::FuturesOrdered;
use grafana_plugin_sdk::{
    backend::{self, DataQuery, ErrorSource},
    data,
    prelude::*,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use ucloud_monitor_editor::{params::keys, Query};

use crate::{
    client::{ApiRequest, UCloudApi, UCloudError},
    settings::CredentialsError,
    UCloudMonitor,
};

/// Errors running a single query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Grafana didn't send the datasource settings.
    #[error("Missing datasource instance settings")]
    MissingInstanceSettings {
        /// The query's ref ID.
        ref_id: String,
    },
    /// The datasource credentials are incomplete.
    #[error("{source}")]
    Credentials {
        /// The underlying error.
        source: CredentialsError,
        /// The query's ref ID.
        ref_id: String,
    },
    /// The metric request failed.
    #[error("Error querying UCloud for query {ref_id}: {source}")]
    UCloud {
        /// The underlying error.
        source: UCloudError,
        /// The query's ref ID.
        ref_id: String,
    },
    /// The metric data couldn't be turned into frames.
    #[error("Error building frames for query {ref_id}: {source}")]
    Frame {
        /// The underlying error.
        source: data::Error,
        /// The query's ref ID.
        ref_id: String,
    },
}

impl backend::DataQueryError for QueryError {
    fn ref_id(self) -> String {
        match self {
            Self::MissingInstanceSettings { ref_id }
            | Self::Credentials { ref_id, .. }
            | Self::UCloud { ref_id, .. }
            | Self::Frame { ref_id, .. } => ref_id,
        }
    }

    fn status(&self) -> backend::DataQueryStatus {
        match self {
            Self::MissingInstanceSettings { .. } | Self::Credentials { .. } => {
                backend::DataQueryStatus::BadRequest
            }
            Self::UCloud { .. } => backend::DataQueryStatus::BadGateway,
            Self::Frame { .. } => backend::DataQueryStatus::Internal,
        }
    }

    fn source(&self) -> ErrorSource {
        match self {
            Self::UCloud { .. } => ErrorSource::Downstream,
            _ => ErrorSource::Plugin,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetMetricResponse {
    #[serde(default)]
    data_sets: BTreeMap<String, Vec<MetricPoint>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetricPoint {
    timestamp: i64,
    #[serde(default)]
    value: Option<f64>,
}

/// Build the `GetMetric` request for `query` over `from`..`to`.
///
/// Returns `None` if the query has no resource type or metric name yet, which
/// is normal while it is still being edited.
pub fn metric_request(query: &Query, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<ApiRequest> {
    if query.resource_type.is_empty() || query.metric_name.is_empty() {
        return None;
    }
    Some(
        ApiRequest::new("GetMetric")
            .opt_param(
                keys::PROJECT_ID,
                query.project_id.as_deref().filter(|p| !p.is_empty()),
            )
            .param(keys::REGION, &query.region)
            .param(keys::RESOURCE_TYPE, &query.resource_type)
            .list_param("MetricName", [&query.metric_name])
            .param("ResourceId", &query.resource_id)
            .param("BeginTime", from.timestamp())
            .param("EndTime", to.timestamp()),
    )
}

/// Turn a `GetMetric` response into one frame per metric, named after the resource.
pub fn metric_frames(resource_id: &str, response: serde_json::Value) -> Result<Vec<data::Frame>, UCloudError> {
    let response: GetMetricResponse =
        serde_json::from_value(response).map_err(|e| UCloudError::decode("GetMetric", e))?;
    Ok(response
        .data_sets
        .into_iter()
        .map(|(metric, points)| {
            let (times, values): (Vec<_>, Vec<_>) = points
                .into_iter()
                .filter_map(|p| Some((Utc.timestamp_opt(p.timestamp, 0).single()?, p.value)))
                .unzip();
            data::Frame::new(resource_id)
                .with_field(times.into_field("time"))
                .with_field(values.into_opt_field(metric))
        })
        .collect())
}

/// Run one query against `api`.
pub async fn query_metric<A>(
    api: &A,
    query: &Query,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<data::Frame>, UCloudError>
where
    A: UCloudApi + ?Sized,
{
    let Some(request) = metric_request(query, from, to) else {
        debug!("skipping incomplete query");
        return Ok(Vec::new());
    };
    let response = api.invoke(request).await?;
    metric_frames(&query.resource_id, response)
}

#[backend::async_trait]
impl backend::DataService for UCloudMonitor {
    type Query = Query;
    type QueryError = QueryError;
    type Stream = backend::BoxDataResponseStream<Self::QueryError>;

    async fn query_data(&self, request: backend::QueryDataRequest<Self::Query, Self>) -> Self::Stream {
        let instance_settings = request.plugin_context.instance_settings;
        let api = instance_settings.map(|settings| {
            self.client(&settings.json_data, &settings.decrypted_secure_json_data)
        });
        Box::pin(
            request
                .queries
                .into_iter()
                .map(|x: DataQuery<Self::Query>| {
                    let api = api.clone();
                    async move {
                        let ref_id = x.ref_id;
                        let api = match api {
                            None => return Err(QueryError::MissingInstanceSettings { ref_id }),
                            Some(Err(source)) => {
                                return Err(QueryError::Credentials { source, ref_id })
                            }
                            Some(Ok(api)) => api,
                        };
                        debug!(
                            %ref_id,
                            resource_type = x.query.resource_type,
                            metric_name = x.query.metric_name,
                            "running query",
                        );
                        let frames = query_metric(&api, &x.query, x.time_range.from, x.time_range.to)
                            .await
                            .map_err(|source| {
                                warn!(%ref_id, %source, "query failed");
                                QueryError::UCloud {
                                    source,
                                    ref_id: ref_id.clone(),
                                }
                            })?;
                        let checked = frames
                            .iter()
                            .map(data::Frame::check)
                            .collect::<Result<Vec<_>, _>>()
                            .map_err(|source| QueryError::Frame {
                                source,
                                ref_id: ref_id.clone(),
                            })?;
                        Ok(backend::DataResponse::new(ref_id, checked))
                    }
                })
                .collect::<FuturesOrdered<_>>(),
        )
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use futures_util::StreamExt;
    use grafana_plugin_sdk::{
        arrow::array::Array,
        backend::{DataQueryError, DataService},
        pluginv2,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::{
        matchers::{body_string_contains, method},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::{config::PluginConfig, lookup::test::MockApi, test::plugin_context};

    fn range() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).single().unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).single().unwrap(),
        )
    }

    fn cpu_query() -> Query {
        Query {
            project_id: Some("org-1".to_string()),
            region: "cn-bj2".to_string(),
            resource_type: "uhost".to_string(),
            metric_name: "CPUUtilization".to_string(),
            resource_id: "uhost-1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn builds_get_metric_request() {
        let (from, to) = range();
        let request = metric_request(&cpu_query(), from, to).expect("complete query");
        assert_eq!(request.action(), "GetMetric");
        assert_eq!(request.get("MetricName.0"), Some("CPUUtilization"));
        assert_eq!(request.get("ResourceId"), Some("uhost-1"));
        assert_eq!(request.get("ProjectId"), Some("org-1"));
        assert_eq!(request.get("BeginTime"), Some("1714521600"));
        assert_eq!(request.get("EndTime"), Some("1714525200"));
    }

    #[test]
    fn incomplete_queries_are_skipped() {
        let (from, to) = range();
        let mut query = cpu_query();
        query.metric_name.clear();
        assert!(metric_request(&query, from, to).is_none());
        let mut query = cpu_query();
        query.resource_type.clear();
        assert!(metric_request(&query, from, to).is_none());
    }

    #[tokio::test]
    async fn one_frame_per_metric() {
        let api = MockApi::default().with(
            "GetMetric",
            json!({
                "RetCode": 0,
                "DataSets": {
                    "CPUUtilization": [
                        {"Timestamp": 1714521600, "Value": 12.5},
                        {"Timestamp": 1714521660, "Value": 13}
                    ],
                    "MemUsage": [{"Timestamp": 1714521600, "Value": null}]
                }
            }),
        );
        let (from, to) = range();
        let frames = query_metric(&api, &cpu_query(), from, to)
            .await
            .expect("successful query");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].name, "uhost-1");
        let names: Vec<_> = frames[0].fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["time", "CPUUtilization"]);
        assert_eq!(frames[0].fields()[1].values().len(), 2);
        assert_eq!(frames[1].fields()[1].name, "MemUsage");
        assert!(frames.iter().all(|f| f.check().is_ok()));
    }

    #[tokio::test]
    async fn incomplete_query_makes_no_call() {
        let api = MockApi::default();
        let (from, to) = range();
        let frames = query_metric(&api, &Query::default(), from, to)
            .await
            .expect("empty result");
        assert!(frames.is_empty());
        assert!(api.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn malformed_response() {
        let err = metric_frames("uhost-1", json!({"DataSets": {"CPU": "nope"}})).unwrap_err();
        assert!(matches!(err, UCloudError::Decode { .. }));
        assert!(metric_frames("uhost-1", json!({})).expect("no data").is_empty());
    }

    #[test]
    fn error_statuses() {
        let err = QueryError::UCloud {
            source: UCloudError::Api {
                action: "GetMetric".to_string(),
                ret_code: 230,
                message: "Params [ResourceId] not available".to_string(),
            },
            ref_id: "A".to_string(),
        };
        assert_eq!(DataQueryError::source(&err), ErrorSource::Downstream);
        assert!(matches!(err.status(), backend::DataQueryStatus::BadGateway));
        assert_eq!(err.ref_id(), "A");

        let err = QueryError::Credentials {
            source: CredentialsError::MissingPublicKey,
            ref_id: "B".to_string(),
        };
        assert_eq!(err.to_string(), "Public Key must be set");
        assert!(matches!(err.status(), backend::DataQueryStatus::BadRequest));
    }

    fn data_request(
        context: pluginv2::PluginContext,
        ref_ids: &[&str],
    ) -> backend::QueryDataRequest<Query, UCloudMonitor> {
        pluginv2::QueryDataRequest {
            plugin_context: Some(context),
            queries: ref_ids
                .iter()
                .map(|ref_id| pluginv2::DataQuery {
                    ref_id: ref_id.to_string(),
                    time_range: Some(pluginv2::TimeRange {
                        from_epoch_ms: 1_714_521_600_000,
                        to_epoch_ms: 1_714_525_200_000,
                    }),
                    json: serde_json::to_vec(&cpu_query()).expect("serializable query"),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
        .try_into()
        .expect("valid request")
    }

    async fn run(
        service: &UCloudMonitor,
        request: backend::QueryDataRequest<Query, UCloudMonitor>,
    ) -> Vec<Result<backend::DataResponse, QueryError>> {
        service.query_data(request).await.collect().await
    }

    #[tokio::test]
    async fn every_query_fails_without_instance_settings() {
        let service = UCloudMonitor::new(PluginConfig::default());
        let responses = run(&service, data_request(plugin_context(None), &["A", "B"])).await;
        assert_eq!(responses.len(), 2);
        for (response, expected) in responses.into_iter().zip(["A", "B"]) {
            let Err(err) = response else {
                panic!("query {expected} should fail");
            };
            assert!(matches!(err, QueryError::MissingInstanceSettings { .. }));
            assert!(matches!(err.status(), backend::DataQueryStatus::BadRequest));
            assert_eq!(err.ref_id(), expected);
        }
    }

    #[tokio::test]
    async fn missing_private_key_fails_each_query() {
        let service = UCloudMonitor::new(PluginConfig::default());
        let context = plugin_context(Some(&[("publicKey", "pub")]));
        let responses = run(&service, data_request(context, &["A", "B"])).await;
        assert_eq!(responses.len(), 2);
        for (response, expected) in responses.into_iter().zip(["A", "B"]) {
            let Err(err) = response else {
                panic!("query {expected} should fail");
            };
            assert_eq!(err.to_string(), "Private Key must be set");
            assert!(matches!(
                err,
                QueryError::Credentials {
                    source: CredentialsError::MissingPrivateKey,
                    ..
                }
            ));
            assert!(matches!(err.status(), backend::DataQueryStatus::BadRequest));
            assert_eq!(err.ref_id(), expected);
        }
    }

    #[tokio::test]
    async fn queries_ucloud_with_instance_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Action=GetMetric"))
            .and(body_string_contains("PublicKey=pub"))
            .and(body_string_contains("ResourceId=uhost-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "RetCode": 0,
                "DataSets": {
                    "CPUUtilization": [{"Timestamp": 1714521600, "Value": 12.5}]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
        let service = UCloudMonitor::new(PluginConfig {
            api_base_url: server.uri(),
            request_timeout: Duration::from_secs(5),
            long_request_timeout: Duration::from_secs(5),
        });
        let context = plugin_context(Some(&[("publicKey", "pub"), ("privateKey", "priv")]));
        let responses = run(&service, data_request(context, &["A"])).await;
        assert_eq!(responses.len(), 1);
        assert!(responses[0].is_ok());
    }
}
