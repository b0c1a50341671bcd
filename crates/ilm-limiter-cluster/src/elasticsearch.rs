//! Gateway implementation on top of the Elasticsearch REST API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ilm_limiter_core::{
    CoreError, CoreResult, IndexLifecycleState, LifecycleStep, Phase, RawPolicy,
};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::gateway::{ClusterGateway, TransitionOutcome};

const CALLER_HEADER: &str = "x-caller";
const CALLER: &str = "ilm-limiter";

/// Connection settings for [`ElasticsearchGateway`].
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    /// Base URL with protocol and port, e.g. `https://es.example.com:9200`.
    pub url: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout. `None` keeps the client default.
    pub timeout: Option<Duration>,
}

/// [`ClusterGateway`] backed by an Elasticsearch cluster.
pub struct ElasticsearchGateway {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl ElasticsearchGateway {
    /// Builds the HTTP client. No request is sent until the first call.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Connection` if the URL is malformed or the client
    /// cannot be constructed.
    pub fn new(config: ElasticsearchConfig) -> CoreResult<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| CoreError::connection(format!("invalid url '{}': {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(CoreError::connection(format!(
                "invalid url '{}': not an http endpoint",
                config.url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CALLER_HEADER, HeaderValue::from_static(CALLER));

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| CoreError::connection(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            username: config.username,
            password: config.password,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> CoreResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CoreError::connection(format!("invalid url '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> CoreResult<Response> {
        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| CoreError::connection(format!("{}: {}", path, e)))?;

        tracing::debug!(path, status = %response.status(), "cluster request");
        Ok(response)
    }

    async fn get_json(&self, segments: &[&str], query: &[(&str, &str)]) -> CoreResult<Value> {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();
        let response = self.send(self.client.get(url).query(query), &path).await?;
        read_json(&path, response).await
    }

    async fn post_json(&self, segments: &[&str], body: &Value) -> CoreResult<Value> {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();
        let response = self.send(self.client.post(url).json(body), &path).await?;
        read_json(&path, response).await
    }
}

async fn read_json(path: &str, response: Response) -> CoreResult<Value> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(path, status, response).await);
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| CoreError::Deserialization(format!("{}: {}", path, e)))
}

async fn status_error(path: &str, status: StatusCode, response: Response) -> CoreError {
    let body = response.text().await.unwrap_or_default();
    error_for_status(path, status, body)
}

/// Error for a non-success answer. Only 401 is fatal; a 403 concerns the
/// resource that was asked for and stays scoped to it.
fn error_for_status(path: &str, status: StatusCode, body: String) -> CoreError {
    match status {
        StatusCode::UNAUTHORIZED => {
            CoreError::authentication(format!("{} returned {}: {}", path, status, body))
        }
        StatusCode::FORBIDDEN => CoreError::Forbidden {
            endpoint: path.to_string(),
            body,
        },
        _ => CoreError::Http {
            endpoint: path.to_string(),
            status: status.as_u16(),
            body,
        },
    }
}

/// Interprets the answer of the move API.
///
/// 400 means the index is no longer on the expected step and 404 that it is
/// gone; both are concurrent lifecycle activity, not failures.
fn transition_outcome(path: &str, status: StatusCode, body: String) -> CoreResult<TransitionOutcome> {
    if status.is_success() {
        Ok(TransitionOutcome::Applied)
    } else if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
        Ok(TransitionOutcome::PreconditionFailed(body))
    } else {
        Err(error_for_status(path, status, body))
    }
}

fn transition_body(current_step: &LifecycleStep, target: Phase) -> Value {
    json!({
        "current_step": current_step,
        "next_step": { "phase": target },
    })
}

#[async_trait]
impl ClusterGateway for ElasticsearchGateway {
    async fn has_cluster_privileges(&self, privileges: &[String]) -> CoreResult<bool> {
        let response = self
            .post_json(
                &["_security", "user", "_has_privileges"],
                &json!({ "cluster": privileges }),
            )
            .await?;
        tracing::debug!("cluster privileges: {}", response);
        parse_has_privileges(&response)
    }

    async fn has_index_privileges(
        &self,
        indices: &[String],
        privileges: &[String],
    ) -> CoreResult<bool> {
        if indices.is_empty() {
            return Ok(true);
        }

        let response = self
            .post_json(
                &["_security", "user", "_has_privileges"],
                &json!({ "index": [{ "names": indices, "privileges": privileges }] }),
            )
            .await?;
        tracing::debug!("index privileges: {}", response);
        parse_has_privileges(&response)
    }

    async fn list_lifecycle_policies(&self) -> CoreResult<BTreeMap<String, RawPolicy>> {
        let response = self.get_json(&["_ilm", "policy"], &[]).await?;
        parse_policies(response)
    }

    async fn get_index_lifecycle_state(&self, index: &str) -> CoreResult<IndexLifecycleState> {
        let response = self.get_json(&[index, "_ilm", "explain"], &[]).await?;
        parse_explain(index, response)
    }

    async fn get_index_creation_date(&self, index: &str) -> CoreResult<DateTime<Utc>> {
        let response = self.get_json(&[index, "_settings"], &[]).await?;
        let created = parse_creation_date(index, &response)?;
        tracing::debug!("index '{}' creation date: {}", index, created.timestamp_millis());
        Ok(created)
    }

    async fn get_index_dataset_size_bytes(&self, index: &str) -> CoreResult<u64> {
        let response = self
            .get_json(&["_cat", "shards", index], &[("format", "json"), ("bytes", "b")])
            .await?;
        let size = parse_shard_dataset_sizes(&response)?;
        tracing::debug!("index '{}' disk usage: {}", index, size);
        Ok(size)
    }

    async fn request_phase_transition(
        &self,
        index: &str,
        current_step: &LifecycleStep,
        target: Phase,
    ) -> CoreResult<TransitionOutcome> {
        let url = self.endpoint(&["_ilm", "move", index])?;
        let path = url.path().to_string();
        let body = transition_body(current_step, target);

        let response = self.send(self.client.post(url).json(&body), &path).await?;
        let status = response.status();
        let reason = response.text().await.unwrap_or_default();
        transition_outcome(&path, status, reason)
    }
}

fn parse_has_privileges(response: &Value) -> CoreResult<bool> {
    response
        .get("has_all_requested")
        .and_then(Value::as_bool)
        .ok_or_else(|| {
            CoreError::Deserialization("privileges response lacks `has_all_requested`".to_string())
        })
}

#[derive(Debug, Deserialize)]
struct PolicyEntry {
    policy: PolicyBody,
    #[serde(default)]
    in_use_by: InUseBy,
}

#[derive(Debug, Deserialize)]
struct PolicyBody {
    #[serde(rename = "_meta")]
    meta: Option<Value>,
    #[serde(default)]
    phases: Value,
}

#[derive(Debug, Default, Deserialize)]
struct InUseBy {
    #[serde(default)]
    indices: Vec<String>,
}

fn parse_policies(response: Value) -> CoreResult<BTreeMap<String, RawPolicy>> {
    let entries: BTreeMap<String, PolicyEntry> = serde_json::from_value(response)?;

    Ok(entries
        .into_iter()
        .map(|(name, entry)| {
            let policy = RawPolicy {
                metadata: entry.policy.meta,
                phases: entry.policy.phases,
                indices: entry.in_use_by.indices,
            };
            (name, policy)
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct ExplainResponse {
    indices: HashMap<String, ExplainIndex>,
}

#[derive(Debug, Deserialize)]
struct ExplainIndex {
    phase: Option<String>,
    action: Option<String>,
    step: Option<String>,
    lifecycle_date_millis: Option<i64>,
}

fn parse_explain(index: &str, response: Value) -> CoreResult<IndexLifecycleState> {
    let mut explain: ExplainResponse = serde_json::from_value(response)?;
    let entry = explain.indices.remove(index).ok_or_else(|| {
        CoreError::Deserialization(format!("explain response lacks index '{}'", index))
    })?;

    let (Some(phase), Some(action), Some(step)) = (entry.phase, entry.action, entry.step) else {
        return Err(CoreError::invalid_state(format!(
            "index '{}' has no lifecycle step, it is not managed by a lifecycle policy",
            index
        )));
    };

    let lifecycle_date = match entry.lifecycle_date_millis {
        Some(millis) => Some(millis_to_datetime(index, millis)?),
        None => None,
    };

    Ok(IndexLifecycleState {
        step: LifecycleStep::new(phase, action, step),
        lifecycle_date,
    })
}

fn parse_creation_date(index: &str, response: &Value) -> CoreResult<DateTime<Utc>> {
    let raw = response
        .get(index)
        .and_then(|v| v.pointer("/settings/index/creation_date"))
        .ok_or_else(|| {
            CoreError::Deserialization(format!("settings of index '{}' lack creation_date", index))
        })?;

    let millis = match raw {
        Value::String(text) => text.parse::<i64>().map_err(|e| {
            CoreError::Deserialization(format!("creation_date of '{}': {}", index, e))
        })?,
        Value::Number(number) => number.as_i64().ok_or_else(|| {
            CoreError::Deserialization(format!("creation_date of '{}' is not an integer", index))
        })?,
        _ => {
            return Err(CoreError::Deserialization(format!(
                "creation_date of '{}' has unexpected type",
                index
            )))
        }
    };

    millis_to_datetime(index, millis)
}

fn parse_shard_dataset_sizes(response: &Value) -> CoreResult<u64> {
    let shards = response.as_array().ok_or_else(|| {
        CoreError::Deserialization("shards response is not an array".to_string())
    })?;

    shards.iter().try_fold(0u64, |total, shard| -> CoreResult<u64> {
        let size = match shard.get("dataset") {
            None | Some(Value::Null) => 0,
            Some(Value::String(text)) if text.is_empty() => 0,
            Some(Value::String(text)) => text.parse::<u64>().map_err(|e| {
                CoreError::Deserialization(format!("invalid shard dataset size '{}': {}", text, e))
            })?,
            Some(Value::Number(number)) => number.as_u64().ok_or_else(|| {
                CoreError::Deserialization(format!("invalid shard dataset size {}", number))
            })?,
            Some(other) => {
                return Err(CoreError::Deserialization(format!(
                    "invalid shard dataset size {}",
                    other
                )))
            }
        };
        Ok(total.saturating_add(size))
    })
}

fn millis_to_datetime(index: &str, millis: i64) -> CoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        CoreError::Deserialization(format!("timestamp {} of index '{}' is out of range", millis, index))
    })
}
