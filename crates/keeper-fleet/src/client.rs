//! FleetClient — typed calls against the fleet-orchestration API.
//!
//! Identifiers are validated before anything goes over the wire. Every
//! call is a single GET through the configured [`Transport`]; failures are
//! returned to the caller, which treats them as this cycle's failure.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::USER_AGENT;
use http::{Method, Request, Response};
use http_body_util::Full;
use serde::Deserialize;
use tracing::{debug, info};

use keeper_core::config::FleetConfig;
use keeper_core::{Fleet, IdentityResolver, KeeperError, KeeperResult, ServiceIdentity};

use crate::envelope::{decode_ack, decode_data};
use crate::query::encode_query;
use crate::transport::{Authenticated, HttpTransport, StaticTokenIssuer, Transport};

const SCHEDULING_PATH: &str = "/api/v1/schedulx/service/scheduling";
const INSTANCE_COUNT_PATH: &str = "/api/v1/schedulx/instance/count";
const EXPAND_PATH: &str = "/api/v1/schedulx/service/expand";
const SHRINK_PATH: &str = "/api/v1/schedulx/service/shrink";
const IDENTITY_PATH: &str = "/api/v1/schedulx/instance/service";

pub(crate) const CLIENT_AGENT: &str = concat!("redundancy-keeper/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct SchedulingData {
    /// `true` while a scaling operation is already running.
    scheduling: bool,
}

#[derive(Debug, Deserialize)]
struct SubClusterCount {
    #[serde(default)]
    instance_count: u32,
}

#[derive(Debug, Deserialize)]
struct InstanceCountData {
    #[serde(default)]
    service_cluster_list: Vec<SubClusterCount>,
}

/// Client for the fleet-orchestration API.
#[derive(Clone)]
pub struct FleetClient {
    address: String,
    transport: Arc<dyn Transport>,
}

impl FleetClient {
    /// Create a client for `address` (e.g. `http://fleet:9090`) using the
    /// given transport.
    pub fn new(address: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let address = address.into().trim_end_matches('/').to_string();
        Self { address, transport }
    }

    /// Authenticated HTTP client built from the `[fleet]` section.
    pub fn from_config(config: &FleetConfig) -> Self {
        let issuer = Arc::new(StaticTokenIssuer::from_config(config));
        let transport = Authenticated::new(HttpTransport::new(config.timeout), issuer);
        Self::new(config.address.clone(), Arc::new(transport))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> KeeperResult<Response<Bytes>> {
        let uri = format!("{}{}?{}", self.address, path, encode_query(params));
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri.as_str())
            .header(USER_AGENT, CLIENT_AGENT)
            .body(Full::new(Bytes::new()))
            .map_err(|e| KeeperError::Validation(format!("invalid request uri {uri}: {e}")))?;
        debug!(%uri, "fleet request");
        self.transport.send(request).await
    }

    /// Whether the cluster can accept a new scaling operation.
    pub async fn is_schedulable(&self, service: &str, cluster: &str) -> KeeperResult<bool> {
        validate_names(service, cluster)?;
        let response = self
            .get(
                SCHEDULING_PATH,
                &[("service_name", service), ("service_cluster_name", cluster)],
            )
            .await?;
        let data: SchedulingData = decode_data(&response)?;
        Ok(!data.scheduling)
    }

    /// Running instances, summed across sub-clusters.
    pub async fn instance_count(&self, service: &str, cluster: &str) -> KeeperResult<u32> {
        validate_names(service, cluster)?;
        let response = self
            .get(
                INSTANCE_COUNT_PATH,
                &[("service_name", service), ("service_cluster_name", cluster)],
            )
            .await?;
        let data: InstanceCountData = decode_data(&response)?;
        Ok(data
            .service_cluster_list
            .iter()
            .map(|sc| sc.instance_count)
            .sum())
    }

    pub async fn expand(&self, service: &str, cluster: &str, count: u32) -> KeeperResult<()> {
        self.scale(EXPAND_PATH, service, cluster, count).await?;
        info!(service_name = service, service_cluster = cluster, count, "expand service succeeded");
        Ok(())
    }

    pub async fn shrink(&self, service: &str, cluster: &str, count: u32) -> KeeperResult<()> {
        self.scale(SHRINK_PATH, service, cluster, count).await?;
        info!(service_name = service, service_cluster = cluster, count, "shrink service succeeded");
        Ok(())
    }

    async fn scale(&self, path: &str, service: &str, cluster: &str, count: u32) -> KeeperResult<()> {
        validate_params(service, cluster, count)?;
        let count = count.to_string();
        let response = self
            .get(
                path,
                &[
                    ("service_name", service),
                    ("service_cluster", cluster),
                    ("count", count.as_str()),
                    ("exec_type", "auto"),
                ],
            )
            .await?;
        decode_ack(&response)
    }

    /// Look up the service an inner IP belongs to.
    pub async fn service_by_identity(&self, identity: &str) -> KeeperResult<ServiceIdentity> {
        if identity.is_empty() {
            return Err(KeeperError::Validation("identity must not be empty".into()));
        }
        let response = self.get(IDENTITY_PATH, &[("ip_inner", identity)]).await?;
        decode_data(&response)
    }
}

#[async_trait]
impl Fleet for FleetClient {
    async fn is_schedulable(&self, service: &str, cluster: &str) -> KeeperResult<bool> {
        FleetClient::is_schedulable(self, service, cluster).await
    }

    async fn instance_count(&self, service: &str, cluster: &str) -> KeeperResult<u32> {
        FleetClient::instance_count(self, service, cluster).await
    }

    async fn expand(&self, service: &str, cluster: &str, count: u32) -> KeeperResult<()> {
        FleetClient::expand(self, service, cluster, count).await
    }

    async fn shrink(&self, service: &str, cluster: &str, count: u32) -> KeeperResult<()> {
        FleetClient::shrink(self, service, cluster, count).await
    }
}

#[async_trait]
impl IdentityResolver for FleetClient {
    async fn resolve_identity(&self, identity: &str) -> KeeperResult<ServiceIdentity> {
        self.service_by_identity(identity).await
    }
}

fn validate_names(service: &str, cluster: &str) -> KeeperResult<()> {
    if service.is_empty() {
        return Err(KeeperError::Validation("service name must not be empty".into()));
    }
    if cluster.is_empty() {
        return Err(KeeperError::Validation("cluster name must not be empty".into()));
    }
    Ok(())
}

fn validate_params(service: &str, cluster: &str, count: u32) -> KeeperResult<()> {
    validate_names(service, cluster)?;
    if count == 0 {
        return Err(KeeperError::Validation("instance count must be greater than 0".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use axum::extract::{Query, State};
    use axum::http::HeaderMap;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    /// Every request the fake orchestration API received: (path, params, auth).
    type Log = Arc<Mutex<Vec<(String, HashMap<String, String>, Option<String>)>>>;

    fn record(log: &Log, path: &str, params: &HashMap<String, String>, headers: &HeaderMap) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        log.lock().unwrap().push((path.to_string(), params.clone(), auth));
    }

    async fn scheduling(
        State(log): State<Log>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        record(&log, SCHEDULING_PATH, &params, &headers);
        match params.get("service_name").map(String::as_str) {
            Some("broken") => Json(json!({"code": 500, "data": null, "msg": "db down"})),
            Some("busy") => Json(json!({"code": 200, "data": {"scheduling": true}, "msg": "ok"})),
            _ => Json(json!({"code": 200, "data": {"scheduling": false}, "msg": "ok"})),
        }
    }

    async fn count(
        State(log): State<Log>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        record(&log, INSTANCE_COUNT_PATH, &params, &headers);
        Json(json!({
            "code": 200,
            "data": {"service_cluster_list": [{"instance_count": 3}, {"instance_count": 4}]},
            "msg": "ok"
        }))
    }

    async fn expand(
        State(log): State<Log>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        record(&log, EXPAND_PATH, &params, &headers);
        Json(json!({"code": 200, "data": "accepted", "msg": "ok"}))
    }

    async fn shrink(
        State(log): State<Log>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        record(&log, SHRINK_PATH, &params, &headers);
        Json(json!({"code": 403, "data": null, "msg": "shrink frozen"}))
    }

    async fn identity(
        State(log): State<Log>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        record(&log, IDENTITY_PATH, &params, &headers);
        Json(json!({
            "code": 200,
            "data": {"service_name": "checkout", "service_cluster_name": "checkout-a"},
            "msg": "ok"
        }))
    }

    async fn spawn_fake() -> (FleetClient, Log) {
        let log: Log = Arc::default();
        let router = Router::new()
            .route(SCHEDULING_PATH, get(scheduling))
            .route(INSTANCE_COUNT_PATH, get(count))
            .route(EXPAND_PATH, get(expand))
            .route(SHRINK_PATH, get(shrink))
            .route(IDENTITY_PATH, get(identity))
            .with_state(log.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let transport = Authenticated::new(
            HttpTransport::new(std::time::Duration::from_secs(5)),
            Arc::new(StaticTokenIssuer::new("secret")),
        );
        let client = FleetClient::new(format!("http://{addr}/"), Arc::new(transport));
        (client, log)
    }

    #[tokio::test]
    async fn schedulable_is_inverse_of_scheduling_flag() {
        let (client, log) = spawn_fake().await;

        assert!(client.is_schedulable("checkout", "checkout-a").await.unwrap());
        assert!(!client.is_schedulable("busy", "busy-a").await.unwrap());

        let log = log.lock().unwrap();
        assert_eq!(log[0].1["service_cluster_name"], "checkout-a");
        assert_eq!(log[0].2.as_deref(), Some("Bearer: secret"));
    }

    #[tokio::test]
    async fn non_success_code_surfaces_code_and_message() {
        let (client, _) = spawn_fake().await;
        let err = client.is_schedulable("broken", "x").await.unwrap_err();
        assert_eq!(
            err,
            KeeperError::Api {
                code: 500,
                message: "db down".into()
            }
        );
    }

    #[tokio::test]
    async fn instance_count_sums_sub_clusters() {
        let (client, _) = spawn_fake().await;
        assert_eq!(client.instance_count("checkout", "checkout-a").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn expand_sends_count_and_exec_type() {
        let (client, log) = spawn_fake().await;
        client.expand("checkout", "checkout-a", 4).await.unwrap();

        let log = log.lock().unwrap();
        let (path, params, _) = &log[0];
        assert_eq!(path, EXPAND_PATH);
        assert_eq!(params["service_cluster"], "checkout-a");
        assert_eq!(params["count"], "4");
        assert_eq!(params["exec_type"], "auto");
    }

    #[tokio::test]
    async fn shrink_api_error_is_returned() {
        let (client, _) = spawn_fake().await;
        let err = client.shrink("checkout", "checkout-a", 2).await.unwrap_err();
        assert!(matches!(err, KeeperError::Api { code: 403, .. }));
    }

    #[tokio::test]
    async fn validation_failures_never_reach_the_wire() {
        let (client, log) = spawn_fake().await;

        assert!(client.is_schedulable("", "c").await.unwrap_err().is_validation());
        assert!(client.instance_count("s", "").await.unwrap_err().is_validation());
        assert!(client.expand("s", "c", 0).await.unwrap_err().is_validation());
        assert!(client.shrink("", "c", 1).await.unwrap_err().is_validation());
        assert!(client.service_by_identity("").await.unwrap_err().is_validation());

        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn identity_lookup_decodes_service() {
        let (client, log) = spawn_fake().await;
        let id = client.resolve_identity("10.0.0.7").await.unwrap();
        assert_eq!(id.service_name, "checkout");
        assert_eq!(id.service_cluster_name, "checkout-a");
        assert_eq!(log.lock().unwrap()[0].1["ip_inner"], "10.0.0.7");
    }

    #[test]
    fn address_trailing_slash_is_trimmed() {
        let client = FleetClient::new(
            "http://fleet:9090/",
            Arc::new(HttpTransport::new(std::time::Duration::from_secs(1))),
        );
        assert_eq!(client.address(), "http://fleet:9090");
    }
}
