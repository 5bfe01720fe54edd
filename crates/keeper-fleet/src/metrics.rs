//! HTTP-backed metric reader.
//!
//! Queries the time-series service for redundancy samples through the same
//! transport and envelope convention the fleet client uses.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::USER_AGENT;
use http::{Method, Request};
use http_body_util::Full;

use keeper_core::config::MetricsConfig;
use keeper_core::{KeeperError, KeeperResult, MetricReader, MetricSeries, SeriesQuery};

use crate::client::CLIENT_AGENT;
use crate::envelope::decode_data;
use crate::query::encode_query;
use crate::transport::Transport;

pub struct HttpMetricReader {
    address: String,
    path: String,
    transport: Arc<dyn Transport>,
}

impl HttpMetricReader {
    pub fn new(address: impl Into<String>, path: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            address: address.into().trim_end_matches('/').to_string(),
            path: path.into(),
            transport,
        }
    }

    pub fn from_config(config: &MetricsConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(config.address.clone(), config.path.clone(), transport)
    }

    fn uri(&self, query: &SeriesQuery) -> String {
        let benchmark = query.benchmark_qps.to_string();
        let begin = query.begin.to_string();
        let end = query.end.to_string();
        let trim = query.trim_seconds.to_string();
        let params = encode_query(&[
            ("service_name", query.service_name.as_str()),
            ("cluster_name", query.cluster_name.as_str()),
            ("metric_name", query.metric_name.as_str()),
            ("benchmark", benchmark.as_str()),
            ("begin", begin.as_str()),
            ("end", end.as_str()),
            ("trim", trim.as_str()),
        ]);
        format!("{}{}?{}", self.address, self.path, params)
    }
}

#[async_trait]
impl MetricReader for HttpMetricReader {
    async fn query_redundancy_series(&self, query: &SeriesQuery) -> KeeperResult<MetricSeries> {
        if query.begin >= query.end {
            return Err(KeeperError::Validation(format!(
                "empty query window [{}, {}]",
                query.begin, query.end
            )));
        }
        let uri = self.uri(query);
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri.as_str())
            .header(USER_AGENT, CLIENT_AGENT)
            .body(Full::new(Bytes::new()))
            .map_err(|e| KeeperError::Validation(format!("invalid request uri {uri}: {e}")))?;
        let response = self.transport.send(request).await?;
        decode_data(&response)
    }
}
