// Result sink - where classification results are delivered
//
// The sink answers with the HTTP status it received; deciding whether that
// counts as Ack or Fail belongs to the dispatcher. Futures are boxed so the
// sink can live behind `Arc<dyn ResultSink>`.

use crate::analysis::ClassificationResult;
use crate::error::{log_sink_error, SinkError};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Url;
use serde::Serialize;
use std::time::Duration;

/// Path appended to the sink base URL
pub const TREMOR_ENDPOINT: &str = "/api/tremor";

/// Body posted for each classification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkPayload {
    pub device_id: String,
    /// Lower-case severity label
    pub classification: String,
    pub confidence: f64,
    /// Dominant frequency (Hz)
    pub frequency: f64,
    /// Window RMS
    pub amplitude: f64,
    /// Epoch milliseconds
    pub timestamp: u64,
    pub data_type: String,
}

impl SinkPayload {
    pub fn from_result(result: &ClassificationResult, device_id: &str, data_type: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            classification: result.label.as_str().to_string(),
            confidence: result.confidence,
            frequency: result.dominant_frequency,
            amplitude: result.amplitude,
            timestamp: result.produced_at_ms,
            data_type: data_type.to_string(),
        }
    }
}

/// Destination for classification results
pub trait ResultSink: Send + Sync {
    /// Deliver one payload
    ///
    /// # Returns
    /// The HTTP status code of the response, or a transport error when no
    /// response was received
    fn send(&self, payload: SinkPayload) -> BoxFuture<'static, Result<u16, SinkError>>;
}

/// JSON-over-HTTP sink
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    /// Build a sink posting to `{base_url}/api/tremor`
    ///
    /// A base URL that already ends in the endpoint path is used as given.
    /// The client-level timeout is a backstop; the dispatcher applies its
    /// own per-attempt timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SinkError> {
        let endpoint = Self::endpoint_for(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                let err = SinkError::Client {
                    reason: e.to_string(),
                };
                log_sink_error(&err, "HttpSink::new");
                err
            })?;
        tracing::info!("[Dispatch] Posting results to {}", endpoint);
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn endpoint_for(base_url: &str) -> Result<String, SinkError> {
        let invalid = || {
            let err = SinkError::InvalidUrl {
                url: base_url.to_string(),
            };
            log_sink_error(&err, "HttpSink::new");
            err
        };

        let mut url = Url::parse(base_url.trim()).map_err(|_| invalid())?;
        let has_host = url.host_str().is_some_and(|host| !host.is_empty());
        if !matches!(url.scheme(), "http" | "https") || !has_host {
            return Err(invalid());
        }

        let path = url.path().trim_end_matches('/').to_string();
        if path.ends_with(TREMOR_ENDPOINT) {
            url.set_path(&path);
        } else {
            url.set_path(&format!("{}{}", path, TREMOR_ENDPOINT));
        }
        Ok(url.to_string())
    }
}

impl ResultSink for HttpSink {
    fn send(&self, payload: SinkPayload) -> BoxFuture<'static, Result<u16, SinkError>> {
        let request = self.client.post(&self.endpoint).json(&payload);
        async move {
            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    SinkError::TimedOut
                } else {
                    SinkError::Transport {
                        reason: e.to_string(),
                    }
                }
            })?;
            Ok(response.status().as_u16())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DecisionTier, Severity};
    use crate::analysis::features::FeatureVector;

    #[test]
    fn test_endpoint_normalisation() {
        assert_eq!(
            HttpSink::endpoint_for("http://localhost:3000").unwrap(),
            "http://localhost:3000/api/tremor"
        );
        assert_eq!(
            HttpSink::endpoint_for("http://localhost:3000/").unwrap(),
            "http://localhost:3000/api/tremor"
        );
        assert_eq!(
            HttpSink::endpoint_for("https://example.org/api/tremor").unwrap(),
            "https://example.org/api/tremor"
        );
    }

    #[test]
    fn test_short_hosts_and_base_paths() {
        assert_eq!(HttpSink::endpoint_for("http://a").unwrap(), "http://a/api/tremor");
        assert_eq!(
            HttpSink::endpoint_for(" http://10.0.0.5:8080/collector/ ").unwrap(),
            "http://10.0.0.5:8080/collector/api/tremor"
        );
    }

    #[test]
    fn test_rejects_non_http_urls() {
        for url in ["", "localhost:3000", "ftp://host", "http://", "http://exa mple"] {
            assert!(
                matches!(HttpSink::endpoint_for(url), Err(SinkError::InvalidUrl { .. })),
                "{:?} should be rejected",
                url
            );
        }
    }

    #[test]
    fn test_payload_shape() {
        let result = ClassificationResult {
            label: Severity::Mild,
            confidence: 0.8,
            tier: DecisionTier::Heuristic,
            low_confidence: false,
            dominant_frequency: 2.34,
            amplitude: 12.5,
            produced_at_ms: 1_700_000_000_123,
            probabilities: None,
            features: FeatureVector::default(),
        };
        let payload = SinkPayload::from_result(&result, "ESP32_CLASSIFIER", "realtime_classification");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "deviceId": "ESP32_CLASSIFIER",
                "classification": "mild",
                "confidence": 0.8,
                "frequency": 2.34,
                "amplitude": 12.5,
                "timestamp": 1_700_000_000_123u64,
                "dataType": "realtime_classification",
            })
        );
    }
}
