//! Prediction endpoint client.
//!
//! One request/response exchange per call against the remote glucose
//! prediction endpoint. Transport failures, non-2xx responses, and malformed
//! bodies all resolve to a typed `Outcome::Failed`; nothing here panics and
//! no retry logic lives at this layer.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::capture::EncodedFrame;

/// Classified result of one endpoint exchange.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Endpoint returned a usable glucose value.
    Predicted(f64),
    /// Endpoint explicitly signalled insufficient data; not an error.
    Pending(String),
    /// Transport failure, non-2xx response, or malformed payload.
    Failed(FailureKind),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Request could not be sent or received (includes timeouts).
    Network,
    /// Endpoint answered with a non-success status.
    Server(u16),
    /// Response body is missing the expected fields or is not JSON.
    MalformedResponse,
}

/// Single-attempt prediction exchange. Exactly one outbound request per call,
/// no caching, no retries.
pub trait PredictionEndpoint: Send {
    fn submit(&self, frame: &EncodedFrame) -> Outcome;
}

/// Configuration for the HTTP prediction endpoint.
#[derive(Clone, Debug)]
pub struct EndpointConfig {
    pub url: String,
    /// Overall per-request timeout. A hung request resolves to
    /// `Failed(Network)` instead of stalling the scheduler.
    pub timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000/predict".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct PredictResponse {
    glucose: Option<f64>,
    message: Option<String>,
}

/// HTTP prediction endpoint client.
pub struct HttpEndpoint {
    config: EndpointConfig,
    agent: ureq::Agent,
}

impl HttpEndpoint {
    pub fn new(config: EndpointConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { config, agent }
    }
}

impl PredictionEndpoint for HttpEndpoint {
    fn submit(&self, frame: &EncodedFrame) -> Outcome {
        let body = match serde_json::to_string(&PredictRequest {
            image: &image_payload(frame),
        }) {
            Ok(body) => body,
            Err(err) => {
                log::error!("failed to serialize prediction request: {}", err);
                return Outcome::Failed(FailureKind::MalformedResponse);
            }
        };

        let response = self
            .agent
            .post(&self.config.url)
            .set("Content-Type", "application/json")
            .send_string(&body);

        match response {
            Ok(response) => {
                let text = match response.into_string() {
                    Ok(text) => text,
                    Err(err) => {
                        log::warn!("failed to read prediction response: {}", err);
                        return Outcome::Failed(FailureKind::Network);
                    }
                };
                interpret_body(&text)
            }
            Err(ureq::Error::Status(code, _)) => {
                log::warn!("prediction endpoint returned status {}", code);
                Outcome::Failed(FailureKind::Server(code))
            }
            Err(err) => {
                log::warn!("prediction request failed: {}", err);
                Outcome::Failed(FailureKind::Network)
            }
        }
    }
}

/// Encode the frame as the data-URL string the endpoint expects.
fn image_payload(frame: &EncodedFrame) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        BASE64_STANDARD.encode(frame.as_bytes())
    )
}

/// Map a successful response body onto an `Outcome`.
///
/// Presence of `glucose` wins; a message-only body is the endpoint's explicit
/// "still collecting" signal; anything else is malformed.
fn interpret_body(text: &str) -> Outcome {
    let parsed: PredictResponse = match serde_json::from_str(text) {
        Ok(parsed) => parsed,
        Err(err) => {
            log::warn!("malformed prediction response: {}", err);
            return Outcome::Failed(FailureKind::MalformedResponse);
        }
    };
    match (parsed.glucose, parsed.message) {
        (Some(value), _) => Outcome::Predicted(value),
        (None, Some(message)) => Outcome::Pending(message),
        (None, None) => Outcome::Failed(FailureKind::MalformedResponse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glucose_field_wins() {
        assert_eq!(
            interpret_body(r#"{"glucose": 112.5}"#),
            Outcome::Predicted(112.5)
        );
        // Both fields present: glucose takes precedence.
        assert_eq!(
            interpret_body(r#"{"glucose": 98.0, "message": "warming up"}"#),
            Outcome::Predicted(98.0)
        );
    }

    #[test]
    fn message_only_is_pending() {
        assert_eq!(
            interpret_body(r#"{"message": "Collecting data..."}"#),
            Outcome::Pending("Collecting data...".to_string())
        );
    }

    #[test]
    fn missing_fields_are_malformed() {
        assert_eq!(
            interpret_body(r#"{}"#),
            Outcome::Failed(FailureKind::MalformedResponse)
        );
        assert_eq!(
            interpret_body("not json"),
            Outcome::Failed(FailureKind::MalformedResponse)
        );
    }

    #[test]
    fn image_payload_is_a_jpeg_data_url() {
        let frame = EncodedFrame::new(vec![0xFF, 0xD8, 0xFF, 0xD9]);
        let payload = image_payload(&frame);
        assert!(payload.starts_with("data:image/jpeg;base64,"));
        assert_eq!(payload, "data:image/jpeg;base64,/9j/2Q==");
    }
}
