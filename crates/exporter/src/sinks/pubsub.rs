//! Sink de publish/subscribe (API REST de publicação em tópico).
//!
//! A mensagem publicada é o JSON canônico da leitura, em base64 no campo
//! `data`, como a API exige.

use super::{http_client, require_success, transport};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use radio_core::config::{PubSubConfig, require};
use radio_core::{Reading, Sink, SinkError, codec};
use reqwest::blocking::Client;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishRequest {
    pub messages: Vec<PubsubMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PubsubMessage {
    pub data: String,
}

pub struct PubSubSink {
    client: Client,
    publish_url: String,
    access_token: String,
}

impl PubSubSink {
    pub fn from_config(cfg: &PubSubConfig) -> Result<Self, SinkError> {
        Ok(Self {
            client: http_client()?,
            publish_url: publish_url(cfg),
            access_token: cfg.access_token.clone(),
        })
    }
}

/// `{endpoint}/v1/projects/{project}/topics/{topic}:publish`
pub fn publish_url(cfg: &PubSubConfig) -> String {
    format!(
        "{}/v1/projects/{}/topics/{}:publish",
        cfg.endpoint.trim_end_matches('/'),
        cfg.project,
        cfg.topic
    )
}

/// Campos obrigatórios da seção `[pubsub]`.
pub fn validate(cfg: &PubSubConfig) -> Vec<String> {
    let mut errors = Vec::new();
    require(&mut errors, "pubsub", "endpoint", &cfg.endpoint);
    require(&mut errors, "pubsub", "project", &cfg.project);
    require(&mut errors, "pubsub", "topic", &cfg.topic);
    require(&mut errors, "pubsub", "access_token", &cfg.access_token);
    errors
}

impl Sink for PubSubSink {
    type Payload = PublishRequest;

    fn name(&self) -> &str {
        "pubsub"
    }

    fn transform(&self, reading: &Reading) -> Result<PublishRequest, SinkError> {
        let encoded = codec::encode(reading).map_err(|e| SinkError::Payload(e.to_string()))?;
        Ok(PublishRequest {
            messages: vec![PubsubMessage {
                data: STANDARD.encode(encoded),
            }],
        })
    }

    fn deliver(&mut self, payload: &PublishRequest) -> Result<(), SinkError> {
        let resp = self
            .client
            .post(&self.publish_url)
            .bearer_auth(&self.access_token)
            .json(payload)
            .send()
            .map_err(transport)?;
        require_success(resp).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::fake_http;

    fn config(endpoint: String) -> PubSubConfig {
        PubSubConfig {
            endpoint,
            project: "playground".into(),
            topic: "iot-data".into(),
            access_token: "tok".into(),
            ..Default::default()
        }
    }

    #[test]
    fn publish_url_layout() {
        let cfg = config("https://pubsub.example/".into());
        assert_eq!(
            publish_url(&cfg),
            "https://pubsub.example/v1/projects/playground/topics/iot-data:publish"
        );
    }

    #[test]
    fn data_is_base64_of_canonical_json() {
        let s = PubSubSink::from_config(&config("http://unused".into())).unwrap();
        let mut reading = codec::decode_raw("0A1021|4");
        reading.set_timestamp(Some(1_700_000_000.25));
        let request = s.transform(&reading).unwrap();

        assert_eq!(request.messages.len(), 1);
        let raw = STANDARD.decode(&request.messages[0].data).unwrap();
        let decoded = codec::decode_json(std::str::from_utf8(&raw).unwrap());
        assert_eq!(decoded, reading);
    }

    #[test]
    fn posts_to_publish_endpoint() {
        let (url, server) = fake_http::serve_once(200, r#"{"messageIds":["1"]}"#);
        let mut s = PubSubSink::from_config(&config(url)).unwrap();
        let payload = s.transform(&codec::decode_raw("0A1021|4")).unwrap();
        s.deliver(&payload).unwrap();

        let request = server.join().unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "/v1/projects/playground/topics/iot-data:publish");
        assert_eq!(request.json()["messages"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn config_requires_project_and_token() {
        let errors = validate(&PubSubConfig::default());
        assert_eq!(
            errors,
            ["[pubsub] project é obrigatório", "[pubsub] access_token é obrigatório"]
        );
    }
}
