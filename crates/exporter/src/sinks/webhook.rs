//! Sink de web API genérica. Só temperatura e umidade são enviadas.

use super::{http_client, require_success, transport};
use radio_core::codec::{CodecError, TransportReading};
use radio_core::config::{WebhookConfig, require};
use radio_core::measure::{HUMIDITY, TEMPERATURE};
use radio_core::{Reading, Sink, SinkError};
use reqwest::blocking::Client;
use serde::Serialize;

/// JSON canônico da leitura com o identificador do local.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    #[serde(flatten)]
    pub reading: TransportReading,
    pub location_id: String,
}

pub struct WebhookSink {
    client: Client,
    url: String,
    auth: String,
    location_id: String,
}

impl WebhookSink {
    pub fn from_config(cfg: &WebhookConfig) -> Result<Self, SinkError> {
        Ok(Self {
            client: http_client()?,
            url: cfg.url.clone(),
            auth: cfg.auth.clone(),
            location_id: cfg.location_id.clone(),
        })
    }
}

/// Campos obrigatórios da seção `[webhook]`.
pub fn validate(cfg: &WebhookConfig) -> Vec<String> {
    let mut errors = Vec::new();
    require(&mut errors, "webhook", "url", &cfg.url);
    require(&mut errors, "webhook", "auth", &cfg.auth);
    require(&mut errors, "webhook", "location_id", &cfg.location_id);
    errors
}

impl Sink for WebhookSink {
    type Payload = WebhookPayload;

    fn name(&self) -> &str {
        "webhook"
    }

    fn accepts(&self, reading: &Reading) -> bool {
        matches!(reading.measure_name(), Some(TEMPERATURE | HUMIDITY))
    }

    fn transform(&self, reading: &Reading) -> Result<WebhookPayload, SinkError> {
        let reading = TransportReading::try_from(reading)
            .map_err(|e: CodecError| SinkError::Payload(e.to_string()))?;
        Ok(WebhookPayload {
            reading,
            location_id: self.location_id.clone(),
        })
    }

    fn deliver(&mut self, payload: &WebhookPayload) -> Result<(), SinkError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.auth)
            .json(payload)
            .send()
            .map_err(transport)?;
        require_success(resp).map(|_| ())
    }
}
