//! Sink de métricas (Graphite HTTP ingest).
//!
//! Cada leitura vira duas métricas:
//! - `{prefix}.{device}.{measure_name}` com o valor medido
//! - `{prefix}.{device}.cycle_number` com o número de ciclo

use super::{http_client, transport};
use radio_core::config::{GraphiteConfig, require};
use radio_core::{Reading, Sink, SinkError};
use reqwest::blocking::Client;
use serde::Serialize;
use tracing::debug;

/// Um ponto no formato do endpoint de ingestão.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub metric: String,
    pub value: f64,
    pub interval: u32,
    pub time: i64,
    pub mtype: &'static str,
}

impl Metric {
    fn count(key: String, value: f64, time: i64, interval: u32) -> Self {
        Self {
            name: key.clone(),
            metric: key,
            value,
            interval,
            time,
            mtype: "count",
        }
    }
}

pub struct GraphiteSink {
    client: Client,
    url: String,
    credentials: String,
    prefix: String,
    interval: u32,
}

impl GraphiteSink {
    pub fn from_config(cfg: &GraphiteConfig) -> Result<Self, SinkError> {
        Ok(Self {
            client: http_client()?,
            url: cfg.url.clone(),
            credentials: format!("{}:{}", cfg.user, cfg.password),
            prefix: cfg.prefix.clone(),
            interval: cfg.interval,
        })
    }
}

/// Campos obrigatórios da seção `[graphite]`.
pub fn validate(cfg: &GraphiteConfig) -> Vec<String> {
    let mut errors = Vec::new();
    require(&mut errors, "graphite", "url", &cfg.url);
    require(&mut errors, "graphite", "user", &cfg.user);
    require(&mut errors, "graphite", "password", &cfg.password);
    if cfg.interval == 0 {
        errors.push("[graphite] interval deve ser ≥ 1".into());
    }
    errors
}

impl Sink for GraphiteSink {
    type Payload = Vec<Metric>;

    fn name(&self) -> &str {
        "graphite"
    }

    fn transform(&self, reading: &Reading) -> Result<Vec<Metric>, SinkError> {
        metrics(reading, &self.prefix, self.interval)
    }

    fn deliver(&mut self, payload: &Vec<Metric>) -> Result<(), SinkError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.credentials)
            .json(payload)
            .send()
            .map_err(transport)?;

        // Este endpoint responde 200 exato; 202 etc. indicam falha parcial
        if resp.status() != reqwest::StatusCode::OK {
            return Err(SinkError::Rejected {
                status: resp.status().as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Converte uma leitura válida nas duas métricas do Graphite.
pub fn metrics(reading: &Reading, prefix: &str, interval: u32) -> Result<Vec<Metric>, SinkError> {
    let missing = |field: &str| SinkError::Payload(format!("leitura sem {field}"));

    let device = reading.device_id().ok_or_else(|| missing("device_id"))?;
    let name = reading.measure_name().ok_or_else(|| missing("measure_name"))?;
    let value = reading.measure_value().ok_or_else(|| missing("measure_value"))?;
    let timestamp = reading.timestamp().ok_or_else(|| missing("timestamp"))?;
    let cycle = reading.cycle_number().ok_or_else(|| missing("cycle_number"))?;
    let cycle: f64 = cycle
        .parse()
        .map_err(|_| SinkError::Payload(format!("ciclo não numérico: {cycle:?}")))?;

    let time = timestamp.floor() as i64;
    let key = format!("{prefix}.{device}.{name}");
    debug!("Métrica: {key}:{value}");

    Ok(vec![
        Metric::count(key, value, time, interval),
        Metric::count(format!("{prefix}.{device}.cycle_number"), cycle, time, interval),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::fake_http;
    use radio_core::codec;
    use serde_json::json;

    fn reading() -> Reading {
        codec::decode_json(
            r#"{"timestamp": 1700000000.9, "device_id": "0A", "measure_code": "1",
                "measure_value": 21.5, "cycle_number": 42}"#,
        )
    }

    fn sink(url: String) -> GraphiteSink {
        GraphiteSink::from_config(&GraphiteConfig {
            url,
            user: "user".into(),
            password: "secret".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn two_metrics_per_reading() {
        let m = metrics(&reading(), "hiot", 60).unwrap();
        assert_eq!(
            serde_json::to_value(&m).unwrap(),
            json!([
                {
                    "name": "hiot.0A.MSGC_TEMPERATURE",
                    "metric": "hiot.0A.MSGC_TEMPERATURE",
                    "value": 21.5,
                    "interval": 60,
                    "time": 1700000000,
                    "mtype": "count",
                },
                {
                    "name": "hiot.0A.cycle_number",
                    "metric": "hiot.0A.cycle_number",
                    "value": 42.0,
                    "interval": 60,
                    "time": 1700000000,
                    "mtype": "count",
                },
            ])
        );
    }

    #[test]
    fn non_numeric_cycle_is_payload_error() {
        let r = codec::decode_raw("0A1005|x1");
        assert!(matches!(metrics(&r, "hiot", 60), Err(SinkError::Payload(_))));
    }

    #[test]
    fn delivers_with_bearer_credentials() {
        let (url, server) = fake_http::serve_once(200, "{}");
        let mut s = sink(url);
        let payload = s.transform(&reading()).unwrap();
        s.deliver(&payload).unwrap();

        let request = server.join().unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "/");
        assert_eq!(request.header("Authorization"), Some("Bearer user:secret"));
        assert_eq!(request.json().as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn non_200_is_failure() {
        let (url, server) = fake_http::serve_once(202, "partial");
        let mut s = sink(url);
        let payload = s.transform(&reading()).unwrap();
        assert!(matches!(
            s.deliver(&payload),
            Err(SinkError::Rejected { status: 202, .. })
        ));
        server.join().unwrap();
    }

    #[test]
    fn config_requires_credentials() {
        let errors = validate(&GraphiteConfig::default());
        assert_eq!(errors.len(), 3);
    }
}
