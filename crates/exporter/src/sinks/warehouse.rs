//! Sink de data warehouse (inserção de linhas por streaming).
//!
//! A linha é o JSON canônico com `timestamp` trocado por `event_timestamp`
//! em RFC 3339 (UTC), que é o tipo de coluna da tabela de destino.

use super::{http_client, require_success, transport};
use chrono::{DateTime, SecondsFormat};
use radio_core::codec::TransportReading;
use radio_core::config::{WarehouseConfig, require};
use radio_core::{Reading, Sink, SinkError};
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertAllRequest {
    pub rows: Vec<InsertRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertRow {
    pub json: Map<String, Value>,
}

pub struct WarehouseSink {
    client: Client,
    insert_url: String,
    access_token: String,
}

impl WarehouseSink {
    pub fn from_config(cfg: &WarehouseConfig) -> Result<Self, SinkError> {
        Ok(Self {
            client: http_client()?,
            insert_url: insert_url(cfg),
            access_token: cfg.access_token.clone(),
        })
    }
}

/// `{endpoint}/bigquery/v2/projects/{p}/datasets/{d}/tables/{t}/insertAll`
pub fn insert_url(cfg: &WarehouseConfig) -> String {
    format!(
        "{}/bigquery/v2/projects/{}/datasets/{}/tables/{}/insertAll",
        cfg.endpoint.trim_end_matches('/'),
        cfg.project,
        cfg.dataset,
        cfg.table
    )
}

/// Campos obrigatórios da seção `[warehouse]`.
pub fn validate(cfg: &WarehouseConfig) -> Vec<String> {
    let mut errors = Vec::new();
    require(&mut errors, "warehouse", "endpoint", &cfg.endpoint);
    require(&mut errors, "warehouse", "project", &cfg.project);
    require(&mut errors, "warehouse", "dataset", &cfg.dataset);
    require(&mut errors, "warehouse", "table", &cfg.table);
    require(&mut errors, "warehouse", "access_token", &cfg.access_token);
    errors
}

/// Converte a leitura numa linha da tabela.
pub fn prepare_row(reading: &Reading) -> Result<Map<String, Value>, SinkError> {
    let transport =
        TransportReading::try_from(reading).map_err(|e| SinkError::Payload(e.to_string()))?;

    let secs = transport.timestamp.floor();
    let nanos = ((transport.timestamp - secs) * 1e9).round().min(999_999_999.0) as u32;
    let event_timestamp = DateTime::from_timestamp(secs as i64, nanos)
        .ok_or_else(|| SinkError::Payload(format!("timestamp fora da faixa: {}", transport.timestamp)))?
        .to_rfc3339_opts(SecondsFormat::Micros, true);

    let Value::Object(mut row) =
        serde_json::to_value(&transport).map_err(|e| SinkError::Payload(e.to_string()))?
    else {
        return Err(SinkError::Payload("leitura não serializou como objeto".into()));
    };
    row.remove("timestamp");
    row.insert("event_timestamp".into(), Value::String(event_timestamp));
    Ok(row)
}

impl Sink for WarehouseSink {
    type Payload = InsertAllRequest;

    fn name(&self) -> &str {
        "warehouse"
    }

    fn transform(&self, reading: &Reading) -> Result<InsertAllRequest, SinkError> {
        Ok(InsertAllRequest {
            rows: vec![InsertRow {
                json: prepare_row(reading)?,
            }],
        })
    }

    fn deliver(&mut self, payload: &InsertAllRequest) -> Result<(), SinkError> {
        let resp = self
            .client
            .post(&self.insert_url)
            .bearer_auth(&self.access_token)
            .json(payload)
            .send()
            .map_err(transport)?;
        let resp = require_success(resp)?;

        // 200 com insertErrors = linha recusada
        let body: Value = resp.json().map_err(transport)?;
        match body.get("insertErrors") {
            Some(Value::Array(errors)) if !errors.is_empty() => Err(SinkError::Rejected {
                status: 200,
                body: body.to_string(),
            }),
            _ => Ok(()),
        }
    }
}
