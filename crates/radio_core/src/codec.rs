//! Codec de mensagens.
//!
//! Quatro caminhos de construção convergem para a mesma [`Reading`]:
//!
//! | Entrada                  | Função                        |
//! |--------------------------|-------------------------------|
//! | Telegrama bruto (v1)     | [`decode_raw`]                |
//! | Registro chave→valor     | [`decode_record`]             |
//! | Literal do log legado    | [`decode_transport_string`]   |
//! | JSON canônico            | [`decode_json`]               |
//!
//! Formato do telegrama v1:
//!
//! ```text
//! ┌──────────┬─────────┬──────────────┬───┬───────────┐
//! │ Disp.(2) │ Cód.(1) │ Valor (N)    │ | │ Ciclo (M) │
//! └──────────┴─────────┴──────────────┴───┴───────────┘
//! ```
//!
//! Nenhuma decodificação falha com erro: o resultado sempre é uma leitura
//! já validada, com os motivos em [`Reading::errors`].

use crate::literal;
use crate::reading::{DEFAULT_VERSION, Reading};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use crate::measure::{code_by_name as lookup_code_by_name, name_by_code as lookup_name_by_code};

/// Delimitador entre valor e ciclo no formato v1.
pub const V1_DELIMITER: char = '|';
/// Marcador do formato v2 (sem layout definido).
pub const V2_MARKER: char = '!';

pub const RAW_FAILURE: &str = "cannot process raw data";
pub const JSON_FAILURE: &str = "cannot parse JSON";
pub const LITERAL_FAILURE: &str = "cannot parse record literal";

/// Erros de codificação.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Leitura incompleta, campo ausente: {0}")]
    MissingField(&'static str),

    #[error("Número de ciclo não é inteiro: {0:?}")]
    CycleNumber(String),

    #[error("Erro de serialização: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Versão do formato de fio detectada numa linha.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireVersion {
    V1,
    /// Reconhecida mas sem decodificação definida.
    V2,
    Unknown,
}

impl WireVersion {
    pub fn number(self) -> Option<u32> {
        match self {
            WireVersion::V1 => Some(1),
            WireVersion::V2 => Some(2),
            WireVersion::Unknown => None,
        }
    }

    /// Apenas o v1 tem layout conhecido.
    pub fn is_supported(self) -> bool {
        self == WireVersion::V1
    }
}

/// Heurística barata: `|` indica v1, `!` (sem `|`) indica v2.
pub fn detect_version(line: &str) -> WireVersion {
    if line.contains(V1_DELIMITER) {
        WireVersion::V1
    } else if line.contains(V2_MARKER) {
        WireVersion::V2
    } else {
        WireVersion::Unknown
    }
}

// ──────────────────────────────────────────────
// Decodificação
// ──────────────────────────────────────────────

/// Fatias posicionais de um telegrama v1.
struct RawFields<'a> {
    device_id: &'a str,
    code: &'a str,
    value: &'a str,
    cycle: &'a str,
}

fn split_raw(line: &str) -> Option<RawFields<'_>> {
    if !line.is_ascii() {
        return None;
    }
    let idx = line.find(V1_DELIMITER)?;
    if idx < 3 {
        return None;
    }
    Some(RawFields {
        device_id: &line[0..2],
        code: &line[2..3],
        value: &line[3..idx],
        cycle: &line[idx + 1..],
    })
}

/// Decodifica um telegrama v1 (`DDCVVV|CCC`).
///
/// O timestamp é o horário atual. Uma linha que não pode ser fatiada gera
/// uma leitura sem campos, com o único erro `"cannot process raw data"`.
pub fn decode_raw(line: &str) -> Reading {
    let Some(fields) = split_raw(line) else {
        return Reading::failed(RAW_FAILURE);
    };

    let mut reading = Reading::new();
    reading.set_version(WireVersion::V1.number());
    reading.set_timestamp(None);
    reading.set_device_id(fields.device_id);
    reading.set_measure_code(fields.code);
    reading.derive_measure_name();
    reading.set_measure_value_text(fields.value);
    reading.set_cycle_number(fields.cycle);
    reading.validate();
    reading
}

/// Constrói uma leitura a partir de um registro com tipagem frouxa.
///
/// Chaves: `timestamp?`, `device_id`, `measure_code`, `measure_value`,
/// `cycle_number`, `measure_name?`, `version?`. Sem `version` assume 1; sem
/// `timestamp` usa o horário atual; sem `measure_name` deriva do código.
/// Qualquer campo com problema apenas fica ausente.
pub fn decode_record(fields: &Map<String, Value>) -> Reading {
    let mut reading = Reading::new();

    match fields.get("version") {
        None | Some(Value::Null) => reading.set_version(Some(DEFAULT_VERSION)),
        Some(v) => reading.set_version(as_u32(v)),
    }

    match fields.get("timestamp") {
        None | Some(Value::Null) => reading.set_timestamp(None),
        Some(v) => {
            if let Some(ts) = as_f64(v) {
                reading.set_timestamp(Some(ts));
            }
        }
    }

    match fields.get("measure_value") {
        Some(Value::String(s)) => reading.set_measure_value_text(s),
        Some(v) => {
            if let Some(value) = as_f64(v) {
                reading.set_measure_value(value);
            }
        }
        None => {}
    }

    if let Some(code) = fields.get("measure_code").and_then(code_text) {
        reading.set_measure_code(&code);
    }

    match fields.get("measure_name") {
        Some(Value::String(name)) => reading.set_measure_name(name),
        _ => reading.derive_measure_name(),
    }

    if let Some(cycle) = fields.get("cycle_number").and_then(scalar_text) {
        reading.set_cycle_number(&cycle);
    }

    if let Some(Value::String(device_id)) = fields.get("device_id") {
        reading.set_device_id(device_id);
    }

    reading.validate();
    reading
}

/// Interpreta um registro literal do log legado e delega para [`decode_record`].
pub fn decode_transport_string(text: &str) -> Reading {
    match literal::parse_record(text) {
        Ok(record) => decode_record(&record),
        Err(e) => {
            tracing::debug!("Registro literal inválido: {e}");
            Reading::failed(LITERAL_FAILURE)
        }
    }
}

/// Interpreta JSON e delega para [`decode_record`].
///
/// Erro de sintaxe (ou JSON que não é objeto) gera uma leitura sem campos
/// com o único erro `"cannot parse JSON"`.
pub fn decode_json(text: &str) -> Reading {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(record)) => decode_record(&record),
        Ok(_) => Reading::failed(JSON_FAILURE),
        Err(e) => {
            tracing::debug!("JSON inválido: {e}");
            Reading::failed(JSON_FAILURE)
        }
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Código de medida como texto; inteiros viram o nibble hexadecimal.
fn code_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => n.as_u64().map(|v| format!("{v:x}")),
        _ => None,
    }
}

/// Strings e números passam como texto, sem reinterpretação.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ──────────────────────────────────────────────
// Codificação
// ──────────────────────────────────────────────

/// Representação canônica de transporte (JSON com sete campos).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportReading {
    pub timestamp: f64,
    pub device_id: String,
    pub measure_code: String,
    pub measure_value: f64,
    pub measure_name: String,
    pub cycle_number: i64,
    pub version: u32,
}

impl TryFrom<&Reading> for TransportReading {
    type Error = CodecError;

    fn try_from(reading: &Reading) -> Result<Self, Self::Error> {
        let cycle = reading
            .cycle_number()
            .ok_or(CodecError::MissingField("cycle_number"))?;
        Ok(Self {
            timestamp: reading
                .timestamp()
                .ok_or(CodecError::MissingField("timestamp"))?,
            device_id: reading
                .device_id()
                .ok_or(CodecError::MissingField("device_id"))?
                .to_string(),
            measure_code: reading
                .measure_code()
                .ok_or(CodecError::MissingField("measure_code"))?
                .to_string(),
            measure_value: reading
                .measure_value()
                .ok_or(CodecError::MissingField("measure_value"))?,
            measure_name: reading
                .measure_name()
                .ok_or(CodecError::MissingField("measure_name"))?
                .to_string(),
            cycle_number: cycle
                .parse()
                .map_err(|_| CodecError::CycleNumber(cycle.to_string()))?,
            version: reading.version().ok_or(CodecError::MissingField("version"))?,
        })
    }
}

/// Codifica a leitura no JSON canônico de transporte.
///
/// Falha se algum campo estiver ausente – nunca chame com leitura inválida.
/// O ciclo sai como inteiro, então `"007"` e `"+7"` voltam como `"7"`.
pub fn encode(reading: &Reading) -> Result<String, CodecError> {
    let transport = TransportReading::try_from(reading)?;
    Ok(serde_json::to_string(&transport)?)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn regression_telegram() {
        let r = decode_raw("0A1005|7");
        assert!(r.is_valid(), "erros: {:?}", r.errors());
        assert_eq!(r.device_id(), Some("0A"));
        assert_eq!(r.measure_code(), Some("1"));
        assert_eq!(r.measure_name(), Some("MSGC_TEMPERATURE"));
        assert_eq!(r.measure_value(), Some(5.0));
        assert_eq!(r.cycle_number(), Some("7"));
        assert_eq!(r.version(), Some(1));
        assert!(r.timestamp().is_some());
    }

    #[test]
    fn raw_trailing_whitespace_is_stripped() {
        let r = decode_raw("1F2-12.75|1234  \r\n");
        assert!(r.is_valid());
        assert_eq!(r.measure_name(), Some("MSGC_HUMIDITY"));
        assert_eq!(r.measure_value(), Some(-12.75));
        assert_eq!(r.cycle_number(), Some("1234"));
    }

    #[test]
    fn raw_unslicable_lines_fail_with_single_error() {
        for line in ["", "0A", "0A1005", "0A|7", "0Aé05|7"] {
            let r = decode_raw(line);
            assert_eq!(r.errors(), [RAW_FAILURE], "linha {line:?}");
            assert_eq!(r.device_id(), None);
        }
    }

    #[test]
    fn raw_bad_fields_are_absent() {
        let r = decode_raw("0A0xx|7");
        assert_eq!(r.errors(), ["no measure name", "no measure value", "no measure code"]);
        assert_eq!(r.device_id(), Some("0A"));

        let r = decode_raw("0A15|");
        assert_eq!(r.errors(), ["no cycle_number"]);
    }

    #[test]
    fn raw_roundtrips_through_json() {
        let mut raw = decode_raw("0Aa3.3|99");
        raw.set_timestamp(Some(1_700_000_000.25));
        let encoded = encode(&raw).unwrap();
        let decoded = decode_json(&encoded);
        assert!(decoded.is_valid());
        assert_eq!(raw, decoded);
    }

    #[test]
    fn encode_has_canonical_shape() {
        let r = decode_record(&record(json!({
            "timestamp": 1700000000.5,
            "device_id": "0A",
            "measure_code": "2",
            "measure_value": 55,
            "cycle_number": "12",
        })));
        let value: Value = serde_json::from_str(&encode(&r).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "timestamp": 1700000000.5,
                "device_id": "0A",
                "measure_code": "2",
                "measure_value": 55.0,
                "measure_name": "MSGC_HUMIDITY",
                "cycle_number": 12,
                "version": 1,
            })
        );
    }

    #[test]
    fn canonical_cycle_is_normalized_integer() {
        for (raw, cycle) in [("0A1005|007", "7"), ("0A1005|+7", "7"), ("0A1005|-0", "0")] {
            let r = decode_raw(raw);
            assert!(r.is_valid());
            let decoded = decode_json(&encode(&r).unwrap());
            assert_eq!(decoded.cycle_number(), Some(cycle), "telegrama {raw:?}");
            assert_eq!(decoded.measure_value(), r.measure_value());
        }
    }

    #[test]
    fn encode_refuses_incomplete_reading() {
        let r = decode_raw("garbage");
        assert!(matches!(encode(&r), Err(CodecError::MissingField(_))));

        let r = decode_raw("0A15|abc");
        assert!(r.is_valid());
        assert!(matches!(encode(&r), Err(CodecError::CycleNumber(_))));
    }

    #[test]
    fn record_defaults_version_and_timestamp() {
        let r = decode_record(&record(json!({
            "device_id": "0B",
            "measure_code": "3",
            "measure_value": "3.3",
            "cycle_number": 5,
        })));
        assert!(r.is_valid());
        assert_eq!(r.version(), Some(1));
        assert!(r.timestamp().unwrap() > 1_600_000_000.0);
        assert_eq!(r.measure_name(), Some("MSGC_BATTERY_VOLTAGE"));
        assert_eq!(r.cycle_number(), Some("5"));
    }

    #[test]
    fn missing_required_fields_report_only_themselves() {
        let full = json!({
            "timestamp": 1.0,
            "device_id": "0A",
            "measure_code": "1",
            "measure_value": 1.5,
            "cycle_number": "1",
        });
        let cases = [
            ("device_id", vec!["no device id"]),
            ("measure_code", vec!["no measure name", "no measure code"]),
            ("measure_value", vec!["no measure value"]),
            ("cycle_number", vec!["no cycle_number"]),
        ];
        for (key, expected) in cases {
            let mut fields = record(full.clone());
            fields.remove(key);
            let r = decode_record(&fields);
            assert!(!r.is_valid());
            assert_eq!(r.errors(), expected.as_slice(), "sem {key}");
        }
    }

    #[test]
    fn record_bad_literals_never_panic() {
        let r = decode_record(&record(json!({
            "timestamp": "yesterday",
            "device_id": 12,
            "measure_code": "0",
            "measure_value": "abc",
            "cycle_number": null,
            "version": "x",
        })));
        assert_eq!(
            r.errors(),
            [
                "no timestamp",
                "no device id",
                "no measure name",
                "no measure value",
                "no measure code",
                "no cycle_number",
                "no version",
            ]
        );
    }

    #[test]
    fn record_name_must_agree_with_code() {
        let mut fields = record(json!({
            "device_id": "0A",
            "measure_code": "1",
            "measure_value": 1,
            "cycle_number": "1",
            "measure_name": "MSGC_HUMIDITY",
        }));
        assert_eq!(decode_record(&fields).errors(), ["no measure name"]);

        fields.insert("measure_name".into(), json!("MSGC_TEMPERATURE"));
        assert!(decode_record(&fields).is_valid());
    }

    #[test]
    fn integer_code_becomes_hex_nibble() {
        let r = decode_record(&record(json!({
            "device_id": "0A",
            "measure_code": 10,
            "measure_value": 4.1,
            "cycle_number": "1",
        })));
        assert_eq!(r.measure_code(), Some("a"));
        assert_eq!(r.measure_name(), Some("MSGC_ACCU_VOLTAGE"));
    }

    #[test]
    fn json_syntax_error_has_single_error() {
        let r = decode_json("{\"device_id\": \"0A\",");
        assert_eq!(r.errors(), [JSON_FAILURE]);
        assert_eq!(r.device_id(), None);
        assert_eq!(decode_json("[1,2]").errors(), [JSON_FAILURE]);
    }

    #[test]
    fn transport_string_uses_record_rules() {
        let r = decode_transport_string(
            "{'timestamp': 1700000000.0, 'device_id': '0C', 'measure_code': '1', \
             'measure_value': '-3.5', 'measure_name': 'MSGC_TEMPERATURE', \
             'cycle_number': '8', 'version': 1}",
        );
        assert!(r.is_valid(), "erros: {:?}", r.errors());
        assert_eq!(r.measure_value(), Some(-3.5));

        assert_eq!(decode_transport_string("{'a': ").errors(), [LITERAL_FAILURE]);
    }

    #[test]
    fn deeply_nested_literal_is_a_decode_failure() {
        let text = format!("{{'a': {}", "[".repeat(200_000));
        let r = decode_transport_string(&text);
        assert_eq!(r.errors(), [LITERAL_FAILURE]);
        assert_eq!(r.device_id(), None);
    }

    #[test]
    fn version_detection() {
        assert_eq!(detect_version("0A1005|7"), WireVersion::V1);
        assert_eq!(detect_version("0A1005!7"), WireVersion::V2);
        assert_eq!(detect_version("0A1!05|7"), WireVersion::V1);
        assert_eq!(detect_version("0A10057"), WireVersion::Unknown);
        assert!(WireVersion::V1.is_supported());
        assert!(!WireVersion::V2.is_supported());
    }

    #[test]
    fn lookups_reexported() {
        assert_eq!(lookup_name_by_code("2"), Some("MSGC_HUMIDITY"));
        assert_eq!(lookup_code_by_name("MSGC_HUMIDITY"), Some("2"));
        assert_eq!(lookup_name_by_code("0"), None);
    }
}
