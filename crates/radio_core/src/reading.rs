//! Leitura decodificada – a única entidade de domínio do sistema.
//!
//! Os construtores (em [`crate::codec`]) nunca falham: campos que não puderam
//! ser interpretados ficam ausentes (`None`) e a decisão "a leitura é usável?"
//! acontece apenas em [`Reading::validate`].

use crate::measure;
use std::time::{SystemTime, UNIX_EPOCH};

/// Versão do formato de fio usada quando nenhuma é informada.
pub const DEFAULT_VERSION: u32 = 1;

/// Uma medida vinda de um dispositivo da rede de sensores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reading {
    timestamp: Option<f64>,
    device_id: Option<String>,
    measure_code: Option<&'static str>,
    measure_name: Option<&'static str>,
    measure_value: Option<f64>,
    cycle_number: Option<String>,
    version: Option<u32>,
    /// Motivo de falha estrutural (ex: linha truncada). Quando presente,
    /// é o único erro reportado pela validação.
    decode_failure: Option<&'static str>,
    validation_errors: Vec<String>,
}

impl Reading {
    /// Leitura vazia, sem nenhum campo definido.
    pub fn new() -> Self {
        Self::default()
    }

    /// Leitura que não pôde ser decodificada. Nenhum campo é preenchido.
    pub fn failed(reason: &'static str) -> Self {
        let mut reading = Self {
            decode_failure: Some(reason),
            ..Self::default()
        };
        reading.validate();
        reading
    }

    // ── Getters ──

    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn measure_code(&self) -> Option<&'static str> {
        self.measure_code
    }

    pub fn measure_name(&self) -> Option<&'static str> {
        self.measure_name
    }

    pub fn measure_value(&self) -> Option<f64> {
        self.measure_value
    }

    pub fn cycle_number(&self) -> Option<&str> {
        self.cycle_number.as_deref()
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    // ── Setters ──

    /// Define o timestamp; `None` carimba o horário atual.
    pub fn set_timestamp(&mut self, timestamp: Option<f64>) {
        self.timestamp = Some(timestamp.unwrap_or_else(now_timestamp));
    }

    pub fn set_device_id(&mut self, device_id: &str) {
        self.device_id = (!device_id.is_empty()).then(|| device_id.to_string());
    }

    /// Define o código de medida. Um código fora da tabela deixa o campo ausente.
    pub fn set_measure_code(&mut self, code: &str) {
        self.measure_code = measure::normalize_code(code);
    }

    /// Define o nome simbólico. Nomes desconhecidos, ou que não correspondem
    /// ao código já definido, deixam o campo ausente.
    pub fn set_measure_name(&mut self, name: &str) {
        self.measure_name = measure::code_by_name(name)
            .filter(|code| self.measure_code.is_none_or(|c| c == *code))
            .and_then(measure::name_by_code);
    }

    /// Deriva o nome simbólico a partir do código atual.
    pub fn derive_measure_name(&mut self) {
        self.measure_name = self.measure_code.and_then(measure::name_by_code);
    }

    pub fn set_measure_value(&mut self, value: f64) {
        self.measure_value = value.is_finite().then_some(value);
    }

    /// Interpreta um literal numérico. Entrada inválida deixa o valor ausente.
    pub fn set_measure_value_text(&mut self, text: &str) {
        self.measure_value = text.trim().parse::<f64>().ok().filter(|v| v.is_finite());
    }

    /// O número de ciclo é repassado como veio, apenas sem espaços nas pontas.
    pub fn set_cycle_number(&mut self, cycle: &str) {
        let cycle = cycle.trim();
        self.cycle_number = (!cycle.is_empty()).then(|| cycle.to_string());
    }

    pub fn set_version(&mut self, version: Option<u32>) {
        self.version = version;
    }

    // ── Validação ──

    /// Recalcula a lista de erros e retorna o veredito.
    ///
    /// Sempre parte de uma lista vazia, então chamadas repetidas sem
    /// mutação produzem exatamente os mesmos erros.
    pub fn validate(&mut self) -> bool {
        self.validation_errors.clear();

        if let Some(reason) = self.decode_failure {
            self.validation_errors.push(reason.to_string());
            return false;
        }

        let checks = [
            (self.timestamp.is_none(), "no timestamp"),
            (self.device_id.is_none(), "no device id"),
            (self.measure_name.is_none(), "no measure name"),
            (self.measure_value.is_none(), "no measure value"),
            (self.measure_code.is_none(), "no measure code"),
            (self.cycle_number.is_none(), "no cycle_number"),
            (self.version.is_none(), "no version"),
        ];
        for (missing, message) in checks {
            if missing {
                self.validation_errors.push(message.to_string());
            }
        }

        self.validation_errors.is_empty()
    }

    /// Erros calculados pela última chamada de [`Reading::validate`].
    pub fn errors(&self) -> &[String] {
        &self.validation_errors
    }

    /// Mesmo veredito de [`Reading::validate`], sem tocar na lista de erros.
    pub fn is_valid(&self) -> bool {
        self.decode_failure.is_none()
            && self.timestamp.is_some()
            && self.device_id.is_some()
            && self.measure_name.is_some()
            && self.measure_value.is_some()
            && self.measure_code.is_some()
            && self.cycle_number.is_some()
            && self.version.is_some()
    }
}

/// Segundos desde a época Unix, com fração.
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
