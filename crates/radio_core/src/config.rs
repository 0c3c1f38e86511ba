//! Configuração unificada via TOML.
//!
//! Um único `config.toml` serve o ingest e todos os exporters; cada processo
//! lê apenas as seções que usa.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Erros de configuração. Todos são fatais na inicialização.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao ler {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Erro ao parsear {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao salvar {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Configuração inválida: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Maior espera configurável do relay (idle e base do backoff), em segundos.
pub const MAX_WAIT_SECS: f64 = 3600.0;

/// Porta serial do gateway de rádio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Dispositivo no SO (ex: `/dev/ttyAMA0`, `COM3`)
    pub port: String,
    pub baud_rate: u32,
    /// Timeout de leitura; ao expirar o reader apenas volta a consultar
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyAMA0".into(),
            baud_rate: 460_800,
            read_timeout_ms: 1000,
        }
    }
}

/// Fila durável (Redis).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub url: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".into(),
        }
    }
}

/// Estágios de ingestão (reader + writer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Log local append-only, uma leitura JSON por linha
    pub log_file: PathBuf,
    /// Filas de relay que recebem cada leitura
    pub relay_lists: Vec<String>,
    /// Dispositivos descartados antes de persistir
    pub drop_list: Vec<String>,
    /// Flush do log a cada N escritas
    pub flush_every: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("radio_msg.log"),
            relay_lists: vec!["metrics_pubsub".into(), "metrics_graphite".into()],
            drop_list: crate::filter::DEFAULT_DROP_LIST
                .iter()
                .map(|d| d.to_string())
                .collect(),
            flush_every: 100,
        }
    }
}

/// Parâmetros comuns a todos os relay workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Espera quando a fila está vazia
    pub idle_secs: f64,
    /// Base do backoff linear (base × erros consecutivos)
    pub backoff_secs: f64,
    /// Acima disso o worker encerra com erro
    pub max_consecutive_errors: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_secs: 60.0,
            backoff_secs: 60.0,
            max_consecutive_errors: 10,
        }
    }
}

/// Endpoint de métricas (Graphite HTTP).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphiteConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub list: String,
    /// Prefixo das chaves de métrica (`{prefix}.{device}.{nome}`)
    pub prefix: String,
    /// Intervalo declarado de cada métrica (s)
    pub interval: u32,
    pub throttle_secs: f64,
}

impl Default for GraphiteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: String::new(),
            password: String::new(),
            list: "metrics_graphite".into(),
            prefix: "hiot".into(),
            interval: 60,
            throttle_secs: 1.0,
        }
    }
}

/// Web API genérica.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: String,
    /// Token Bearer
    pub auth: String,
    /// Identificador do local anexado a cada payload
    pub location_id: String,
    pub list: String,
    pub throttle_secs: f64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth: String::new(),
            location_id: String::new(),
            list: "metrics_webapi".into(),
            throttle_secs: 0.5,
        }
    }
}

/// Tópico Pub/Sub (API REST).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    pub endpoint: String,
    pub project: String,
    pub topic: String,
    pub access_token: String,
    pub list: String,
    pub throttle_secs: f64,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://pubsub.googleapis.com".into(),
            project: String::new(),
            topic: "iot-data".into(),
            access_token: String::new(),
            list: "metrics_pubsub".into(),
            throttle_secs: 0.05,
        }
    }
}

/// Tabela do data warehouse (inserção por streaming).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub endpoint: String,
    pub project: String,
    pub dataset: String,
    pub table: String,
    pub access_token: String,
    pub list: String,
    pub throttle_secs: f64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://bigquery.googleapis.com".into(),
            project: String::new(),
            dataset: "iot_data".into(),
            table: "iot_base_data".into(),
            access_token: String::new(),
            list: "metrics_warehouse".into(),
            throttle_secs: 0.5,
        }
    }
}

/// Configuração raiz do sistema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub queue: QueueConfig,
    pub ingest: IngestConfig,
    pub relay: RelayConfig,
    pub graphite: GraphiteConfig,
    pub webhook: WebhookConfig,
    pub pubsub: PubSubConfig,
    pub warehouse: WarehouseConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    ///
    /// Arquivo inexistente → configuração padrão. Arquivo presente mas
    /// ilegível ou malformado → erro.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("{} não existe, usando configuração padrão", path.display());
            return Ok(AppConfig::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str::<AppConfig>(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração carregada de {}", path.display());
        Ok(config)
    }

    /// Carrega e valida; qualquer problema vira [`ConfigError`].
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida as seções comuns e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.serial.baud_rate == 0 {
            errors.push("Baud rate da serial não pode ser 0".into());
        }
        if self.queue.url.is_empty() {
            errors.push("URL da fila não pode ser vazia".into());
        }
        if self.ingest.flush_every == 0 {
            errors.push("flush_every deve ser ≥ 1".into());
        }
        if self.ingest.relay_lists.iter().any(|l| l.trim().is_empty()) {
            errors.push("Nome de fila de relay vazio".into());
        }
        // Limites finitos: viram Duration, e o backoff ainda é multiplicado
        if !(self.relay.idle_secs > 0.0 && self.relay.idle_secs <= MAX_WAIT_SECS) {
            errors.push(format!(
                "idle_secs inválido: {} (0–{MAX_WAIT_SECS})",
                self.relay.idle_secs
            ));
        }
        if !(0.0..=MAX_WAIT_SECS).contains(&self.relay.backoff_secs) {
            errors.push(format!(
                "backoff_secs inválido: {} (0–{MAX_WAIT_SECS})",
                self.relay.backoff_secs
            ));
        }

        let sinks = [
            ("graphite", self.graphite.list.as_str(), self.graphite.throttle_secs),
            ("webhook", self.webhook.list.as_str(), self.webhook.throttle_secs),
            ("pubsub", self.pubsub.list.as_str(), self.pubsub.throttle_secs),
            ("warehouse", self.warehouse.list.as_str(), self.warehouse.throttle_secs),
        ];
        for (name, list, throttle) in sinks {
            if list.trim().is_empty() {
                errors.push(format!("Fila do sink {name} não pode ser vazia"));
            }
            if !(0.0..=60.0).contains(&throttle) {
                errors.push(format!("Throttle do sink {name} inválido: {throttle} (0–60)"));
            }
        }

        errors
    }
}

/// Exige que `value` esteja preenchido; usado pelos sinks na inicialização.
pub fn require(errors: &mut Vec<String>, section: &str, key: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(format!("[{section}] {key} é obrigatório"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.serial.baud_rate, parsed.serial.baud_rate);
        assert_eq!(config.ingest.relay_lists, parsed.ingest.relay_lists);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[ingest]
relay_lists = ["metrics_webapi"]
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.ingest.relay_lists, ["metrics_webapi"]);
        // Outros campos devem ter valor padrão
        assert_eq!(config.ingest.drop_list, ["99"]);
        assert_eq!(config.ingest.flush_every, 100);
        assert_eq!(config.relay.max_consecutive_errors, 10);
        assert_eq!(config.webhook.throttle_secs, 0.5);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.queue.url, "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[relay\nidle_secs = ").unwrap();
        assert!(matches!(
            AppConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ingest]\nflush_every = 0\n[relay]\nidle_secs = -1.0").unwrap();
        match AppConfig::load_validated(file.path()) {
            Err(ConfigError::Invalid(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("esperado Invalid, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_durations_are_invalid() {
        let config: AppConfig = toml::from_str(
            "[relay]\nidle_secs = inf\nbackoff_secs = nan\n[pubsub]\nthrottle_secs = inf",
        )
        .unwrap();
        let errors = config.validate();
        assert_eq!(errors.len(), 3, "Erros: {errors:?}");
        assert!(errors[0].starts_with("idle_secs inválido"));
        assert!(errors[1].starts_with("backoff_secs inválido"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = AppConfig::default();
        config.graphite.url = "https://graphite.example/metrics".into();
        config.save(&path).unwrap();
        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.graphite.url, config.graphite.url);
    }

    #[test]
    fn require_flags_blank_values() {
        let mut errors = Vec::new();
        require(&mut errors, "webhook", "url", " ");
        require(&mut errors, "webhook", "auth", "token");
        assert_eq!(errors, ["[webhook] url é obrigatório"]);
    }
}
