//! # Radio Core
//!
//! Crate compartilhada pelo ingest e pelos exporters: codec dos telegramas
//! da rede de sensores, pipeline de ingestão, relay worker genérico e
//! configuração TOML.
//!
//! ## Módulos
//! - [`measure`] – Tabela de códigos de medida (nibble ↔ nome)
//! - [`reading`] – A leitura decodificada e sua validação
//! - [`codec`] – Decode (bruto, registro, literal, JSON) e encode canônico
//! - [`literal`] – Parser de registros literais do log legado
//! - [`filter`] – Lista de descarte por dispositivo
//! - [`queue`] – Fila durável (Redis) e fila em memória
//! - [`pipeline`] – Estágios reader e writer do ingest
//! - [`relay`] – Worker fila → sink com backoff e limite de erros
//! - [`config`] – Configuração unificada via TOML

pub mod measure;
pub mod reading;
pub mod codec;
pub mod literal;
pub mod filter;
pub mod queue;
pub mod pipeline;
pub mod relay;
pub mod config;

// Re-exports convenientes
pub use reading::Reading;
pub use codec::{decode_json, decode_raw, decode_record, decode_transport_string, encode};
pub use config::AppConfig;
pub use queue::{MemoryQueue, QueueStore, RedisQueue};
pub use relay::{RelayPolicy, RelayWorker, Sink, SinkError};
