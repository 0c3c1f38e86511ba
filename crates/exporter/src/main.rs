//! # Radio Exporter
//!
//! Drena uma fila de relay para um destino externo. Um processo por sink;
//! após erros de entrega consecutivos demais o processo sai com código de
//! erro e o supervisor (systemd, etc.) o reinicia.
//!
//! ## Uso
//! ```bash
//! radio_exporter graphite
//! radio_exporter --config /etc/radio/config.toml webhook
//! radio_exporter pubsub
//! radio_exporter warehouse
//! ```

mod sinks;

use clap::{Parser, ValueEnum};
use radio_core::config::{AppConfig, ConfigError};
use radio_core::relay::RelayError;
use radio_core::{RedisQueue, RelayPolicy, RelayWorker, Sink, SinkError};
use sinks::graphite::{self, GraphiteSink};
use sinks::pubsub::{self, PubSubSink};
use sinks::warehouse::{self, WarehouseSink};
use sinks::webhook::{self, WebhookSink};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Exporter de leituras da fila de relay para um sink externo.
#[derive(Parser, Debug)]
#[command(name = "radio_exporter")]
#[command(version, about)]
struct Args {
    /// Caminho do config.toml (padrão: ao lado do executável)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Destino a alimentar
    #[arg(value_enum)]
    sink: SinkKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    Graphite,
    Webhook,
    Pubsub,
    Warehouse,
}

/// Erros fatais do processo.
#[derive(Debug, thiserror::Error)]
enum ExportError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Falha ao preparar sink: {0}")]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Falha com [`ConfigError::Invalid`] se a seção do sink estiver incompleta.
fn check(errors: Vec<String>) -> Result<(), ConfigError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(errors))
    }
}

fn run(args: &Args) -> Result<(), ExportError> {
    // ── Carregar config ──
    let config_path = args.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_validated(&config_path)?;

    match args.sink {
        SinkKind::Graphite => {
            let cfg = &config.graphite;
            check(graphite::validate(cfg))?;
            relay(&config, GraphiteSink::from_config(cfg)?, &cfg.list, cfg.throttle_secs)
        }
        SinkKind::Webhook => {
            let cfg = &config.webhook;
            check(webhook::validate(cfg))?;
            relay(&config, WebhookSink::from_config(cfg)?, &cfg.list, cfg.throttle_secs)
        }
        SinkKind::Pubsub => {
            let cfg = &config.pubsub;
            check(pubsub::validate(cfg))?;
            relay(&config, PubSubSink::from_config(cfg)?, &cfg.list, cfg.throttle_secs)
        }
        SinkKind::Warehouse => {
            let cfg = &config.warehouse;
            check(warehouse::validate(cfg))?;
            relay(&config, WarehouseSink::from_config(cfg)?, &cfg.list, cfg.throttle_secs)
        }
    }
}

fn relay<S: Sink>(config: &AppConfig, sink: S, list: &str, throttle_secs: f64) -> Result<(), ExportError> {
    info!("Conectando à fila durável");
    let queue = RedisQueue::connect(&config.queue.url).map_err(RelayError::from)?;
    let policy = RelayPolicy::from_config(&config.relay, throttle_secs);

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   📤 RADIO EXPORTER – {}", sink.name().to_uppercase());
    println!("══════════════════════════════════════════════");
    println!("  Fila:      {list}");
    println!("  Throttle:  {:.2}s", policy.throttle.as_secs_f64());
    println!("  Backoff:   {:.0}s × erros", policy.backoff.as_secs_f64());
    println!("  Limite:    {} erros consecutivos", policy.max_consecutive_errors);
    println!("══════════════════════════════════════════════");
    println!();

    let mut worker = RelayWorker::new(queue, sink, list, policy);
    worker.run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sink_subcommand() {
        let args = Args::try_parse_from(["radio_exporter", "--config", "x.toml", "webhook"]).unwrap();
        assert_eq!(args.sink, SinkKind::Webhook);
        assert_eq!(args.config, Some(PathBuf::from("x.toml")));
        assert!(Args::try_parse_from(["radio_exporter", "smtp"]).is_err());
    }

    #[test]
    fn incomplete_sink_section_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[graphite]\nurl = \"http://127.0.0.1:1\"\n").unwrap();
        let args = Args {
            config: Some(path),
            sink: SinkKind::Graphite,
        };
        assert!(matches!(
            run(&args),
            Err(ExportError::Config(ConfigError::Invalid(errors))) if errors.len() == 2
        ));
    }
}
