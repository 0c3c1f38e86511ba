//! # Radio Ingest
//!
//! Lê telegramas da UART do gateway de rádio, decodifica, grava no log
//! local e distribui cada leitura para as filas de relay no Redis.
//!
//! ## Uso
//! ```bash
//! radio_ingest                                   # Serial → log + filas
//! radio_ingest --config /etc/radio/config.toml   # Config explícita
//! radio_ingest replay --file dump.jsonl --list metrics_webapi
//! ```

mod replay;
mod serial;

use clap::{Parser, Subcommand};
use radio_core::config::{AppConfig, ConfigError};
use radio_core::pipeline::{self, PipelineError, Writer};
use radio_core::queue::{QueueError, RedisQueue};
use serial::ReopeningLines;
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Ingestão de telegramas da rede de sensores.
#[derive(Parser, Debug)]
#[command(name = "radio_ingest")]
#[command(version, about)]
struct Args {
    /// Caminho do config.toml (padrão: ao lado do executável)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lê a serial continuamente (padrão)
    Serial,
    /// Carrega um arquivo de leituras JSON numa fila de relay
    Replay {
        /// Arquivo com um JSON por linha
        #[arg(long)]
        file: PathBuf,
        /// Fila de destino (padrão: primeira de `ingest.relay_lists`)
        #[arg(long)]
        list: Option<String>,
    },
}

/// Erros fatais do processo.
#[derive(Debug, thiserror::Error)]
enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Falha ao abrir serial: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Erro de I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Nenhuma fila de destino para o replay")]
    NoReplayList,
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

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), IngestError> {
    // ── Carregar config ──
    let config_path = args.config.unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_validated(&config_path)?;

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    match args.command.unwrap_or(Command::Serial) {
        Command::Serial => run_serial(&config),
        Command::Replay { file, list } => {
            let list = list
                .or_else(|| config.ingest.relay_lists.first().cloned())
                .ok_or(IngestError::NoReplayList)?;
            let mut queue = RedisQueue::connect(&config.queue.url)?;
            let input = std::io::BufReader::new(std::fs::File::open(&file)?);
            info!("Replay de {} para '{list}'", file.display());
            replay::replay(input, &mut queue, &list)?;
            Ok(())
        }
    }
}

fn run_serial(config: &AppConfig) -> Result<(), IngestError> {
    let ingest = &config.ingest;

    // ── Fila durável ──
    info!("Conectando à fila durável");
    let queue = RedisQueue::connect(&config.queue.url)?;

    // ── Log local ──
    info!("Abrindo log local {}", ingest.log_file.display());
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&ingest.log_file)?;

    // ── Writer ──
    let (tx, rx) = pipeline::channel();
    let writer = Writer::new(
        BufWriter::new(log),
        queue,
        ingest.relay_lists.clone(),
        ingest.drop_list.clone(),
    )
    .with_flush_every(ingest.flush_every)
    .spawn(rx)?;

    // ── Serial ──
    let mut source = ReopeningLines::new(|| serial::open_port(&config.serial));
    source.connect()?;

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   📡 RADIO INGEST – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Serial:    {} @ {}", config.serial.port, config.serial.baud_rate);
    println!("  Log:       {}", ingest.log_file.display());
    println!("  Filas:     {}", ingest.relay_lists.join(", "));
    println!("  Descarte:  {}", ingest.drop_list.join(", "));
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    let result = pipeline::run_reader(&mut source, &tx);

    drop(tx);
    if writer.join().is_err() {
        error!("Thread do writer terminou com panic");
    }
    result.map_err(IngestError::from)
}
