//! Pipeline de ingestão: reader → fila em memória → writer.
//!
//! ```text
//! serial ─► reader ─► [unbounded FIFO] ─► writer ─┬─► log local (append)
//!                                                 └─► N filas de relay
//! ```
//!
//! O `recv` do writer é o único ponto de suspensão do pipeline. O log local
//! é escrito apenas pela thread do writer.

use crate::codec::{self, WireVersion};
use crate::filter;
use crate::queue::QueueStore;
use crate::reading::Reading;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::io::Write;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Espera após erro de I/O da fonte antes de consultar de novo.
const SOURCE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Erros da fonte de linhas.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A fonte não produzirá mais linhas (fim de arquivo, porta fechada).
    #[error("Fonte encerrada")]
    Closed,

    #[error("Erro de leitura: {0}")]
    Io(#[from] std::io::Error),
}

/// Erros que encerram o reader.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Writer encerrado, fila em memória sem consumidor")]
    WriterGone,
}

/// Fonte de telegramas terminados por linha.
pub trait LineSource {
    /// Próxima linha completa, ou `None` se nada chegou ainda.
    fn next_line(&mut self) -> Result<Option<String>, SourceError>;
}

/// Cria a fila em memória entre reader e writer.
pub fn channel() -> (Sender<Reading>, Receiver<Reading>) {
    unbounded()
}

// ──────────────────────────────────────────────
// Reader
// ──────────────────────────────────────────────

/// O que o reader fez com uma linha.
#[derive(Debug)]
pub enum LineOutcome {
    /// Leitura válida, pronta para a fila.
    Accepted(Reading),
    /// Sem delimitador de versão conhecido; ruído na linha.
    NoVersion,
    /// Versão detectada mas sem layout definido.
    Unsupported(WireVersion),
    /// Decodificada mas inválida.
    Invalid(Vec<String>),
}

/// Classifica e decodifica uma linha bruta.
pub fn process_line(line: &str) -> LineOutcome {
    let line = line.trim();
    match codec::detect_version(line) {
        WireVersion::Unknown => LineOutcome::NoVersion,
        version if !version.is_supported() => LineOutcome::Unsupported(version),
        _ => {
            let reading = codec::decode_raw(line);
            if reading.is_valid() {
                LineOutcome::Accepted(reading)
            } else {
                LineOutcome::Invalid(reading.errors().to_vec())
            }
        }
    }
}

/// Loop do reader. Retorna `Ok` quando a fonte se encerra.
///
/// Linhas ruins e erros de I/O são registrados e o loop continua.
pub fn run_reader<S: LineSource>(source: &mut S, tx: &Sender<Reading>) -> Result<(), PipelineError> {
    loop {
        let line = match source.next_line() {
            Ok(Some(line)) => line,
            Ok(None) => continue,
            Err(SourceError::Closed) => {
                info!("Fonte de telegramas encerrada");
                return Ok(());
            }
            Err(e) => {
                error!("{e}");
                std::thread::sleep(SOURCE_RETRY_DELAY);
                continue;
            }
        };

        info!("Telegrama recebido: {}", line.trim());

        match process_line(&line) {
            LineOutcome::Accepted(reading) => {
                debug!(
                    "Leitura enfileirada: {}:{}:{}",
                    reading.device_id().unwrap_or_default(),
                    reading.measure_code().unwrap_or_default(),
                    reading.cycle_number().unwrap_or_default()
                );
                tx.send(reading).map_err(|_| PipelineError::WriterGone)?;
            }
            LineOutcome::NoVersion => debug!("Linha sem versão detectável, ignorada"),
            LineOutcome::Unsupported(v) => {
                warn!("Formato {v:?} não suportado, telegrama descartado")
            }
            LineOutcome::Invalid(errors) => {
                warn!("Erro ao decodificar telegrama");
                debug!("Erros de validação: {}", errors.join(","));
            }
        }
    }
}

// ──────────────────────────────────────────────
// Writer
// ──────────────────────────────────────────────

/// Resultado do processamento de uma leitura pelo writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Dispositivo na lista de descarte.
    Dropped,
    /// Não foi possível codificar (leitura incompleta).
    Unencodable,
    /// Persistida; contagem de pushes bem e mal sucedidos.
    Stored {
        logged: bool,
        pushed: usize,
        failed: usize,
    },
}

/// Estágio writer: log local + fan-out para as filas de relay.
pub struct Writer<W: Write, Q: QueueStore> {
    log: W,
    queue: Q,
    relay_lists: Vec<String>,
    drop_list: Vec<String>,
    flush_every: usize,
    written: usize,
}

impl<W: Write, Q: QueueStore> Writer<W, Q> {
    pub fn new(log: W, queue: Q, relay_lists: Vec<String>, drop_list: Vec<String>) -> Self {
        Self {
            log,
            queue,
            relay_lists,
            drop_list,
            flush_every: 100,
            written: 0,
        }
    }

    /// Flush do log a cada `n` escritas bem sucedidas.
    pub fn with_flush_every(mut self, n: usize) -> Self {
        self.flush_every = n.max(1);
        self
    }

    /// Escritas bem sucedidas no log até agora.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Processa uma leitura vinda da fila em memória.
    pub fn handle(&mut self, reading: &Reading) -> WriteOutcome {
        let device_id = reading.device_id().unwrap_or_default();
        debug!(
            "Processando {}:{}:{}",
            device_id,
            reading.measure_code().unwrap_or_default(),
            reading.cycle_number().unwrap_or_default()
        );

        if filter::should_drop(device_id, &self.drop_list) {
            debug!("Dispositivo {device_id} na lista de descarte");
            return WriteOutcome::Dropped;
        }

        let encoded = match codec::encode(reading) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Leitura de {device_id} não codificável: {e}");
                return WriteOutcome::Unencodable;
            }
        };

        let logged = self.append_log(&encoded);

        let mut pushed = 0;
        let mut failed = 0;
        for list in &self.relay_lists {
            match self.queue.push(list, &encoded) {
                Ok(()) => pushed += 1,
                Err(e) => {
                    error!("Erro ao escrever na fila de relay: {e}");
                    failed += 1;
                }
            }
        }

        WriteOutcome::Stored {
            logged,
            pushed,
            failed,
        }
    }

    fn append_log(&mut self, encoded: &str) -> bool {
        if let Err(e) = writeln!(self.log, "{encoded}") {
            error!("Erro ao escrever no log local: {e}");
            return false;
        }
        self.written += 1;

        if self.written % self.flush_every == 0 {
            info!("Mensagens processadas: {}", self.written);
            if let Err(e) = self.log.flush() {
                error!("Erro ao fazer flush do log local: {e}");
            }
        }
        true
    }

    /// Consome a fila até todos os senders saírem; faz flush final.
    pub fn run(mut self, rx: &Receiver<Reading>) -> W {
        for reading in rx.iter() {
            self.handle(&reading);
        }
        if let Err(e) = self.log.flush() {
            error!("Erro ao fazer flush do log local: {e}");
        }
        info!("Writer encerrado após {} mensagens", self.written);
        self.log
    }
}

impl<W, Q> Writer<W, Q>
where
    W: Write + Send + 'static,
    Q: QueueStore + Send + 'static,
{
    /// Inicia o writer numa thread dedicada.
    pub fn spawn(self, rx: Receiver<Reading>) -> std::io::Result<JoinHandle<W>> {
        std::thread::Builder::new()
            .name("msg-writer".into())
            .spawn(move || self.run(&rx))
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
