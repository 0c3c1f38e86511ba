//! Relay worker genérico: fila durável → sink externo.
//!
//! Um worker por par (fila, sink), sem estado compartilhado entre eles.
//!
//! ```text
//! len ─► 0?  ──sim──► dorme idle
//!         │
//!        não ─► pop ─► decode ─► inválida? descarta
//!                                   │
//!                        filtro ─► transform ─► deliver
//!                                                 ├─ ok    → zera erros, throttle
//!                                                 └─ falha → erros+1, backoff linear
//!                                                            erros > máx → fatal
//! ```
//!
//! Falhas da própria fila (len/pop) têm um contador separado, zerado a cada
//! consulta bem sucedida; acima do mesmo limite o worker também encerra.
//!
//! Um item retirado da fila e não entregue é perdido; o supervisor externo
//! reinicia o processo após o erro fatal.

use crate::codec;
use crate::config::RelayConfig;
use crate::queue::{QueueError, QueueStore};
use crate::reading::Reading;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Erros de entrega de um sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Erro de transporte: {0}")]
    Transport(String),

    #[error("Sink recusou o payload (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Payload inválido: {0}")]
    Payload(String),
}

/// Erros que encerram o worker.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Sink {sink}: {errors} erros consecutivos de entrega, encerrando")]
    Fatal { sink: String, errors: u32 },

    #[error("Fila '{list}': {errors} erros consecutivos de acesso, encerrando")]
    QueueLost { list: String, errors: u32 },

    #[error("Fila indisponível na inicialização: {0}")]
    QueueUnavailable(#[from] QueueError),
}

/// Capacidades de um destino: filtro, transformação e entrega.
pub trait Sink {
    type Payload;

    /// Nome curto para logs.
    fn name(&self) -> &str;

    /// Leituras que este sink aceita. Padrão: todas.
    fn accepts(&self, _reading: &Reading) -> bool {
        true
    }

    /// Converte a leitura no formato do sink.
    fn transform(&self, reading: &Reading) -> Result<Self::Payload, SinkError>;

    /// Uma tentativa síncrona de entrega.
    fn deliver(&mut self, payload: &Self::Payload) -> Result<(), SinkError>;
}

/// Espera temporizada; substituível em testes.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Dorme a thread atual.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Tempos e limite de erros de um worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayPolicy {
    pub idle: Duration,
    pub backoff: Duration,
    pub throttle: Duration,
    pub max_consecutive_errors: u32,
}

impl RelayPolicy {
    pub fn from_config(relay: &RelayConfig, throttle_secs: f64) -> Self {
        Self {
            idle: Duration::from_secs_f64(relay.idle_secs),
            backoff: Duration::from_secs_f64(relay.backoff_secs),
            throttle: Duration::from_secs_f64(throttle_secs),
            max_consecutive_errors: relay.max_consecutive_errors,
        }
    }
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default(), 0.5)
    }
}

/// O que aconteceu numa iteração do worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Fila vazia.
    Idle,
    /// Fila inacessível nesta iteração.
    QueueError,
    /// Item inválido, fora do filtro ou não transformável.
    Skipped,
    Delivered,
    /// Entrega falhou; contador de erros consecutivos após a falha.
    Failed { consecutive: u32 },
}

/// Loop de polling de um par (fila, sink).
pub struct RelayWorker<Q: QueueStore, S: Sink, Z: Sleeper = ThreadSleeper> {
    queue: Q,
    sink: S,
    list: String,
    policy: RelayPolicy,
    sleeper: Z,
    consecutive_errors: u32,
    queue_errors: u32,
}

impl<Q: QueueStore, S: Sink> RelayWorker<Q, S> {
    pub fn new(queue: Q, sink: S, list: impl Into<String>, policy: RelayPolicy) -> Self {
        Self::with_sleeper(queue, sink, list, policy, ThreadSleeper)
    }
}

impl<Q: QueueStore, S: Sink, Z: Sleeper> RelayWorker<Q, S, Z> {
    pub fn with_sleeper(
        queue: Q,
        sink: S,
        list: impl Into<String>,
        policy: RelayPolicy,
        sleeper: Z,
    ) -> Self {
        Self {
            queue,
            sink,
            list: list.into(),
            policy,
            sleeper,
            consecutive_errors: 0,
            queue_errors: 0,
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Confere a fila e registra a profundidade inicial.
    pub fn start(&mut self) -> Result<usize, RelayError> {
        let depth = self.queue.len(&self.list)?;
        info!(
            "Sink {}: fila '{}' com {depth} mensagens para processar",
            self.sink.name(),
            self.list
        );
        Ok(depth)
    }

    /// Roda até o limite de erros consecutivos ser excedido.
    pub fn run(&mut self) -> Result<(), RelayError> {
        self.start()?;
        loop {
            self.step()?;
        }
    }

    /// Uma iteração: no máximo um item retirado e uma tentativa de entrega.
    pub fn step(&mut self) -> Result<Step, RelayError> {
        let depth = match self.queue.len(&self.list) {
            Ok(depth) => depth,
            Err(e) => return self.queue_error(e),
        };
        self.queue_errors = 0;

        // Sinal de visibilidade, não de controle
        if depth % 10 == 0 {
            info!("Fila '{}': {depth} mensagens para processar", self.list);
        }

        if depth == 0 {
            debug!("Fila '{}' vazia, aguardando", self.list);
            self.sleeper.sleep(self.policy.idle);
            return Ok(Step::Idle);
        }

        let text = match self.queue.pop(&self.list) {
            Ok(Some(text)) => text,
            Ok(None) => return Ok(Step::Idle),
            Err(e) => return self.queue_error(e),
        };

        let reading = codec::decode_json(&text);
        if !reading.is_valid() {
            // Já registrado do lado do produtor
            debug!("Item inválido descartado: {}", reading.errors().join(","));
            self.sleeper.sleep(self.policy.throttle);
            return Ok(Step::Skipped);
        }

        if !self.sink.accepts(&reading) {
            self.sleeper.sleep(self.policy.throttle);
            return Ok(Step::Skipped);
        }

        let payload = match self.sink.transform(&reading) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Sink {}: leitura não transformável: {e}", self.sink.name());
                self.sleeper.sleep(self.policy.throttle);
                return Ok(Step::Skipped);
            }
        };

        match self.sink.deliver(&payload) {
            Ok(()) => {
                self.consecutive_errors = 0;
                self.sleeper.sleep(self.policy.throttle);
                Ok(Step::Delivered)
            }
            Err(e) => {
                self.consecutive_errors += 1;
                error!(
                    "Sink {}: erro na entrega ({} consecutivos): {e}",
                    self.sink.name(),
                    self.consecutive_errors
                );

                if self.consecutive_errors > self.policy.max_consecutive_errors {
                    error!(
                        "Mais de {} erros de entrega. Encerrando",
                        self.policy.max_consecutive_errors
                    );
                    return Err(RelayError::Fatal {
                        sink: self.sink.name().to_string(),
                        errors: self.consecutive_errors,
                    });
                }

                self.sleeper.sleep(self.policy.backoff * self.consecutive_errors);
                Ok(Step::Failed {
                    consecutive: self.consecutive_errors,
                })
            }
        }
    }

    fn queue_error(&mut self, e: QueueError) -> Result<Step, RelayError> {
        self.queue_errors += 1;
        error!("{e} ({} consecutivos)", self.queue_errors);

        if self.queue_errors > self.policy.max_consecutive_errors {
            return Err(RelayError::QueueLost {
                list: self.list.clone(),
                errors: self.queue_errors,
            });
        }

        self.sleeper.sleep(self.policy.idle);
        Ok(Step::QueueError)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
