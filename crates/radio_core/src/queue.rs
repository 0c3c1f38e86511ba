//! Fila durável endereçada por nome de lista.
//!
//! O produtor empurra no fim da lista e os relays retiram do início, então
//! cada lista é FIFO. A durabilidade e a visibilidade entre processos são
//! do Redis; aqui existe apenas o handle.

use redis::Commands;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Erros da fila durável.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Fila inacessível: {0}")]
    Unavailable(String),

    #[error("Comando {op} na lista '{list}' falhou: {reason}")]
    Command {
        op: &'static str,
        list: String,
        reason: String,
    },
}

/// Operações mínimas que o pipeline e os relays usam.
pub trait QueueStore {
    fn push(&mut self, list: &str, text: &str) -> Result<(), QueueError>;
    fn pop(&mut self, list: &str) -> Result<Option<String>, QueueError>;
    fn len(&mut self, list: &str) -> Result<usize, QueueError>;
}

// ──────────────────────────────────────────────
// Redis
// ──────────────────────────────────────────────

/// Handle de listas Redis.
///
/// Uma conexão perdida (Redis reiniciado, socket quebrado) é descartada e o
/// próximo comando abre outra. O comando que falhou não é repetido, para não
/// duplicar um RPUSH que talvez tenha chegado ao servidor.
pub struct RedisQueue {
    client: redis::Client,
    conn: Option<redis::Connection>,
}

impl RedisQueue {
    /// Conecta em `url` (ex: `redis://127.0.0.1:6379/0`).
    pub fn connect(url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url).map_err(|e| QueueError::Unavailable(e.to_string()))?;
        let mut queue = Self { client, conn: None };
        queue.connection()?;
        info!("Conectado ao Redis em {url}");
        Ok(queue)
    }

    fn connection(&mut self) -> Result<&mut redis::Connection, QueueError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                let conn = self
                    .client
                    .get_connection()
                    .map_err(|e| QueueError::Unavailable(e.to_string()))?;
                debug!("Nova conexão com o Redis aberta");
                conn
            }
        };
        Ok(self.conn.insert(conn))
    }

    fn command<T>(
        &mut self,
        op: &'static str,
        list: &str,
        cmd: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T, QueueError> {
        let result = cmd(self.connection()?);
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if is_connection_loss(&e) {
                    warn!("Conexão com o Redis perdida ({e}), reconectando no próximo comando");
                    self.conn = None;
                }
                Err(command_error(op, list, e))
            }
        }
    }
}

fn is_connection_loss(e: &redis::RedisError) -> bool {
    e.is_connection_dropped() || e.is_io_error() || e.is_connection_refusal() || e.is_timeout()
}

fn command_error(op: &'static str, list: &str, e: redis::RedisError) -> QueueError {
    QueueError::Command {
        op,
        list: list.to_string(),
        reason: e.to_string(),
    }
}

impl QueueStore for RedisQueue {
    fn push(&mut self, list: &str, text: &str) -> Result<(), QueueError> {
        self.command("RPUSH", list, |conn| conn.rpush::<_, _, ()>(list, text))
    }

    fn pop(&mut self, list: &str) -> Result<Option<String>, QueueError> {
        self.command("LPOP", list, |conn| conn.lpop::<_, Option<String>>(list, None))
    }

    fn len(&mut self, list: &str) -> Result<usize, QueueError> {
        self.command("LLEN", list, |conn| conn.llen::<_, usize>(list))
    }
}

// ──────────────────────────────────────────────
// Memória
// ──────────────────────────────────────────────

/// Fila em memória, compartilhável entre threads por clone.
///
/// Útil para rodar o pipeline sem Redis (testes, replay local).
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    lists: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cópia do conteúdo atual de uma lista, do início ao fim.
    pub fn snapshot(&self, list: &str) -> Vec<String> {
        self.lists
            .lock()
            .map(|lists| lists.get(list).map(|q| q.iter().cloned().collect()).unwrap_or_default())
            .unwrap_or_default()
    }

    fn poisoned(op: &'static str, list: &str) -> QueueError {
        QueueError::Command {
            op,
            list: list.to_string(),
            reason: "mutex envenenado".into(),
        }
    }
}

impl QueueStore for MemoryQueue {
    fn push(&mut self, list: &str, text: &str) -> Result<(), QueueError> {
        let mut lists = self.lists.lock().map_err(|_| Self::poisoned("PUSH", list))?;
        lists.entry(list.to_string()).or_default().push_back(text.to_string());
        Ok(())
    }

    fn pop(&mut self, list: &str) -> Result<Option<String>, QueueError> {
        let mut lists = self.lists.lock().map_err(|_| Self::poisoned("POP", list))?;
        Ok(lists.get_mut(list).and_then(VecDeque::pop_front))
    }

    fn len(&mut self, list: &str) -> Result<usize, QueueError> {
        let lists = self.lists.lock().map_err(|_| Self::poisoned("LEN", list))?;
        Ok(lists.get(list).map_or(0, VecDeque::len))
    }
}
