//! Replay: carrega um arquivo de leituras JSON (uma por linha) numa fila de relay.
//!
//! Usado para reprocessar um log local ou um export manual. Linhas
//! inválidas são registradas e puladas.

use radio_core::codec;
use radio_core::queue::QueueStore;
use std::io::BufRead;
use tracing::{debug, error, info};

/// Contadores de uma execução de replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub pushed: usize,
    pub invalid: usize,
    pub failed: usize,
}

pub fn replay<R: BufRead, Q: QueueStore>(
    input: R,
    queue: &mut Q,
    list: &str,
) -> std::io::Result<ReplayStats> {
    let mut stats = ReplayStats::default();

    for line in input.lines() {
        let line = line?;
        let json = line.trim_end();
        if json.is_empty() {
            continue;
        }

        let reading = codec::decode_json(json);
        if !reading.is_valid() {
            error!("JSON não parseável: {json}");
            error!("Erros: {}", reading.errors().join(", "));
            stats.invalid += 1;
            continue;
        }

        let encoded = match codec::encode(&reading) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Leitura não codificável ({e}): {json}");
                stats.invalid += 1;
                continue;
            }
        };
        debug!("Mensagem para enviar: {encoded}");

        match queue.push(list, &encoded) {
            Ok(()) => stats.pushed += 1,
            Err(e) => {
                error!("{e}");
                stats.failed += 1;
            }
        }
    }

    info!(
        "Replay concluído em '{list}': {} enviadas, {} inválidas, {} falhas",
        stats.pushed, stats.invalid, stats.failed
    );
    Ok(stats)
}
