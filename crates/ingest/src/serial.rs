//! Fonte de telegramas via UART do gateway de rádio.

use radio_core::config::SerialConfig;
use radio_core::pipeline::{LineSource, SourceError};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::time::Duration;
use tracing::{info, warn};

/// Um telegrama v1 tem poucas dezenas de bytes; acima disso é ruído sem `\n`.
const MAX_LINE_LEN: usize = 1024;

/// Abre a porta serial (8N1) e descarta o que estiver no buffer de entrada.
pub fn open_port(cfg: &SerialConfig) -> Result<Box<dyn serialport::SerialPort>, serialport::Error> {
    let mut port = serialport::new(&cfg.port, cfg.baud_rate)
        .timeout(Duration::from_millis(cfg.read_timeout_ms))
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .open()?;

    if let Err(e) = port.clear(serialport::ClearBuffer::Input) {
        warn!("Não foi possível limpar buffer da serial: {e}");
    }
    info!("Serial aberta em {} @ {} baud", cfg.port, cfg.baud_rate);
    Ok(port)
}

/// Linhas ASCII terminadas por `\n` vindas de qualquer leitor com timeout.
///
/// Bytes de uma linha incompleta ficam guardados entre chamadas, então um
/// timeout no meio do telegrama não perde dados.
pub struct SerialLines<R: Read> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    /// Descartando o resto de uma linha longa demais, até o próximo `\n`.
    discarding: bool,
}

impl<R: Read> SerialLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::with_capacity(64),
            discarding: false,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let bytes = std::mem::take(&mut self.pending);
        match String::from_utf8(bytes) {
            Ok(line) if line.is_ascii() => Some(line.trim().to_string()),
            Ok(line) => {
                warn!("Linha não ASCII descartada: {:?}", line.trim());
                None
            }
            Err(e) => {
                warn!("Linha com bytes inválidos descartada ({} bytes)", e.as_bytes().len());
                None
            }
        }
    }
}

impl<R: Read> LineSource for SerialLines<R> {
    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        let limit = (MAX_LINE_LEN + 1).saturating_sub(self.pending.len()) as u64;
        let read = (&mut self.reader).take(limit).read_until(b'\n', &mut self.pending);
        match read {
            Ok(_) if self.pending.ends_with(b"\n") => {
                if std::mem::take(&mut self.discarding) {
                    self.pending.clear();
                    return Ok(None);
                }
                Ok(self.take_line().filter(|l| !l.is_empty()))
            }
            Ok(_) if self.pending.len() > MAX_LINE_LEN => {
                if !self.discarding {
                    warn!("Linha sem terminador acima de {MAX_LINE_LEN} bytes descartada");
                }
                self.discarding = true;
                self.pending.clear();
                Ok(None)
            }
            Ok(_) => Ok(None),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                // Timeout normal, continua
                Ok(None)
            }
            Err(e) => Err(SourceError::Io(e)),
        }
    }
}

/// Fonte que reabre o dispositivo após um erro de I/O.
///
/// O handle com erro é descartado; a próxima leitura chama `open` de novo.
/// Se a reabertura falhar, o erro sobe para o reader, que espera e tenta outra vez.
pub struct ReopeningLines<R: Read, F> {
    open: F,
    lines: Option<SerialLines<R>>,
}

impl<R, F> ReopeningLines<R, F>
where
    R: Read,
    F: FnMut() -> Result<R, serialport::Error>,
{
    pub fn new(open: F) -> Self {
        Self { open, lines: None }
    }

    /// Abre o dispositivo agora; usado na inicialização, onde falhar é fatal.
    pub fn connect(&mut self) -> Result<(), serialport::Error> {
        if self.lines.is_none() {
            self.lines = Some(SerialLines::new((self.open)()?));
        }
        Ok(())
    }
}

impl<R, F> LineSource for ReopeningLines<R, F>
where
    R: Read,
    F: FnMut() -> Result<R, serialport::Error>,
{
    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        let mut lines = match self.lines.take() {
            Some(lines) => lines,
            None => {
                let reader = (self.open)().map_err(|e| SourceError::Io(e.into()))?;
                info!("Fonte serial reaberta");
                SerialLines::new(reader)
            }
        };

        let result = lines.next_line();
        match &result {
            Err(SourceError::Io(e)) => warn!("Descartando handle da serial após erro: {e}"),
            _ => self.lines = Some(lines),
        }
        result
    }
}
