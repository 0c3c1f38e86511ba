//! Lista de descarte por dispositivo.

/// Dispositivo descartado por padrão (nó de testes da rede).
pub const DEFAULT_DROP_LIST: [&str; 1] = ["99"];

/// `true` se leituras de `device_id` devem ser descartadas antes de
/// chegar ao log ou a qualquer fila de relay.
pub fn should_drop<S: AsRef<str>>(device_id: &str, denylist: &[S]) -> bool {
    denylist.iter().any(|d| d.as_ref() == device_id)
}
