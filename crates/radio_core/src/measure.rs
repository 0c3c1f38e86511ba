//! Tabela de códigos de medida.
//!
//! Cada telegrama carrega um único nibble hexadecimal (`1`–`f`) que
//! identifica o tipo de medida. O código `0` é reservado e nunca aparece.

/// Código de fio → nome simbólico. Imutável durante toda a vida do processo.
pub const MEASURE_CODES: [(&str, &str); 15] = [
    ("1", "MSGC_TEMPERATURE"),
    ("2", "MSGC_HUMIDITY"),
    ("3", "MSGC_BATTERY_VOLTAGE"),
    ("4", "MSGC_TEMP_SENSOR_ERROR"),
    ("5", "MSGC_ALL_MESSAGES_SUCCESS"),
    ("6", "MSGC_ALL_SENDING_TRIALS"),
    ("7", "MSGC_AVG_CYCLE_LENGTH"),
    ("8", "MSGC_DELIVERY_RATIO"),
    ("9", "MSGC_RETRANSMISSIONS"),
    ("a", "MSGC_ACCU_VOLTAGE"),
    ("b", "MSGC_ID_1"),
    ("c", "MSGC_ID_2"),
    ("d", "MSGC_ID_3"),
    ("e", "MSGC_ID_4"),
    ("f", "MSGC_STARTUP_CODE"),
];

pub const TEMPERATURE: &str = "MSGC_TEMPERATURE";
pub const HUMIDITY: &str = "MSGC_HUMIDITY";

/// Normaliza um código vindo do fio ou de um registro (`"A"` → `"a"`).
///
/// Retorna `None` se não for um código conhecido.
pub fn normalize_code(code: &str) -> Option<&'static str> {
    let code = code.trim();
    MEASURE_CODES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(c, _)| *c)
}

/// Busca o nome simbólico de um código. `None` fora de `1`–`f`.
pub fn name_by_code(code: &str) -> Option<&'static str> {
    let code = normalize_code(code)?;
    MEASURE_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Busca o código de um nome simbólico. `None` para nomes desconhecidos.
pub fn code_by_name(name: &str) -> Option<&'static str> {
    MEASURE_CODES
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(code, _)| *code)
}
