//! Parser de registros literais do formato legado.
//!
//! O log de rádio antigo gravava cada leitura como um dicionário literal:
//!
//! ```text
//! {'timestamp': 1700000000.5, 'device_id': '0A', 'measure_code': '1', 'cycle_number': '7', 'version': 1}
//! ```
//!
//! Aceita strings com aspas simples ou duplas, números, `None`, `True`,
//! `False`, listas e dicionários aninhados. Nada é avaliado.

use serde_json::{Map, Number, Value};

/// Profundidade máxima de listas e dicionários aninhados (mesmo limite do serde_json).
const MAX_DEPTH: usize = 128;

/// Erro de sintaxe no literal.
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("Literal inválido na posição {pos}: {msg}")]
pub struct LiteralError {
    pub pos: usize,
    pub msg: &'static str,
}

/// Interpreta `text` como um dicionário literal.
pub fn parse_record(text: &str) -> Result<Map<String, Value>, LiteralError> {
    let mut parser = Parser {
        src: text.as_bytes(),
        pos: 0,
        depth: 0,
    };
    parser.skip_ws();
    let record = parser.dict()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(parser.error("conteúdo após o fim do registro"));
    }
    Ok(record)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn error(&self, msg: &'static str) -> LiteralError {
        LiteralError { pos: self.pos, msg }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8, msg: &'static str) -> Result<(), LiteralError> {
        self.skip_ws();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(msg))
        }
    }

    /// Entra num nível de aninhamento; falha acima de [`MAX_DEPTH`].
    fn descend(&mut self) -> Result<(), LiteralError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("aninhamento excessivo"));
        }
        self.depth += 1;
        Ok(())
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.skip_ws();
        match self.peek() {
            Some(b'{') => {
                self.descend()?;
                let dict = self.dict().map(Value::Object);
                self.depth -= 1;
                dict
            }
            Some(b'[') => {
                self.descend()?;
                let list = self.list();
                self.depth -= 1;
                list
            }
            Some(b'\'' | b'"') => self.string().map(Value::String),
            Some(b'-' | b'+' | b'.' | b'0'..=b'9') => self.number(),
            Some(b) if b.is_ascii_alphabetic() => self.keyword(),
            Some(_) => Err(self.error("valor inesperado")),
            None => Err(self.error("fim inesperado")),
        }
    }

    fn dict(&mut self) -> Result<Map<String, Value>, LiteralError> {
        self.expect(b'{', "esperado '{'")?;
        let mut map = Map::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(map);
        }
        loop {
            self.skip_ws();
            if !matches!(self.peek(), Some(b'\'' | b'"')) {
                return Err(self.error("chave deve ser string"));
            }
            let key = self.string()?;
            self.expect(b':', "esperado ':'")?;
            let value = self.value()?;
            map.insert(key, value);

            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    self.skip_ws();
                    // vírgula final é permitida
                    if self.peek() == Some(b'}') {
                        self.pos += 1;
                        return Ok(map);
                    }
                }
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(map);
                }
                _ => return Err(self.error("esperado ',' ou '}'")),
            }
        }
    }

    fn list(&mut self) -> Result<Value, LiteralError> {
        self.expect(b'[', "esperado '['")?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b']') {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {}
                _ => return Err(self.error("esperado ',' ou ']'")),
            }
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let Some(quote) = self.peek() else {
            return Err(self.error("fim inesperado"));
        };
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error("string não terminada")),
                Some(b) if b == quote => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = match self.peek() {
                        Some(b'n') => b'\n',
                        Some(b't') => b'\t',
                        Some(b'r') => b'\r',
                        Some(b'0') => 0,
                        Some(b @ (b'\\' | b'\'' | b'"')) => b,
                        _ => return Err(self.error("escape não suportado")),
                    };
                    out.push(escaped);
                    self.pos += 1;
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
        String::from_utf8(out).map_err(|_| self.error("string não é UTF-8"))
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E' | b'_'))
        {
            self.pos += 1;
        }
        let text: String = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| self.error("número inválido"))?
            .replace('_', "");
        let text = text.strip_prefix('+').unwrap_or(&text);

        if let Ok(int) = text.parse::<i64>() {
            return Ok(Value::Number(int.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| LiteralError { pos: start, msg: "número inválido" })
    }

    fn keyword(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        match &self.src[start..self.pos] {
            b"None" => Ok(Value::Null),
            b"True" => Ok(Value::Bool(true)),
            b"False" => Ok(Value::Bool(false)),
            _ => Err(LiteralError { pos: start, msg: "identificador não suportado" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_record() {
        let text = "{'timestamp': 1700000000.25, 'device_id': '0A', 'measure_code': '1', \
                    'measure_value': '21.5', 'measure_name': 'MSGC_TEMPERATURE', \
                    'cycle_number': '7', 'version': 1}";
        let record = parse_record(text).unwrap();
        assert_eq!(record["timestamp"], Value::from(1_700_000_000.25));
        assert_eq!(record["device_id"], "0A");
        assert_eq!(record["measure_value"], "21.5");
        assert_eq!(record["version"], 1);
    }

    #[test]
    fn keywords_and_nesting() {
        let record = parse_record(r#"{"a": None, 'b': True, 'c': [1, -2.5, 'x'], 'd': {}}"#).unwrap();
        assert_eq!(record["a"], Value::Null);
        assert_eq!(record["b"], Value::Bool(true));
        assert_eq!(record["c"], serde_json::json!([1, -2.5, "x"]));
        assert_eq!(record["d"], serde_json::json!({}));
    }

    #[test]
    fn escapes_in_strings() {
        let record = parse_record(r"{'k': 'it\'s'}").unwrap();
        assert_eq!(record["k"], "it's");
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{{'a': {}", "[".repeat(200_000));
        assert_eq!(parse_record(&deep).unwrap_err().msg, "aninhamento excessivo");

        let ok = format!("{{'a': {}{}}}", "[".repeat(100), "]".repeat(100));
        assert!(parse_record(&ok).is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_record("").is_err());
        assert!(parse_record("[1, 2]").is_err());
        assert!(parse_record("{'a': 1").is_err());
        assert!(parse_record("{'a': os.system('x')}").is_err());
        assert!(parse_record("{'a': 1} trailing").is_err());
        assert!(parse_record("{a: 1}").is_err());
    }
}
