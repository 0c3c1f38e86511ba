//! Sinks externos. Cada um implementa [`radio_core::Sink`].
//!
//! | Sink        | Filtro                   | Payload                          |
//! |-------------|--------------------------|----------------------------------|
//! | `graphite`  | todas                    | 2 métricas (valor + ciclo)       |
//! | `webhook`   | temperatura e umidade    | JSON canônico + `location_id`    |
//! | `pubsub`    | todas                    | JSON canônico em base64          |
//! | `warehouse` | todas                    | linha com `event_timestamp`      |

pub mod graphite;
pub mod pubsub;
pub mod warehouse;
pub mod webhook;

use radio_core::SinkError;
use reqwest::blocking::{Client, Response};
use std::time::Duration;

/// Timeout de cada chamada HTTP.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Cliente HTTP compartilhado pelos sinks.
pub fn http_client() -> Result<Client, SinkError> {
    let builder = Client::builder().timeout(HTTP_TIMEOUT);
    // Testes falam com 127.0.0.1; proxy do ambiente não pode interceptar
    #[cfg(test)]
    let builder = builder.no_proxy();
    builder.build().map_err(transport)
}

pub fn transport(e: reqwest::Error) -> SinkError {
    SinkError::Transport(e.to_string())
}

/// Converte status fora de 2xx em [`SinkError::Rejected`].
pub fn require_success(resp: Response) -> Result<Response, SinkError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body: resp.text().unwrap_or_default(),
        })
    }
}

/// Servidor HTTP de uma requisição só, para testar entregas.
#[cfg(test)]
pub(crate) mod fake_http {
    use std::io::Read;
    use std::thread::JoinHandle;
    use tiny_http::{Header, Response, Server};

    /// O que o servidor recebeu.
    #[derive(Debug)]
    pub struct Captured {
        pub method: String,
        pub url: String,
        pub headers: Vec<(String, String)>,
        pub body: String,
    }

    impl Captured {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(field, _)| field.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    /// Responde `status` com `body` à primeira requisição e devolve o que recebeu.
    pub fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<Captured>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();

        let handle = std::thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let mut received = String::new();
            request.as_reader().read_to_string(&mut received).unwrap();

            let captured = Captured {
                method: request.method().to_string(),
                url: request.url().to_string(),
                headers: request
                    .headers()
                    .iter()
                    .map(|h| (h.field.to_string(), h.value.to_string()))
                    .collect(),
                body: received,
            };

            let content_type =
                Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            request
                .respond(
                    Response::from_string(body)
                        .with_status_code(status)
                        .with_header(content_type),
                )
                .unwrap();
            captured
        });

        (format!("http://127.0.0.1:{port}"), handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_status_carries_body() {
        let (url, server) = fake_http::serve_once(503, "busy");
        let resp = http_client().unwrap().get(&url).send().unwrap();
        match require_success(resp) {
            Err(SinkError::Rejected { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("esperado Rejected, got {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn unreachable_host_is_transport_error() {
        // porta fechada: o listener é descartado antes da chamada
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let err = http_client()
            .unwrap()
            .get(format!("http://{addr}"))
            .send()
            .map_err(transport)
            .unwrap_err();
        assert!(matches!(err, SinkError::Transport(_)));
    }
}
