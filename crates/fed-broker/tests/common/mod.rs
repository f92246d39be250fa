//! In-process HTTP stub for broker integration tests.

#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};

/// A request as seen by the stub.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub url: String,
    pub body: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
}

/// Canned reply: status, body, extra headers.
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(&'static str, String)>,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Serves every request through `handler` on a background thread.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> Reply + Send + 'static,
    {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind stub server");
        let port = server
            .server_addr()
            .to_ip()
            .map(|a| a.port())
            .expect("stub server port");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        std::thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let header = |name: &str| {
                    request
                        .headers()
                        .iter()
                        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
                        .map(|h| h.value.as_str().to_string())
                };
                let recorded = Recorded {
                    method: request.method().as_str().to_string(),
                    url: request.url().to_string(),
                    body,
                    authorization: header("Authorization"),
                    content_type: header("Content-Type"),
                };
                let reply = handler(&recorded);
                log.lock().unwrap().push(recorded);

                let headers = reply
                    .headers
                    .iter()
                    .map(|(name, value)| {
                        tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes())
                            .expect("valid header")
                    })
                    .collect();
                let body = reply.body.into_bytes();
                let length = body.len();
                let response = tiny_http::Response::new(
                    tiny_http::StatusCode(reply.status),
                    headers,
                    std::io::Cursor::new(body),
                    Some(length),
                    None,
                );
                let _ = request.respond(response);
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, url: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.url == url)
            .collect()
    }
}
