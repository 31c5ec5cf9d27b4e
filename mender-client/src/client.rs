//! Streaming completion client with one level of fallback
//!
//! The primary backend is tried first. If it fails before any response bytes
//! arrive (connect error, timeout, non-success status) the same prompt goes to
//! the secondary backend in its own payload shape. Once a stream has started,
//! failures are terminal stream errors and never trigger a fallback.

use crate::backend::{BackendConfig, BackendRole};
use crate::decode::{Decoded, RecordDecoder};
use crate::error::{self, Error, Result};
use crate::stream::TokenStream;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::Arc;

/// Anything that can turn a prompt into a token stream.
#[allow(async_fn_in_trait)]
pub trait CompletionSource: Send + Sync {
    async fn request_completion(&self, prompt: &str) -> Result<TokenStream>;
}

/// HTTP client over a primary and a secondary backend.
pub struct StreamingClient {
    http: Client,
    api_key: String,
    primary: Arc<BackendConfig>,
    secondary: Arc<BackendConfig>,
}

impl StreamingClient {
    pub fn new(
        api_key: impl Into<String>,
        primary: BackendConfig,
        secondary: BackendConfig,
    ) -> Result<Self> {
        let http = Client::builder().build().map_err(|e| {
            Error::config_invalid(format!("failed to create HTTP client: {}", e))
                .with_operation("client::new")
                .set_source(e)
        })?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            primary: Arc::new(BackendConfig {
                role: BackendRole::Primary,
                ..primary
            }),
            secondary: Arc::new(BackendConfig {
                role: BackendRole::Secondary,
                ..secondary
            }),
        })
    }

    /// OpenAI chat completions as primary, legacy completions as secondary.
    pub fn openai(api_key: impl Into<String>) -> Result<Self> {
        Self::new(
            api_key,
            BackendConfig::openai_chat(),
            BackendConfig::openai_completion(),
        )
    }

    pub fn primary(&self) -> &BackendConfig {
        &self.primary
    }

    pub fn secondary(&self) -> &BackendConfig {
        &self.secondary
    }

    /// Request a completion, falling back to the secondary backend at most once.
    pub async fn request_completion(&self, prompt: &str) -> Result<TokenStream> {
        let primary_err = match self.open(&self.primary, prompt).await {
            Ok(tokens) => return Ok(tokens),
            Err(err) => err,
        };

        tracing::warn!(
            backend = BackendRole::Primary.as_str(),
            kind = primary_err.kind().as_str(),
            status = primary_err.status().as_str(),
            error = %primary_err.message(),
            "primary backend failed before streaming, switching to secondary"
        );

        match self.open(&self.secondary, prompt).await {
            Ok(tokens) => Ok(tokens),
            Err(secondary_err) => {
                tracing::error!(
                    backend = BackendRole::Secondary.as_str(),
                    kind = secondary_err.kind().as_str(),
                    error = %secondary_err.message(),
                    "secondary backend failed before streaming"
                );
                Err(error::backend_unavailable(&primary_err, secondary_err))
            }
        }
    }

    /// Send one request and hand back the decoded body once the status is known.
    async fn open(&self, backend: &BackendConfig, prompt: &str) -> Result<TokenStream> {
        let role = backend.role;
        let body = backend.build_request_body(prompt);

        let mut req = self
            .http
            .post(&backend.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(&self.api_key)
            .json(&body);

        if let Some(timeout) = backend.timeout {
            req = req.timeout(timeout);
        }

        let response = req
            .send()
            .await
            .map_err(|e| error::transport_failed(role, &backend.endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(error::backend_rejected(role, status.as_u16(), &text));
        }

        tracing::info!(backend = role.as_str(), endpoint = %backend.endpoint, "using backend");
        Ok(decode_body(role, response))
    }
}

impl CompletionSource for StreamingClient {
    async fn request_completion(&self, prompt: &str) -> Result<TokenStream> {
        StreamingClient::request_completion(self, prompt).await
    }
}

/// Turn a successful response body into a fragment stream.
fn decode_body(role: BackendRole, response: reqwest::Response) -> TokenStream {
    let stream = async_stream::stream! {
        let mut bytes = response.bytes_stream();
        let mut decoder = RecordDecoder::new();
        let mut fragments = 0usize;

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for decoded in decoder.feed(&chunk) {
                        if let Some(text) = fragment_of(role, decoded) {
                            fragments += 1;
                            yield Ok(text);
                        }
                    }
                }
                Err(e) => {
                    let err = error::stream_interrupted(role, e);
                    tracing::error!(
                        backend = role.as_str(),
                        fragments,
                        error = %err.message(),
                        "stream failed after it had started"
                    );
                    yield Err(err);
                    return;
                }
            }
        }

        for decoded in decoder.finish() {
            if let Some(text) = fragment_of(role, decoded) {
                fragments += 1;
                yield Ok(text);
            }
        }

        tracing::debug!(
            backend = role.as_str(),
            fragments,
            done = decoder.is_done(),
            "stream ended"
        );
    };

    TokenStream::new(role, stream)
}

fn fragment_of(role: BackendRole, decoded: Decoded) -> Option<String> {
    match decoded {
        Decoded::Fragment(text) => Some(text),
        Decoded::Malformed { record, reason } => {
            let err = error::decode_failed(role, &record, &reason);
            tracing::warn!(error = %err, "skipping undecodable stream record");
            None
        }
        Decoded::Done | Decoded::Empty => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const CHAT_PATH: &str = "/v1/chat/completions";
    const COMPLETION_PATH: &str = "/v1/completions";

    #[derive(Clone)]
    enum Reply {
        /// 200 with the given body chunks, written one at a time
        Stream(Vec<&'static str>),
        /// Non-success status
        Status(u16),
        /// 200 that promises more bytes than it sends, then hangs up
        Truncated(&'static str),
        /// Accept and never answer
        Silent,
    }

    struct Hit {
        path: String,
        headers: String,
        body: serde_json::Value,
    }

    struct FakeBackend {
        addr: SocketAddr,
        hits: Arc<Mutex<Vec<Hit>>>,
    }

    impl FakeBackend {
        async fn start(routes: Vec<(&'static str, Reply)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let hits = Arc::new(Mutex::new(Vec::new()));

            let server_hits = hits.clone();
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let hits = server_hits.clone();
                    let routes = routes.clone();
                    tokio::spawn(async move {
                        let Some(hit) = read_request(&mut socket).await else {
                            return;
                        };
                        let reply = routes
                            .iter()
                            .find(|(path, _)| *path == hit.path)
                            .map(|(_, reply)| reply.clone())
                            .unwrap_or(Reply::Status(404));
                        hits.lock().unwrap().push(hit);
                        write_reply(&mut socket, reply).await;
                    });
                }
            });

            Self { addr, hits }
        }

        fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        fn paths(&self) -> Vec<String> {
            self.hits.lock().unwrap().iter().map(|h| h.path.clone()).collect()
        }
    }

    async fn read_request(socket: &mut TcpStream) -> Option<Hit> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let path = headers.split_whitespace().nth(1)?.to_string();
        let body = serde_json::from_slice(&buf[header_end..]).unwrap_or_default();
        Some(Hit { path, headers, body })
    }

    async fn write_reply(socket: &mut TcpStream, reply: Reply) {
        match reply {
            Reply::Stream(chunks) => {
                let len: usize = chunks.iter().map(|c| c.len()).sum();
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    len
                );
                let _ = socket.write_all(head.as_bytes()).await;
                for chunk in chunks {
                    let _ = socket.write_all(chunk.as_bytes()).await;
                    let _ = socket.flush().await;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                let _ = socket.shutdown().await;
            }
            Reply::Status(code) => {
                let head = format!(
                    "HTTP/1.1 {} Failure\r\nContent-Length: 5\r\nConnection: close\r\n\r\nerror",
                    code
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
            Reply::Truncated(partial) => {
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    partial.len() + 1024
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(partial.as_bytes()).await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Reply::Silent => {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
        }
    }

    fn client_for(backend: &FakeBackend, primary_timeout: Duration) -> StreamingClient {
        StreamingClient::new(
            "test-key",
            BackendConfig::openai_chat()
                .with_endpoint(backend.url(CHAT_PATH))
                .with_timeout(primary_timeout),
            BackendConfig::openai_completion()
                .with_endpoint(backend.url(COMPLETION_PATH))
                .with_timeout(Duration::from_secs(5)),
        )
        .unwrap()
    }

    const CHAT_HI: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n";
    const CHAT_THERE: &str = "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n";
    const TEXT_HELLO: &str = "data: {\"choices\":[{\"text\":\"hello\"}]}\n\n";
    const DONE: &str = "data: [DONE]\n\n";

    #[tokio::test]
    async fn test_primary_serves_stream() {
        let backend = FakeBackend::start(vec![(
            CHAT_PATH,
            Reply::Stream(vec![CHAT_HI, CHAT_THERE, DONE]),
        )])
        .await;
        let client = client_for(&backend, Duration::from_secs(5));

        let tokens = client.request_completion("say hi").await.unwrap();
        assert_eq!(tokens.served_by(), BackendRole::Primary);
        assert_eq!(tokens.collect_text().await.unwrap(), "Hi there");

        let hits = backend.hits.lock().unwrap();
        assert_eq!(hits.len(), 1);
        let headers = hits[0].headers.to_ascii_lowercase();
        assert!(headers.contains("authorization: bearer test-key"));
        assert!(headers.contains("content-type: application/json"));
        assert_eq!(hits[0].body["messages"][0]["content"], "say hi");
        assert_eq!(hits[0].body["stop"], "{STOP}");
        assert_eq!(hits[0].body["stream"], true);
    }

    #[tokio::test]
    async fn test_falls_back_on_error_status() {
        let backend = FakeBackend::start(vec![
            (CHAT_PATH, Reply::Status(500)),
            (COMPLETION_PATH, Reply::Stream(vec![TEXT_HELLO, DONE])),
        ])
        .await;
        let client = client_for(&backend, Duration::from_secs(5));

        let tokens = client.request_completion("greet").await.unwrap();
        assert_eq!(tokens.served_by(), BackendRole::Secondary);
        assert_eq!(tokens.collect_text().await.unwrap(), "hello");

        assert_eq!(backend.paths(), vec![CHAT_PATH, COMPLETION_PATH]);
        let hits = backend.hits.lock().unwrap();
        assert_eq!(hits[1].body["prompt"], "greet");
        assert!(hits[1].body.get("messages").is_none());
    }

    #[tokio::test]
    async fn test_falls_back_on_connection_refused() {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = closed.local_addr().unwrap();
        drop(closed);

        let backend = FakeBackend::start(vec![(
            COMPLETION_PATH,
            Reply::Stream(vec![TEXT_HELLO, DONE]),
        )])
        .await;
        let client = StreamingClient::new(
            "test-key",
            BackendConfig::openai_chat().with_endpoint(format!("http://{}{}", dead_addr, CHAT_PATH)),
            BackendConfig::openai_completion().with_endpoint(backend.url(COMPLETION_PATH)),
        )
        .unwrap();

        let tokens = client.request_completion("greet").await.unwrap();
        assert_eq!(tokens.served_by(), BackendRole::Secondary);
        assert_eq!(tokens.collect_text().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_falls_back_on_primary_timeout() {
        let backend = FakeBackend::start(vec![
            (CHAT_PATH, Reply::Silent),
            (COMPLETION_PATH, Reply::Stream(vec![TEXT_HELLO, DONE])),
        ])
        .await;
        let client = client_for(&backend, Duration::from_millis(200));

        let tokens = client.request_completion("greet").await.unwrap();
        assert_eq!(tokens.served_by(), BackendRole::Secondary);
        assert_eq!(tokens.collect_text().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_no_second_fallback_when_both_fail() {
        let backend = FakeBackend::start(vec![
            (CHAT_PATH, Reply::Status(500)),
            (COMPLETION_PATH, Reply::Status(503)),
        ])
        .await;
        let client = client_for(&backend, Duration::from_secs(5));

        let err = client.request_completion("greet").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert_eq!(backend.paths(), vec![CHAT_PATH, COMPLETION_PATH]);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_is_terminal_without_fallback() {
        let backend = FakeBackend::start(vec![
            (CHAT_PATH, Reply::Truncated(CHAT_HI)),
            (COMPLETION_PATH, Reply::Stream(vec![TEXT_HELLO, DONE])),
        ])
        .await;
        let client = client_for(&backend, Duration::from_secs(5));

        let mut tokens = client.request_completion("greet").await.unwrap();
        assert_eq!(tokens.served_by(), BackendRole::Primary);

        assert_eq!(tokens.next().await.unwrap().unwrap(), "Hi");
        let err = tokens.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamInterrupted);
        assert!(tokens.next().await.is_none());

        assert_eq!(backend.paths(), vec![CHAT_PATH]);
    }

    #[tokio::test]
    async fn test_malformed_record_does_not_end_stream() {
        let backend = FakeBackend::start(vec![(
            CHAT_PATH,
            Reply::Stream(vec![CHAT_HI, "data: {broken\n\n", CHAT_THERE, DONE]),
        )])
        .await;
        let client = client_for(&backend, Duration::from_secs(5));

        let tokens = client.request_completion("greet").await.unwrap();
        assert_eq!(tokens.collect_text().await.unwrap(), "Hi there");
    }
}
