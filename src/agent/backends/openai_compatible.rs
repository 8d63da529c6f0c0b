//! OpenAI-compatible chat completion backend (`/v1/chat/completions`).
//!
//! Exposes two methods:
//! - `run_async`: a streamed completion (`"stream": true`). Server-sent
//!   deltas are accumulated per choice and handed out as one `ChatMessage`
//!   event when the choice finishes, so the event stream carries whole
//!   messages rather than token fragments.
//! - `generate`: one round-trip, returning a `ChatCompletion` object whose
//!   `content` attribute holds the reply.
//!
//! All wire types are private to this module. The backend is stateless:
//! every call is a fresh single-turn conversation.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::agent::{Argument, CallError, Method, Object, Outcome, Value};
use crate::config::OpenAiConfig;

use super::BackendError;

/// Buffered events between the HTTP reader task and the drain.
const EVENT_BUFFER: usize = 16;

// ── Public backend ────────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Covers OpenAI, OpenAI-compatible local servers (Ollama, LM Studio…) and
/// hosted alternatives such as Gemini's compatibility endpoint. Cheap to
/// clone: `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleAgent {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    stream: bool,
    /// Deadline for a non-streamed completion, body included.
    request_timeout: Duration,
    instruction: Option<String>,
    api_key: Option<String>,
}

impl OpenAiCompatibleAgent {
    /// `api_key` is `None` for keyless local models. When present it is sent
    /// as `Authorization: Bearer <key>` on every request.
    pub fn new(
        config: &OpenAiConfig,
        instruction: Option<String>,
        api_key: Option<String>,
    ) -> Result<Self, BackendError> {
        let request_timeout = Duration::from_secs(config.timeout_seconds);
        // No whole-request deadline on the client: a streamed body may take
        // longer than any single round-trip. The adapter bounds the request.
        let client = Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| BackendError::Setup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            stream: config.stream,
            request_timeout,
            instruction,
            api_key,
        })
    }

    pub fn methods(&self) -> Vec<Method> {
        if self.stream {
            vec![Method::RunAsync, Method::Generate]
        } else {
            vec![Method::Generate]
        }
    }

    pub async fn call(&self, method: &Method, arg: Argument) -> Result<Outcome, CallError> {
        let Some(text) = arg.text() else {
            return Err(CallError::Shape(format!("{method} needs the user text")));
        };
        match method {
            Method::RunAsync if self.stream => self.stream_completion(text).await.map(Outcome::Events),
            Method::Generate => self.complete(text).await.map(Outcome::Ready),
            m => Err(CallError::Unsupported(m.to_string())),
        }
    }

    fn request(&self, content: &str, stream: bool) -> ChatCompletionRequest {
        // Some models (gpt-5 family) do not accept a temperature parameter.
        let temperature = if self.model.starts_with("gpt-5") {
            None
        } else {
            Some(self.temperature)
        };

        let mut messages = Vec::new();
        if let Some(sys) = &self.instruction {
            messages.push(Message { role: "system".to_string(), content: sys.clone() });
        }
        messages.push(Message { role: "user".to_string(), content: content.to_string() });

        ChatCompletionRequest { model: self.model.clone(), messages, temperature, stream }
    }

    async fn send(&self, payload: &ChatCompletionRequest) -> Result<reqwest::Response, CallError> {
        debug!(
            model = %payload.model,
            temperature = ?payload.temperature,
            stream = payload.stream,
            "sending chat completion request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full chat completion payload");
        }

        let mut req = self.client.post(&self.api_base_url).json(payload);
        if !payload.stream {
            req = req.timeout(self.request_timeout);
        }
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "chat completion request failed (transport)");
            CallError::Failed(e.to_string())
        })?;

        check_status(response).await
    }

    /// One round-trip; the reply comes back as a `ChatCompletion` object.
    async fn complete(&self, content: &str) -> Result<Value, CallError> {
        let response = self.send(&self.request(content, false)).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize chat completion");
            CallError::Failed(format!("failed to parse response body: {e}"))
        })?;

        debug!(choices = parsed.choices.len(), "received chat completion");

        let choice = parsed.choices.into_iter().next();
        let finish_reason = choice.as_ref().and_then(|c| c.finish_reason.clone());
        let content = choice.and_then(|c| c.message.content).map(|s| s.trim().to_string());

        Ok(Object::new("ChatCompletion")
            .with("content", content)
            .with("model", parsed.model.unwrap_or_else(|| self.model.clone()))
            .with("finish_reason", finish_reason)
            .into())
    }

    /// Start a streamed completion. HTTP-level failures surface here; read
    /// failures after the stream started arrive as an `Err` event.
    async fn stream_completion(&self, content: &str) -> Result<mpsc::Receiver<Result<Value, CallError>>, CallError> {
        let response = self.send(&self.request(content, true)).await?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(pump_events(response, tx));
        Ok(rx)
    }
}

// ── Streaming ─────────────────────────────────────────────────────────────────

/// One parsed server-sent-event line.
#[derive(Debug, PartialEq)]
enum SseLine {
    /// Comment, blank line, or a non-`data` field.
    Skip,
    /// A chunk: optional content delta, and whether the choice finished.
    Chunk { delta: Option<String>, finished: bool },
    /// The `[DONE]` sentinel.
    Done,
    /// An error object or an unparseable payload.
    Invalid(String),
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return SseLine::Skip;
    }
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(StreamChunk { error: Some(err), .. }) => SseLine::Invalid(err.message),
        Ok(chunk) => {
            let Some(choice) = chunk.choices.into_iter().next() else {
                return SseLine::Chunk { delta: None, finished: false };
            };
            SseLine::Chunk {
                delta: choice.delta.content.filter(|s| !s.is_empty()),
                finished: choice.finish_reason.is_some(),
            }
        }
        Err(e) => SseLine::Invalid(format!("unparseable stream chunk: {e}")),
    }
}

/// Read the SSE body and forward whole messages to `tx`.
async fn pump_events(mut response: reqwest::Response, tx: mpsc::Sender<Result<Value, CallError>>) {
    let mut buf: Vec<u8> = Vec::new();
    let mut pending = String::new();

    loop {
        let bytes = match response.chunk().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break,
            Err(e) => {
                flush(&mut pending, &tx).await;
                let _ = tx.send(Err(CallError::Failed(format!("stream read failed: {e}")))).await;
                return;
            }
        };
        buf.extend_from_slice(&bytes);

        while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            match parse_sse_line(line.trim_end()) {
                SseLine::Skip => {}
                SseLine::Chunk { delta, finished } => {
                    if let Some(d) = delta {
                        pending.push_str(&d);
                    }
                    if finished && !flush(&mut pending, &tx).await {
                        return;
                    }
                }
                SseLine::Done => {
                    flush(&mut pending, &tx).await;
                    return;
                }
                SseLine::Invalid(message) => {
                    flush(&mut pending, &tx).await;
                    let _ = tx.send(Err(CallError::Failed(message))).await;
                    return;
                }
            }
        }
    }

    flush(&mut pending, &tx).await;
}

/// Emit the accumulated message, if any. Returns `false` once the receiver
/// has gone away.
async fn flush(pending: &mut String, tx: &mpsc::Sender<Result<Value, CallError>>) -> bool {
    if pending.is_empty() {
        return true;
    }
    let text = std::mem::take(pending);
    trace!(len = text.len(), "streamed message complete");
    tx.send(Ok(Object::new("ChatMessage").with("text", text).into())).await.is_ok()
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    /// Some servers report failures in-band once the stream has started.
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Return the response if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = env.error.code.map(|v| match v {
            serde_json::Value::String(s) => format!(" [code={s}]"),
            other => format!(" [code={other}]"),
        }).unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    };

    error!(%status, %message, "chat completion returned HTTP error");
    Err(CallError::Failed(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use crate::adapter::drain;

    fn agent(stream: bool, model: &str) -> OpenAiCompatibleAgent {
        let config = OpenAiConfig {
            api_base_url: "http://localhost:0/v1/chat/completions".into(),
            model: model.into(),
            temperature: 0.2,
            timeout_seconds: 1,
            stream,
        };
        OpenAiCompatibleAgent::new(&config, Some("Be brief.".into()), None).unwrap()
    }

    #[test]
    fn methods_follow_stream_flag() {
        assert_eq!(agent(true, "m").methods(), [Method::RunAsync, Method::Generate]);
        assert_eq!(agent(false, "m").methods(), [Method::Generate]);
    }

    #[test]
    fn request_carries_instruction_and_user_text() {
        let req = agent(false, "gpt-4o-mini").request("hola", false);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "Be brief.");
        assert_eq!(json["messages"][1]["content"], "hola");
        assert!(json.get("stream").is_none());
        assert!(json.get("temperature").is_some());
    }

    #[test]
    fn gpt5_omits_temperature_and_stream_flag_serialized() {
        let req = agent(true, "gpt-5-mini").request("x", true);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["stream"], true);
    }

    #[tokio::test]
    async fn empty_argument_is_shape_error() {
        let err = agent(true, "m").call(&Method::RunAsync, Argument::Empty).await.unwrap_err();
        assert!(err.is_shape());
    }

    #[tokio::test]
    async fn undeclared_method_is_unsupported() {
        let err = agent(false, "m").call(&Method::RunAsync, Argument::Text("x".into())).await.unwrap_err();
        assert_eq!(err, CallError::Unsupported("run_async".into()));
    }

    #[test]
    fn sse_delta_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Chunk { delta: Some("Hel".into()), finished: false });
    }

    #[test]
    fn sse_finish_line() {
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Chunk { delta: None, finished: true });
    }

    #[test]
    fn sse_done_and_skips() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(parse_sse_line("event: message"), SseLine::Skip);
    }

    #[test]
    fn sse_error_envelope() {
        let line = r#"data: {"error":{"message":"rate limited"}}"#;
        assert_eq!(parse_sse_line(line), SseLine::Invalid("rate limited".into()));
    }

    #[test]
    fn sse_garbage_is_invalid() {
        assert!(matches!(parse_sse_line("data: {not json"), SseLine::Invalid(_)));
    }

    // ── Streaming over a local socket ─────────────────────────────────────────

    fn delta(text: &str) -> Vec<u8> {
        let chunk = serde_json::json!({"choices": [{"delta": {"content": text}, "finish_reason": null}]});
        format!("data: {chunk}\n\n").into_bytes()
    }

    fn finished() -> Vec<u8> {
        b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n".to_vec()
    }

    /// Read one request, headers and body, off `socket`.
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        loop {
            let n = socket.read(&mut tmp).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&tmp[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    return;
                }
            }
        }
    }

    /// Answer one request with a chunked SSE body, one HTTP chunk per piece,
    /// pausing between pieces. Without `complete` the connection is dropped
    /// mid-body.
    async fn serve(pieces: Vec<Vec<u8>>, pause: Duration, complete: bool) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n")
                .await
                .unwrap();
            for piece in pieces {
                socket.write_all(format!("{:x}\r\n", piece.len()).as_bytes()).await.unwrap();
                socket.write_all(&piece).await.unwrap();
                socket.write_all(b"\r\n").await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(pause).await;
            }
            if complete {
                socket.write_all(b"0\r\n\r\n").await.unwrap();
                socket.flush().await.unwrap();
            }
        });
        addr
    }

    async fn stream_reply(addr: SocketAddr, timeout_seconds: u64) -> String {
        let config = OpenAiConfig {
            api_base_url: format!("http://{addr}/v1/chat/completions"),
            model: "m".into(),
            temperature: 0.2,
            timeout_seconds,
            stream: true,
        };
        let agent = OpenAiCompatibleAgent::new(&config, None, None).unwrap();
        match agent.call(&Method::RunAsync, Argument::Text("hi".into())).await.unwrap() {
            Outcome::Events(events) => drain(events).await,
            other => panic!("expected events, got {other:?}"),
        }
    }

    const QUICK: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn deltas_accumulate_into_one_message_per_choice() {
        let mut pieces = vec![delta("Hel"), delta("lo wor"), delta("ld"), finished()];
        pieces.extend([delta("Bye"), finished(), b"data: [DONE]\n\n".to_vec()]);
        let addr = serve(pieces, QUICK, true).await;
        assert_eq!(stream_reply(addr, 5).await, "Hello world Bye");
    }

    #[tokio::test]
    async fn line_split_across_network_chunks() {
        let line = delta("joined");
        let (head, tail) = line.split_at(line.len() / 2);
        let addr = serve(vec![head.to_vec(), tail.to_vec(), finished()], QUICK, true).await;
        assert_eq!(stream_reply(addr, 5).await, "joined");
    }

    #[tokio::test]
    async fn multibyte_char_split_across_network_chunks() {
        let line = delta("grüße");
        let cut = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let (head, tail) = line.split_at(cut);
        let addr = serve(vec![head.to_vec(), tail.to_vec(), finished()], QUICK, true).await;
        assert_eq!(stream_reply(addr, 5).await, "grüße");
    }

    #[tokio::test]
    async fn stream_without_done_still_flushes() {
        let addr = serve(vec![delta("partial"), delta(" answer")], QUICK, true).await;
        assert_eq!(stream_reply(addr, 5).await, "partial answer");
    }

    #[tokio::test]
    async fn read_error_keeps_text_and_reports_failure() {
        let addr = serve(vec![delta("Hel")], QUICK, false).await;
        let reply = stream_reply(addr, 5).await;
        assert!(reply.starts_with("Hel "), "got {reply:?}");
        assert!(reply.contains("error while reading events"), "got {reply:?}");
    }

    #[tokio::test]
    async fn slow_stream_outlives_request_timeout() {
        let pieces = vec![delta("slow"), delta(" but"), delta(" complete"), finished()];
        let addr = serve(pieces, Duration::from_millis(600), true).await;
        assert_eq!(stream_reply(addr, 1).await, "slow but complete");
    }
}
