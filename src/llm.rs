use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::events::{LlmEvent, Message};
use crate::image::DataUri;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, trace, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

/// Every event line in the response body starts with this literal
const FRAME_PREFIX: &str = "data: ";
const DELTA_POINTER: &str = "/candidates/0/content/parts/0/text";

/// One generation request: the whole conversation plus generation settings
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub system_instruction: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            system_instruction: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction;
        self
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    /// Wire body for `streamGenerateContent`
    pub fn payload(&self) -> GenerateContentRequest<'_> {
        let contents = self.messages.iter().map(Content::from_message).collect();

        let system_instruction = self
            .system_instruction
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .map(|text| SystemInstruction {
                parts: vec![Part::Text { text }],
            });

        GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                max_output_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            },
            system_instruction,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest<'a> {
    pub contents: Vec<Content<'a>>,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction<'a>>,
}

#[derive(Debug, Serialize)]
pub struct Content<'a> {
    pub role: &'static str,
    pub parts: Vec<Part<'a>>,
}

impl<'a> Content<'a> {
    fn from_message(message: &'a Message) -> Self {
        let mut parts = vec![Part::Text { text: &message.text }];

        if let Some(image) = message.image.as_deref() {
            match DataUri::parse(image) {
                Some(uri) => parts.push(Part::InlineData {
                    inline_data: InlineData {
                        mime_type: uri.mime_type,
                        data: uri.data,
                    },
                }),
                None => warn!("skipping attachment that is not a data URI"),
            }
        }

        Self {
            role: message.role.as_str(),
            parts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SystemInstruction<'a> {
    pub parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Part<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData<'a> {
    pub mime_type: &'a str,
    pub data: &'a str,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    pub max_output_tokens: u32,
}

/// Splits a streamed body into `data: ` lines and pulls the text delta out of
/// each one.
///
/// Bytes are held until a newline arrives, so a frame (or a multi-byte
/// character) split across two reads is reassembled before it is decoded.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of the body; returns the non-empty deltas of every line
    /// completed by it, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut deltas = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(delta) = parse_line(&line[..newline]) {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// Flush the last line when the body did not end with a newline
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.pending);
        if line.is_empty() {
            return None;
        }
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<String> {
    let decoded = String::from_utf8_lossy(raw);
    let line: &str = &decoded;
    let line = line.strip_suffix('\r').unwrap_or(line);

    let payload = line.strip_prefix(FRAME_PREFIX)?;
    match serde_json::from_str::<Value>(payload) {
        Ok(frame) => extract_delta(&frame),
        Err(err) => {
            trace!(error = %err, "dropping malformed frame");
            None
        }
    }
}

/// Text delta at `candidates[0].content.parts[0].text`, if present and non-empty
pub fn extract_delta(frame: &Value) -> Option<String> {
    frame
        .pointer(DELTA_POINTER)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Human-readable message for a rejected request: the server's
/// `error.message` when the body carries one, otherwise the status code.
pub fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("API Error: {}", status))
}

/// Drive a streamed body to completion.
///
/// `on_progress` receives the cumulative text after every non-empty delta.
/// The returned text is the concatenation of all deltas in arrival order.
pub async fn decode_stream<S, B, E, F>(body: S, mut on_progress: F) -> Result<String>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    F: FnMut(&str),
{
    let mut body = std::pin::pin!(body);
    let mut decoder = FrameDecoder::new();
    let mut full_text = String::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ChatError::Transport(e.to_string()))?;
        for delta in decoder.push(chunk.as_ref()) {
            full_text.push_str(&delta);
            on_progress(&full_text);
        }
    }

    if let Some(delta) = decoder.finish() {
        full_text.push_str(&delta);
        on_progress(&full_text);
    }

    Ok(full_text)
}

/// Client for the Gemini `streamGenerateContent` endpoint
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.active_model().to_string(),
            api_key: config.get_api_key(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:streamGenerateContent", self.base_url, self.model)
    }

    /// Issue one streaming request and decode its body.
    ///
    /// Progress is reported as cumulative text. Exactly one of the text or an
    /// error comes back; a rejected request never reports progress.
    pub async fn generate<F>(&self, request: &LlmRequest, on_progress: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        let api_key = self.api_key.as_deref().ok_or(ChatError::MissingApiKey)?;

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            "sending streamGenerateContent request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("alt", "sse"), ("key", api_key)])
            .json(&request.payload())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(status.as_u16(), &body);
            warn!(status = status.as_u16(), %message, "request rejected");
            return Err(ChatError::RequestRejected {
                status: status.as_u16(),
                message,
            });
        }

        let text = decode_stream(response.bytes_stream(), on_progress).await?;
        debug!(chars = text.chars().count(), "stream complete");
        Ok(text)
    }

    /// Spawn a generation and deliver its events over a channel.
    ///
    /// The receiver sees any number of `Progress` events followed by exactly
    /// one `Complete` or `Error`.
    pub fn stream_response(&self, request: LlmRequest) -> mpsc::UnboundedReceiver<LlmEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.clone();

        tokio::spawn(async move {
            let progress_tx = tx.clone();
            let result = client
                .generate(&request, |text| {
                    let _ = progress_tx.send(LlmEvent::Progress(text.to_string()));
                })
                .await;

            let terminal = match result {
                Ok(text) => LlmEvent::Complete(text),
                Err(err) => LlmEvent::Error(err.to_string()),
            };
            let _ = tx.send(terminal);
        });

        rx
    }
}
