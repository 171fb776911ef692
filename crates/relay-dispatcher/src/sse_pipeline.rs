//! Online SSE translation + deanonymisation (spec §4.G/§4.B streaming,
//! §4.H.8). The upstream byte stream -- whichever of the three SSE
//! dialects the candidate's provider speaks -- is decoded into the
//! canonical Anthropic event shape, deanonymised there (the guardrail's
//! [`StreamDeanonymizer`] only knows that shape), then re-encoded into
//! whichever dialect the inbound client expects.
//!
//! Two transducers, composed in the fixed order the spec names:
//! format-converter first, deanonymiser second -- except deanonymising
//! against the canonical shape, rather than the client's, is what lets a
//! single [`relay_guardrail::StreamDeanonymizer`] serve every {upstream,
//! client} dialect pair without duplicating its buffering logic per
//! dialect.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::stream::{self, Stream};
use relay_convert::codex::CodexResponsesStream;
use relay_convert::sse::{AnthropicToOpenAiStream, OpenAiToAnthropicStream};
use relay_core::wire::anthropic::StreamEvent;
use relay_core::wire::openai::StreamChunk;
use relay_core::InboundShape;
use relay_crypto::TokenCodec;
use relay_guardrail::{ReverseMap, StreamDeanonymizer};
use relay_provider::response::{ByteStream, UsageCounters};
use serde_json::Value;

const DONE_SENTINEL: &str = "data: [DONE]\n\n";

/// Which dialect the upstream provider speaks, independent of the
/// client's inbound shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamDialect {
    Anthropic,
    OpenAiChat,
    CodexResponses,
}

/// Split complete `\n\n`-terminated SSE frames off the front of `buffer`,
/// returning each as `(event name, joined data lines)`. Leftover partial
/// data stays in `buffer` for the next chunk.
fn drain_sse_frames(buffer: &mut String) -> Vec<(Option<String>, String)> {
    let mut frames = Vec::new();
    while let Some(pos) = buffer.find("\n\n") {
        let raw: String = buffer.drain(..pos + 2).collect();
        let mut event_name = None;
        let mut data_lines = Vec::new();
        for line in raw.lines() {
            let line = line.trim_end_matches('\r');
            if let Some(rest) = line.strip_prefix("event:") {
                event_name = Some(rest.trim().to_owned());
            } else if let Some(rest) = line.strip_prefix("data:") {
                data_lines.push(rest.trim_start().to_owned());
            }
        }
        if !data_lines.is_empty() {
            frames.push((event_name, data_lines.join("\n")));
        }
    }
    frames
}

fn encode_anthropic_event(event: &StreamEvent) -> Bytes {
    let value = serde_json::to_value(event).unwrap_or(Value::Null);
    let event_name = value.get("type").and_then(Value::as_str).unwrap_or("message").to_owned();
    let data = serde_json::to_string(&value).unwrap_or_default();
    Bytes::from(format!("event: {event_name}\ndata: {data}\n\n"))
}

fn encode_openai_chunk(chunk: &StreamChunk) -> Bytes {
    let data = serde_json::to_string(chunk).unwrap_or_default();
    Bytes::from(format!("data: {data}\n\n"))
}

fn capture_usage(events: &[StreamEvent], usage_sink: &Mutex<Option<UsageCounters>>, model: &str) {
    for event in events {
        if let StreamEvent::MessageDelta { usage: Some(u), .. } = event {
            let mut guard = usage_sink.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard = Some(UsageCounters { input_tokens: u.input_tokens, output_tokens: u.output_tokens, model: Some(model.to_owned()) });
        }
    }
}

struct PipelineState {
    byte_stream: ByteStream,
    raw_buffer: String,
    upstream: UpstreamDialect,
    inbound: InboundShape,
    codec: Arc<TokenCodec>,
    reverse_map: Arc<ReverseMap>,
    usage_sink: Arc<Mutex<Option<UsageCounters>>>,
    model: String,
    deanonymizer: StreamDeanonymizer,
    codex_conv: CodexResponsesStream,
    openai_to_anthropic: OpenAiToAnthropicStream,
    anthropic_to_openai: AnthropicToOpenAiStream,
    pending: std::collections::VecDeque<Bytes>,
    upstream_exhausted: bool,
    done: bool,
}

impl PipelineState {
    /// Decode one raw SSE frame from the upstream dialect into the
    /// canonical Anthropic event sequence.
    fn decode_frame(&mut self, event_name: Option<&str>, data: &str) -> Vec<StreamEvent> {
        match self.upstream {
            UpstreamDialect::Anthropic => serde_json::from_str(data).map(|e| vec![e]).unwrap_or_default(),
            UpstreamDialect::OpenAiChat => {
                if data == "[DONE]" {
                    return Vec::new();
                }
                let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else { return Vec::new() };
                self.openai_to_anthropic.process(chunk)
            }
            UpstreamDialect::CodexResponses => {
                let Ok(value) = serde_json::from_str::<Value>(data) else { return Vec::new() };
                let event_name = event_name.unwrap_or_default();
                self.codex_conv
                    .process(event_name, &value)
                    .into_iter()
                    .flat_map(|chunk| self.openai_to_anthropic.process(chunk))
                    .collect()
            }
        }
    }

    /// Encode one deanonymised canonical event into the client's inbound
    /// dialect, appending to `pending`.
    fn encode_for_client(&mut self, event: StreamEvent) {
        match self.inbound {
            InboundShape::Anthropic => self.pending.push_back(encode_anthropic_event(&event)),
            InboundShape::OpenAi => {
                for chunk in self.anthropic_to_openai.process(event) {
                    self.pending.push_back(encode_openai_chunk(&chunk));
                }
            }
        }
    }

    fn process_canonical_events(&mut self, events: Vec<StreamEvent>) {
        capture_usage(&events, &self.usage_sink, &self.model);
        for event in events {
            let deanonymised = self.deanonymizer.process(event, &self.codec, &self.reverse_map);
            for event in deanonymised {
                self.encode_for_client(event);
            }
        }
    }

    fn flush_terminal(&mut self) {
        if matches!(self.upstream, UpstreamDialect::OpenAiChat | UpstreamDialect::CodexResponses) {
            let events = self.openai_to_anthropic.finish();
            self.process_canonical_events(events);
        }
        if self.inbound == InboundShape::OpenAi {
            self.pending.push_back(Bytes::from_static(DONE_SENTINEL.as_bytes()));
        }
        self.done = true;
    }
}

/// Build the lazy byte stream that decodes, deanonymises, and re-encodes
/// an upstream SSE response for the client. `usage_sink` is populated as
/// soon as a terminal usage event is observed, mirroring
/// [`relay_provider::ProviderResponse::record_usage`]'s lazily-known
/// counters.
#[must_use]
pub fn build(
    byte_stream: ByteStream,
    upstream: UpstreamDialect,
    inbound: InboundShape,
    codec: Arc<TokenCodec>,
    reverse_map: Arc<ReverseMap>,
    usage_sink: Arc<Mutex<Option<UsageCounters>>>,
    response_id: String,
    model: String,
) -> impl Stream<Item = Bytes> {
    let state = PipelineState {
        byte_stream,
        raw_buffer: String::new(),
        upstream,
        inbound,
        codec,
        reverse_map,
        usage_sink,
        model: model.clone(),
        deanonymizer: StreamDeanonymizer::new(),
        codex_conv: CodexResponsesStream::new(response_id.clone(), model.clone()),
        openai_to_anthropic: OpenAiToAnthropicStream::new(),
        anthropic_to_openai: AnthropicToOpenAiStream::new(response_id, model),
        pending: std::collections::VecDeque::new(),
        upstream_exhausted: false,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((chunk, state));
            }
            if state.done {
                return None;
            }
            if state.upstream_exhausted {
                state.flush_terminal();
                continue;
            }

            use futures::StreamExt;
            match state.byte_stream.next().await {
                Some(Ok(bytes)) => {
                    state.raw_buffer.push_str(&String::from_utf8_lossy(&bytes));
                    let frames = drain_sse_frames(&mut state.raw_buffer);
                    for (event_name, data) in frames {
                        let events = state.decode_frame(event_name.as_deref(), &data);
                        state.process_canonical_events(events);
                    }
                }
                Some(Err(_)) | None => {
                    state.upstream_exhausted = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_crypto::Key;

    fn codec() -> Arc<TokenCodec> {
        Arc::new(TokenCodec::new(Key::from_bytes([9u8; 32])))
    }

    fn byte_stream_of(frames: Vec<&'static str>) -> ByteStream {
        Box::pin(stream::iter(frames.into_iter().map(|s| Ok(Bytes::from(s)))))
    }

    async fn collect_text(s: impl Stream<Item = Bytes>) -> String {
        use futures::StreamExt;
        let chunks: Vec<Bytes> = s.collect().await;
        chunks.iter().map(|b| String::from_utf8_lossy(b).into_owned()).collect()
    }

    #[tokio::test]
    async fn anthropic_to_anthropic_passthrough_deanonymises() {
        let reverse_map = Arc::new(ReverseMap::new());
        reverse_map.insert("[EMAIL-abc123456789]", "bob@example.com");
        let frames = vec![
            "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"reach [EMAIL-abc123456789] now\"}}\n\n",
            "event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        ];
        let stream = build(
            byte_stream_of(frames),
            UpstreamDialect::Anthropic,
            InboundShape::Anthropic,
            codec(),
            reverse_map,
            Arc::new(Mutex::new(None)),
            "msg_1".to_owned(),
            "claude-sonnet-4".to_owned(),
        );
        let out = collect_text(stream).await;
        assert!(out.contains("bob@example.com"));
        assert!(!out.contains("[EMAIL-"));
    }

    #[tokio::test]
    async fn anthropic_to_openai_emits_done_sentinel() {
        let reverse_map = Arc::new(ReverseMap::new());
        let frames = vec![
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{}}\n\n",
            "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\n",
            "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"input_tokens\":3,\"output_tokens\":1}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        ];
        let usage_sink = Arc::new(Mutex::new(None));
        let stream = build(
            byte_stream_of(frames),
            UpstreamDialect::Anthropic,
            InboundShape::OpenAi,
            codec(),
            reverse_map,
            Arc::clone(&usage_sink),
            "msg_1".to_owned(),
            "claude-sonnet-4".to_owned(),
        );
        let out = collect_text(stream).await;
        assert!(out.contains("chat.completion.chunk") || out.contains("\"id\""));
        assert!(out.trim_end().ends_with("data: [DONE]"));
        assert_eq!(usage_sink.lock().unwrap().as_ref().unwrap().input_tokens, 3);
    }

    #[tokio::test]
    async fn openai_upstream_round_trips_through_canonical_shape() {
        let reverse_map = Arc::new(ReverseMap::new());
        let frames = vec![
            "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\n",
            "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":2,\"completion_tokens\":1,\"total_tokens\":3}}\n\n",
            "data: [DONE]\n\n",
        ];
        let stream = build(
            byte_stream_of(frames),
            UpstreamDialect::OpenAiChat,
            InboundShape::Anthropic,
            codec(),
            reverse_map,
            Arc::new(Mutex::new(None)),
            "msg_1".to_owned(),
            "gpt-4o".to_owned(),
        );
        let out = collect_text(stream).await;
        assert!(out.contains("content_block_delta"));
        assert!(out.contains("message_stop"));
    }

    #[test]
    fn drain_sse_frames_keeps_partial_tail_buffered() {
        let mut buffer = String::from("event: a\ndata: {}\n\nevent: b\ndata: {\"x\":");
        let frames = drain_sse_frames(&mut buffer);
        assert_eq!(frames.len(), 1);
        assert_eq!(buffer, "event: b\ndata: {\"x\":");
    }
}
