//! Deanonymises an Anthropic SSE stream online, one event at a time,
//! without ever emitting a replacement token half-formed.

use std::collections::HashMap;

use relay_core::wire::anthropic::{StreamDelta, StreamEvent};
use relay_crypto::TokenCodec;

use crate::body::deanonymise_buffer;
use crate::reverse_map::ReverseMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Json,
    Passthrough,
}

struct BlockState {
    kind: BlockKind,
    raw: String,
    emitted: usize,
}

/// Per-stream state; one instance per in-flight response.
#[derive(Default)]
pub struct StreamDeanonymizer {
    blocks: HashMap<usize, BlockState>,
}

fn block_kind(content_block: &serde_json::Value) -> BlockKind {
    match content_block.get("type").and_then(serde_json::Value::as_str) {
        Some("tool_use") => BlockKind::Json,
        Some("thinking") => BlockKind::Passthrough,
        _ => BlockKind::Text,
    }
}

/// The largest prefix of `buf` that provably cannot still be growing a
/// replacement token, per the fixed two-rule algorithm: an unclosed `[`
/// always holds back to its open position; otherwise the longest tail
/// overlap (>= 3 chars) with the prefix of some known replacement holds
/// back to where that overlap begins.
fn safe_flush_len(buf: &str, reverse_map: &ReverseMap) -> usize {
    let mut depth = 0i32;
    let mut open_pos: Option<usize> = None;
    for (i, c) in buf.char_indices() {
        match c {
            '[' => {
                if depth == 0 {
                    open_pos = Some(i);
                }
                depth += 1;
            }
            ']' => {
                depth = (depth - 1).max(0);
                if depth == 0 {
                    open_pos = None;
                }
            }
            _ => {}
        }
    }
    if let Some(pos) = open_pos {
        return pos;
    }

    let known: Vec<String> = reverse_map.iter().map(|(replacement, _)| replacement).collect();
    let max_check = buf.len().min(96);
    for len in (3..=max_check).rev() {
        let cut = buf.len() - len;
        if !buf.is_char_boundary(cut) {
            continue;
        }
        let tail = &buf[cut..];
        if known.iter().any(|repl| repl.len() > tail.len() && repl.starts_with(tail)) {
            return cut;
        }
    }
    buf.len()
}

impl StreamDeanonymizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one inbound event, returning the (possibly empty) sequence
    /// of events to forward downstream. Most inputs produce exactly one
    /// output event; a buffered-but-not-yet-safe-to-flush text delta
    /// produces zero.
    pub fn process(&mut self, event: StreamEvent, codec: &TokenCodec, reverse_map: &ReverseMap) -> Vec<StreamEvent> {
        match event {
            StreamEvent::ContentBlockStart { index, content_block } => {
                let kind = block_kind(&content_block);
                self.blocks.insert(index, BlockState { kind, raw: String::new(), emitted: 0 });
                vec![StreamEvent::ContentBlockStart { index, content_block }]
            }
            StreamEvent::ContentBlockDelta { index, delta } => self.process_delta(index, delta, codec, reverse_map),
            StreamEvent::ContentBlockStop { index } => {
                let mut out = Vec::new();
                if let Some(state) = self.blocks.get_mut(&index) {
                    match state.kind {
                        BlockKind::Json => {
                            let full = deanonymise_buffer(&state.raw, codec, reverse_map);
                            if !full.is_empty() {
                                out.push(StreamEvent::ContentBlockDelta {
                                    index,
                                    delta: StreamDelta::InputJsonDelta { partial_json: full },
                                });
                            }
                        }
                        BlockKind::Text => {
                            let full = deanonymise_buffer(&state.raw, codec, reverse_map);
                            let remainder = &full[state.emitted.min(full.len())..];
                            if !remainder.is_empty() {
                                out.push(StreamEvent::ContentBlockDelta {
                                    index,
                                    delta: StreamDelta::TextDelta { text: remainder.to_owned() },
                                });
                            }
                        }
                        BlockKind::Passthrough => {}
                    }
                }
                self.blocks.remove(&index);
                out.push(StreamEvent::ContentBlockStop { index });
                out
            }
            other => vec![other],
        }
    }

    fn process_delta(&mut self, index: usize, delta: StreamDelta, codec: &TokenCodec, reverse_map: &ReverseMap) -> Vec<StreamEvent> {
        let Some(state) = self.blocks.get_mut(&index) else {
            return vec![StreamEvent::ContentBlockDelta { index, delta }];
        };

        match (&state.kind, &delta) {
            (BlockKind::Passthrough, _) => vec![StreamEvent::ContentBlockDelta { index, delta }],
            (BlockKind::Json, StreamDelta::InputJsonDelta { partial_json }) => {
                state.raw.push_str(partial_json);
                Vec::new()
            }
            (BlockKind::Text, StreamDelta::TextDelta { text }) => {
                state.raw.push_str(text);
                let deanonymised = deanonymise_buffer(&state.raw, codec, reverse_map);
                let flush_len = safe_flush_len(&deanonymised, reverse_map).min(deanonymised.len());
                if flush_len <= state.emitted {
                    return Vec::new();
                }
                let chunk = deanonymised[state.emitted..flush_len].to_owned();
                state.emitted = flush_len;
                if chunk.is_empty() {
                    Vec::new()
                } else {
                    vec![StreamEvent::ContentBlockDelta { index, delta: StreamDelta::TextDelta { text: chunk } }]
                }
            }
            _ => vec![StreamEvent::ContentBlockDelta { index, delta }],
        }
    }
}
