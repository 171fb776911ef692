use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::Stream;
use reqwest::StatusCode;

use crate::error::ProviderError;

/// Token/model counters recovered from a provider response. For buffered
/// bodies these are known immediately; for streamed bodies they are only
/// known once the converter that walks the SSE events for the client has
/// seen the terminal usage event, hence [`ProviderResponse::usage`] being
/// lazily populated via [`ProviderResponse::record_usage`].
#[derive(Debug, Clone, Default)]
pub struct UsageCounters {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub model: Option<String>,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

pub enum ResponseBody {
    Buffered(String),
    Stream(ByteStream),
}

/// A provider's response, normalised across the four adapter personalities.
/// The upstream body is never teed at the byte level: whichever layer
/// converts the wire format back to the client shape reads the single
/// stream once and is responsible for calling [`Self::record_usage`] when
/// it observes the terminal usage event.
pub struct ProviderResponse {
    pub status: StatusCode,
    pub headers: reqwest::header::HeaderMap,
    pub is_stream: bool,
    pub body: ResponseBody,
    usage: Arc<Mutex<Option<UsageCounters>>>,
}

impl ProviderResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: reqwest::header::HeaderMap, is_stream: bool, body: ResponseBody) -> Self {
        Self { status, headers, is_stream, body, usage: Arc::new(Mutex::new(None)) }
    }

    /// Populate the lazily-known usage counters. Safe to call multiple
    /// times; the last call wins.
    pub fn record_usage(&self, usage: UsageCounters) {
        *self.usage.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(usage);
    }

    #[must_use]
    pub fn usage(&self) -> Option<UsageCounters> {
        self.usage.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn usage_handle(&self) -> Arc<Mutex<Option<UsageCounters>>> {
        Arc::clone(&self.usage)
    }
}
