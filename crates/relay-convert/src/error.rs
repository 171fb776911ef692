use thiserror::Error;

/// Errors raised while translating between the two wire shapes. These are
/// always programmer-facing bugs or malformed upstream payloads, never a
/// client mistake (invalid inbound JSON is rejected by `relay-server`
/// before it reaches the converter).
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("malformed tool-call arguments: {0}")]
    ToolArguments(#[from] serde_json::Error),

    #[error("unsupported content block in conversion: {0}")]
    UnsupportedBlock(String),
}
