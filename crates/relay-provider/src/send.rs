use futures::TryStreamExt;

use crate::error::ProviderError;
use crate::response::{ProviderResponse, ResponseBody};

/// Common tail end of every adapter's `forward`: issue the request and
/// wrap the reqwest response into our normalised shape. A non-2xx status
/// is not mapped to an `Err` -- the dispatcher inspects `status` itself
/// to decide cooldown/retry behaviour.
pub async fn send_and_wrap(request: reqwest::RequestBuilder, is_stream: bool) -> Result<ProviderResponse, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let headers = response.headers().clone();

    let body = if is_stream {
        let stream = response.bytes_stream().map_err(ProviderError::from);
        ResponseBody::Stream(Box::pin(stream))
    } else {
        ResponseBody::Buffered(response.text().await?)
    };

    Ok(ProviderResponse::new(status, headers, is_stream, body))
}
