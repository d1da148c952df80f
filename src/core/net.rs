use reqwest::header::HeaderMap;

use crate::core::error::ApiError;

/// Decompose a response into the pieces the client caches and returns.
///
/// A failure while reading the body is classified like any other transport
/// error, so a connection dropped mid-stream stays retryable.
pub(crate) async fn read_response(
    resp: reqwest::Response,
) -> Result<(u16, HeaderMap, String), ApiError> {
    let status = resp.status().as_u16();
    let headers = resp.headers().clone();
    let url = resp.url().to_string();
    let body = resp
        .text()
        .await
        .map_err(|e| ApiError::from_reqwest(e, &url))?;
    Ok((status, headers, body))
}
