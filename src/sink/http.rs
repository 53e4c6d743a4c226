use crate::config::types::SinkOptions;
use crate::sink::traits::SinkError;
use reqwest::{Client, RequestBuilder};
use tracing::{error, warn};

pub fn build_client(options: &SinkOptions) -> Result<Client, SinkError> {
    let client = Client::builder().timeout(options.timeout).build()?;
    Ok(client)
}

pub fn base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Send a prepared request; success means the response status is in `accepted`.
pub async fn send_request(backend: &str, request: RequestBuilder, accepted: &[u16]) -> bool {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            error!(backend = backend, error = %e, "Request to backend failed");
            return false;
        }
    };

    let status = response.status().as_u16();
    if accepted.contains(&status) {
        return true;
    }

    let body = response.text().await.unwrap_or_default();
    warn!(backend = backend, status = status, body = %body, "Backend rejected entry");
    false
}
