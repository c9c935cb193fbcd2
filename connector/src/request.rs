/// One-shot HTTPS requests against the client's JSON API.
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::lockfile::{Credentials, ADDRESS};

#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Endpoint path, e.g. `/lol-summoner/v1/current-summoner`.
    pub url: String,
    /// Defaults to `GET`.
    pub method: Option<Method>,
    /// JSON body.  Ignored for `GET`.
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            body: None,
        }
    }
}

/// `https://127.0.0.1:<port>/<path without leading slashes>`
pub fn endpoint_url(credentials: &Credentials, path: &str) -> String {
    format!(
        "https://{ADDRESS}:{}/{}",
        credentials.port,
        path.trim_start_matches('/')
    )
}

// The endpoint is the loopback service with a per-install self-signed
// certificate; nothing else is requested through this client.
fn localhost_client() -> Result<Client> {
    Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(Error::from)
}

/// Sends a single request and parses the response body as JSON.
pub async fn request(credentials: &Credentials, options: RequestOptions) -> Result<Value> {
    let method = options.method.unwrap_or(Method::GET);
    let url = endpoint_url(credentials, &options.url);
    tracing::debug!(target: "request", "{method} {url}");

    let mut builder = localhost_client()?
        .request(method.clone(), &url)
        .header(ACCEPT, "application/json")
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, credentials.authorization_header());

    if method != Method::GET {
        if let Some(body) = &options.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }
    }

    let response = builder.send().await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
