use anyhow::{bail, Context, Result};
use reqwest::{Client, Response};
use serde::Serialize;

use crate::config::Config;
use crate::constants::USER_AGENT;

pub fn build_client(cfg: &Config) -> Result<Client> {
    Client::builder()
        .timeout(cfg.request_timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build reqwest client")
}

pub async fn get_streaming<Q: Serialize + ?Sized>(
    http: &Client,
    url: &str,
    query: &Q,
) -> Result<Response> {
    let response = http
        .get(url)
        .query(query)
        .send()
        .await
        .with_context(|| format!("Request failed for {url}"))?;

    if !response.status().is_success() {
        bail!("Request failed ({}) for {}", response.status(), response.url());
    }

    Ok(response)
}
