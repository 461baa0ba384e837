use anyhow::{Context, Result};
use reqwest::Client;
use std::net::Ipv4Addr;

pub const IP_ECHO_URL: &str = "https://ifconfig.me";

/// Ask the IP-echo service for our current public address. The response body
/// is untrusted input: anything that is not an IPv4 literal is rejected
/// rather than written into the zone.
pub async fn fetch(client: &Client, url: &str) -> Result<Ipv4Addr> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to reach IP echo service at {}", url))?
        .error_for_status()
        .with_context(|| format!("IP echo service at {} returned an error", url))?;

    let body = response
        .text()
        .await
        .context("Failed to read IP echo response")?;

    let trimmed = body.trim();
    trimmed.parse::<Ipv4Addr>().with_context(|| {
        format!(
            "IP echo service returned an invalid IPv4 address: {:?}",
            trimmed
        )
    })
}
