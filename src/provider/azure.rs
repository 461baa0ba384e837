use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use anyhow::{bail, Context, Result};
use log::info;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;

use crate::config::Credentials;

pub const AUTHORITY: &str = "https://login.microsoftonline.com";
pub const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
const DNS_API_VERSION: &str = "2018-05-01";
const RECORD_TTL: u32 = 3600;
const CREATED_BY: &str = "azure-dyndns";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchange service principal credentials for a management API bearer token
/// (OAuth2 client-credentials grant). The token is used as-is for the
/// lifetime of the process; no caching or refresh.
pub async fn acquire_token(
    client: &Client,
    authority: &str,
    credentials: &Credentials,
) -> Result<String> {
    let url = format!("{}/{}/oauth2/v2.0/token", authority, credentials.tenant_id);
    let params = [
        ("grant_type", "client_credentials"),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
        ("scope", MANAGEMENT_SCOPE),
    ];

    let response = client
        .post(&url)
        .form(&params)
        .send()
        .await
        .context("Failed to send token request to the identity provider")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Authentication failed ({}): {}", status, body);
    }

    let token: TokenResponse = response
        .json()
        .await
        .context("Failed to parse token response")?;

    info!("Authenticated against tenant {}", credentials.tenant_id);
    Ok(token.access_token)
}

// Azure DNS record set types (create-or-update request body)

#[derive(Debug, Serialize)]
struct RecordSet {
    properties: RecordSetProperties,
}

#[derive(Debug, Serialize)]
struct RecordSetProperties {
    #[serde(rename = "TTL")]
    ttl: u32,
    #[serde(rename = "ARecords")]
    a_records: Vec<ARecord>,
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ARecord {
    #[serde(rename = "ipv4Address")]
    ipv4_address: String,
}

fn record_set(address: Ipv4Addr) -> RecordSet {
    let mut metadata = BTreeMap::new();
    metadata.insert("createdBy".to_string(), CREATED_BY.to_string());
    metadata.insert("updated".to_string(), updated_timestamp());

    RecordSet {
        properties: RecordSetProperties {
            ttl: RECORD_TTL,
            a_records: vec![ARecord {
                ipv4_address: address.to_string(),
            }],
            metadata,
        },
    }
}

/// Local wall-clock time of the run. Falls back to UTC when the local offset
/// cannot be determined (common on multi-threaded runtimes).
fn updated_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&Rfc2822).unwrap_or_else(|_| now.to_string())
}

pub struct AzureDnsClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl AzureDnsClient {
    pub fn new(client: Client, endpoint: String, token: String) -> Self {
        Self {
            client,
            endpoint,
            token,
        }
    }

    /// Create-or-update the A record set for `record_name` in the zone: the
    /// record is replaced if it exists and created if it does not. No
    /// existence check, no diffing against the previous value.
    pub async fn upsert_a_record(
        &self,
        subscription_id: &str,
        resource_group: &str,
        zone_name: &str,
        record_name: &str,
        address: Ipv4Addr,
    ) -> Result<serde_json::Value> {
        let url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/dnsZones/{}/A/{}?api-version={}",
            self.endpoint, subscription_id, resource_group, zone_name, record_name, DNS_API_VERSION
        );

        info!(
            "Upserting A record {}.{} -> {} (TTL {})",
            record_name, zone_name, address, RECORD_TTL
        );

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&record_set(address))
            .send()
            .await
            .context("Failed to send record update to the DNS management API")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read DNS management API response")?;

        if !status.is_success() {
            bail!("DNS record update failed ({}): {}", status, text);
        }

        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse DNS management API response: {}", text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> Credentials {
        Credentials {
            tenant_id: "t1".to_string(),
            client_id: "c1".to_string(),
            client_secret: "s1".to_string(),
        }
    }

    #[test]
    fn record_set_has_fixed_shape() {
        let value = serde_json::to_value(record_set(Ipv4Addr::new(203, 0, 113, 7))).unwrap();
        let properties = &value["properties"];

        assert_eq!(properties["TTL"], 3600);
        let records = properties["ARecords"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["ipv4Address"], "203.0.113.7");
        assert_eq!(properties["metadata"]["createdBy"], "azure-dyndns");
        assert!(properties["metadata"]["updated"].is_string());
    }

    #[tokio::test]
    async fn acquires_token_with_client_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/t1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "tok-123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = acquire_token(&Client::new(), &server.uri(), &credentials())
            .await
            .unwrap();
        assert_eq!(token, "tok-123");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        assert!(body.contains("grant_type=client_credentials"));
        assert!(body.contains("client_id=c1"));
        assert!(body.contains("client_secret=s1"));
    }

    #[tokio::test]
    async fn rejected_grant_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/t1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client"
            })))
            .mount(&server)
            .await;

        let err = acquire_token(&Client::new(), &server.uri(), &credentials())
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Authentication failed"));
        assert!(message.contains("invalid_client"));
    }

    #[tokio::test]
    async fn upsert_puts_record_with_bearer_token() {
        let server = MockServer::start().await;
        let response = json!({
            "name": "home",
            "type": "Microsoft.Network/dnsZones/A",
            "properties": {
                "TTL": 3600,
                "fqdn": "home.example.com.",
                "ARecords": [{"ipv4Address": "203.0.113.7"}]
            }
        });
        Mock::given(method("PUT"))
            .and(path(
                "/subscriptions/sub-123/resourceGroups/rg1/providers/Microsoft.Network/dnsZones/example.com/A/home",
            ))
            .and(query_param("api-version", DNS_API_VERSION))
            .and(header("authorization", "Bearer tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let dns = AzureDnsClient::new(Client::new(), server.uri(), "tok-123".to_string());
        let result = dns
            .upsert_a_record(
                "sub-123",
                "rg1",
                "example.com",
                "home",
                Ipv4Addr::new(203, 0, 113, 7),
            )
            .await
            .unwrap();
        assert_eq!(result, response);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["properties"]["TTL"], 3600);
        assert_eq!(
            body["properties"]["ARecords"][0]["ipv4Address"],
            "203.0.113.7"
        );
    }

    #[tokio::test]
    async fn api_error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": "AuthorizationFailed", "message": "denied"}
            })))
            .mount(&server)
            .await;

        let dns = AzureDnsClient::new(Client::new(), server.uri(), "tok-123".to_string());
        let err = dns
            .upsert_a_record(
                "sub-123",
                "rg1",
                "example.com",
                "home",
                Ipv4Addr::new(203, 0, 113, 7),
            )
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("DNS record update failed"));
        assert!(message.contains("AuthorizationFailed"));
    }
}
