//! Hetzner DNS API client
//!
//! Direct Hetzner DNS API implementation for forward record management.
//! Uses the `Auth-API-Token` header for authentication.

use crate::error::{HetznerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ttlfleet_cloud::{DnsProvider, DnsRecord};

const HETZNER_DNS_API_BASE: &str = "https://dns.hetzner.com/api/v1";

/// Hetzner DNS manager
pub struct HetznerDns {
    client: reqwest::Client,
    api_token: String,
    base_url: String,
}

/// Configuration for DNS manager
#[derive(Debug, Clone)]
pub struct DnsConfig {
    pub api_token: String,
    pub base_url: String,
}

impl DnsConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: HETZNER_DNS_API_BASE.to_string(),
        }
    }

    /// Create DnsConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let api_token = std::env::var("HCLOUD_DNS_TOKEN")
            .map_err(|_| HetznerError::MissingEnvVar("HCLOUD_DNS_TOKEN".to_string()))?;
        Ok(Self::new(api_token))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl HetznerDns {
    /// Create a new DNS manager
    pub fn new(config: DnsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_token: config.api_token,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a new DNS record and return its ID
    pub async fn create(&self, record: &DnsRecord) -> Result<String> {
        let url = format!("{}/records", self.base_url);
        let request_body = CreateRecordRequest {
            zone_id: &record.zone_id,
            r#type: record.record_type.to_string(),
            name: &record.name,
            value: &record.value,
            ttl: record.ttl,
        };

        tracing::info!(
            "Creating DNS {} record: {} -> {}",
            record.record_type,
            record.name,
            record.value
        );

        let response = self
            .client
            .post(&url)
            .header("Auth-API-Token", &self.api_token)
            .json(&request_body)
            .send()
            .await?;
        let response = check_status(response, &record.name).await?;

        let api_response: RecordEnvelope = response.json().await?;
        Ok(api_response.record.id)
    }

    /// Delete a DNS record
    pub async fn delete(&self, record_id: &str) -> Result<()> {
        let url = format!("{}/records/{}", self.base_url, record_id);

        tracing::info!("Deleting DNS record: {}", record_id);

        let response = self
            .client
            .delete(&url)
            .header("Auth-API-Token", &self.api_token)
            .send()
            .await?;
        check_status(response, record_id).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response, subject: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .map(|e| e.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("{} failed with {}", subject, status));

    Err(HetznerError::Api {
        status: status.as_u16(),
        code: status.as_str().to_string(),
        message,
    })
}

#[async_trait]
impl DnsProvider for HetznerDns {
    fn name(&self) -> &str {
        "hetzner-dns"
    }

    async fn create_record(&self, record: &DnsRecord) -> ttlfleet_cloud::Result<String> {
        Ok(self.create(record).await?)
    }

    async fn delete_record(&self, record_id: &str) -> ttlfleet_cloud::Result<()> {
        Ok(self.delete(record_id).await?)
    }
}

// ============ API Types ============

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    zone_id: &'a str,
    r#type: String,
    name: &'a str,
    value: &'a str,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct RecordEnvelope {
    record: ApiRecord,
}

#[derive(Debug, Deserialize)]
struct ApiRecord {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        temp_env::with_var("HCLOUD_DNS_TOKEN", Some("dns-secret"), || {
            let config = DnsConfig::from_env().unwrap();
            assert_eq!(config.api_token, "dns-secret");
            assert_eq!(config.base_url, HETZNER_DNS_API_BASE);
        });
    }

    #[test]
    fn test_config_from_env_missing() {
        temp_env::with_var_unset("HCLOUD_DNS_TOKEN", || {
            assert!(matches!(
                DnsConfig::from_env(),
                Err(HetznerError::MissingEnvVar(_))
            ));
        });
    }

    #[test]
    fn test_base_url_trimmed() {
        let dns = HetznerDns::new(DnsConfig::new("t").with_base_url("http://localhost:9/")).unwrap();
        assert_eq!(dns.base_url, "http://localhost:9");
    }
}
