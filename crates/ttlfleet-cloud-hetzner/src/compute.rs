//! Hetzner Cloud API client
//!
//! Direct REST implementation of the compute provider using Bearer token
//! authentication. Only the endpoints the control plane needs are covered.

use crate::error::{HetznerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;
use ttlfleet_cloud::{
    Action, ActionStatus, ComputeProvider, CreateImageRequest, CreateServerRequest, CreatedImage,
    CreatedServer, Image, ImageType, LabelSelector, Labels, Protection, PublicNet, Server,
    ServerStatus, ServerType,
};

const HCLOUD_API_BASE: &str = "https://api.hetzner.cloud/v1";
const PER_PAGE: u32 = 50;

/// Configuration for the Hetzner Cloud client
#[derive(Debug, Clone)]
pub struct HetznerCloudConfig {
    pub token: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl HetznerCloudConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: HCLOUD_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Create HetznerCloudConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("HCLOUD_TOKEN")
            .map_err(|_| HetznerError::MissingEnvVar("HCLOUD_TOKEN".to_string()))?;
        let mut config = Self::new(token);
        if let Ok(base_url) = std::env::var("HCLOUD_ENDPOINT") {
            config.base_url = base_url;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Hetzner Cloud compute provider
pub struct HetznerCloud {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HetznerCloud {
    pub fn new(config: HetznerCloudConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode the JSON body
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.bearer_auth(&self.token).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Send a request whose successful response has no body
    async fn send_empty(&self, request: reqwest::RequestBuilder) -> Result<()> {
        let response = request.bearer_auth(&self.token).send().await?;
        check_status(response).await?;
        Ok(())
    }

    /// Follow pagination of a list endpoint
    async fn list_all<T, F>(
        &self,
        path: &str,
        query: &[(&str, String)],
        mut extract: F,
    ) -> Result<Vec<T>>
    where
        F: FnMut(ListPage) -> Result<Vec<T>>,
    {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let request = self
                .client
                .get(self.url(path))
                .query(query)
                .query(&[("page", page), ("per_page", PER_PAGE)]);

            tracing::debug!("GET {} page {}", path, page);
            let body: ListPage = self.send(request).await?;
            let next_page = body
                .meta
                .as_ref()
                .and_then(|m| m.pagination.as_ref())
                .and_then(|p| p.next_page);
            items.extend(extract(body)?);

            match next_page {
                Some(next) if next > page => page = next,
                _ => return Ok(items),
            }
        }
    }

    /// Post a server action and return the resulting action
    async fn server_action<B: Serialize + ?Sized>(
        &self,
        server_id: u64,
        action: &str,
        body: &B,
    ) -> Result<Action> {
        let url = self.url(&format!("/servers/{}/actions/{}", server_id, action));
        tracing::debug!("POST /servers/{}/actions/{}", server_id, action);
        let response: ActionEnvelope = self.send(self.client.post(url).json(body)).await?;
        Ok(response.action.into())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ApiErrorEnvelope>(&body) {
        Ok(envelope) => (envelope.error.code, envelope.error.message),
        Err(_) => (
            status.as_str().to_string(),
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        ),
    };

    Err(HetznerError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

fn selector_query(selector: Option<&LabelSelector>) -> Vec<(&'static str, String)> {
    selector
        .map(|s| vec![("label_selector", s.to_string())])
        .unwrap_or_default()
}

#[async_trait]
impl ComputeProvider for HetznerCloud {
    fn name(&self) -> &str {
        "hetzner-cloud"
    }

    async fn list_servers(
        &self,
        selector: Option<&LabelSelector>,
    ) -> ttlfleet_cloud::Result<Vec<Server>> {
        let query = selector_query(selector);
        let servers = self
            .list_all("/servers", &query, |page| {
                Ok(page.servers.into_iter().map(Server::from).collect())
            })
            .await?;
        Ok(servers)
    }

    async fn get_server(&self, name: &str) -> ttlfleet_cloud::Result<Option<Server>> {
        let request = self
            .client
            .get(self.url("/servers"))
            .query(&[("name", name)]);
        let page: ListPage = self.send(request).await?;
        Ok(page.servers.into_iter().next().map(Server::from))
    }

    async fn create_server(
        &self,
        request: &CreateServerRequest,
    ) -> ttlfleet_cloud::Result<CreatedServer> {
        let body = ApiCreateServer {
            name: &request.name,
            server_type: &request.server_type,
            image: request.image,
            location: &request.location,
            start_after_create: request.start_after_create,
            labels: &request.labels,
            networks: &request.networks,
            ssh_keys: &request.ssh_keys,
        };

        tracing::info!(
            "Creating server {} ({}) from image {}",
            request.name,
            request.server_type,
            request.image
        );
        let response: ApiCreateServerResponse = self
            .send(self.client.post(self.url("/servers")).json(&body))
            .await?;

        Ok(CreatedServer {
            server: response.server.into(),
            action: response.action.map(Action::from),
        })
    }

    async fn update_server_labels(
        &self,
        server_id: u64,
        labels: &Labels,
    ) -> ttlfleet_cloud::Result<Server> {
        let url = self.url(&format!("/servers/{}", server_id));
        let response: ServerEnvelope = self
            .send(self.client.put(url).json(&LabelsBody { labels }))
            .await?;
        Ok(response.server.into())
    }

    async fn delete_server(&self, server_id: u64) -> ttlfleet_cloud::Result<Action> {
        let url = self.url(&format!("/servers/{}", server_id));
        let response: ActionEnvelope = self.send(self.client.delete(url)).await?;
        Ok(response.action.into())
    }

    async fn shutdown_server(&self, server_id: u64) -> ttlfleet_cloud::Result<Action> {
        Ok(self
            .server_action(server_id, "shutdown", &serde_json::json!({}))
            .await?)
    }

    async fn reboot_server(&self, server_id: u64) -> ttlfleet_cloud::Result<Action> {
        Ok(self
            .server_action(server_id, "reboot", &serde_json::json!({}))
            .await?)
    }

    async fn create_image(
        &self,
        server_id: u64,
        request: &CreateImageRequest,
    ) -> ttlfleet_cloud::Result<CreatedImage> {
        let url = self.url(&format!("/servers/{}/actions/create_image", server_id));
        let body = ApiCreateImage {
            description: &request.description,
            r#type: "snapshot",
            labels: &request.labels,
        };
        let response: ApiCreateImageResponse =
            self.send(self.client.post(url).json(&body)).await?;
        Ok(CreatedImage {
            image: response.image.into(),
            action: response.action.into(),
        })
    }

    async fn change_dns_ptr(
        &self,
        server_id: u64,
        ip: &str,
        dns_ptr: Option<&str>,
    ) -> ttlfleet_cloud::Result<Action> {
        let body = serde_json::json!({ "ip": ip, "dns_ptr": dns_ptr });
        Ok(self
            .server_action(server_id, "change_dns_ptr", &body)
            .await?)
    }

    async fn list_images(
        &self,
        selector: Option<&LabelSelector>,
    ) -> ttlfleet_cloud::Result<Vec<Image>> {
        let query = selector_query(selector);
        let images = self
            .list_all("/images", &query, |page| {
                Ok(page.images.into_iter().map(Image::from).collect())
            })
            .await?;
        Ok(images)
    }

    async fn get_image(&self, image_id: u64) -> ttlfleet_cloud::Result<Option<Image>> {
        let url = self.url(&format!("/images/{}", image_id));
        match self.send::<ImageEnvelope>(self.client.get(url)).await {
            Ok(response) => Ok(Some(response.image.into())),
            Err(HetznerError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_image_labels(
        &self,
        image_id: u64,
        labels: &Labels,
    ) -> ttlfleet_cloud::Result<Image> {
        let url = self.url(&format!("/images/{}", image_id));
        let response: ImageEnvelope = self
            .send(self.client.put(url).json(&LabelsBody { labels }))
            .await?;
        Ok(response.image.into())
    }

    async fn delete_image(&self, image_id: u64) -> ttlfleet_cloud::Result<()> {
        let url = self.url(&format!("/images/{}", image_id));
        self.send_empty(self.client.delete(url)).await?;
        Ok(())
    }

    async fn get_server_type(&self, name: &str) -> ttlfleet_cloud::Result<Option<ServerType>> {
        let request = self
            .client
            .get(self.url("/server_types"))
            .query(&[("name", name)]);
        let page: ListPage = self.send(request).await?;
        Ok(page.server_types.into_iter().next().map(ServerType::from))
    }

    async fn get_action(&self, action_id: u64) -> ttlfleet_cloud::Result<Action> {
        let url = self.url(&format!("/actions/{}", action_id));
        let response: ActionEnvelope = self.send(self.client.get(url)).await?;
        Ok(response.action.into())
    }
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    code: String,
    message: String,
}

/// Union of every list response the client reads
#[derive(Debug, Default, Deserialize)]
struct ListPage {
    #[serde(default)]
    servers: Vec<ApiServer>,
    #[serde(default)]
    images: Vec<ApiImage>,
    #[serde(default)]
    server_types: Vec<ApiServerType>,
    meta: Option<ApiMeta>,
}

#[derive(Debug, Deserialize)]
struct ApiMeta {
    pagination: Option<ApiPagination>,
}

#[derive(Debug, Deserialize)]
struct ApiPagination {
    next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiServer {
    id: u64,
    name: String,
    status: ServerStatus,
    created: DateTime<Utc>,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    labels: Labels,
    server_type: ApiServerType,
    image: Option<ApiImage>,
    public_net: ApiPublicNet,
}

#[derive(Debug, Deserialize)]
struct ApiPublicNet {
    ipv4: Option<ApiIpv4>,
    ipv6: Option<ApiIpv6>,
}

#[derive(Debug, Deserialize)]
struct ApiIpv4 {
    ip: Ipv4Addr,
    dns_ptr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiIpv6 {
    ip: String,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    id: u64,
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    image_type: ImageType,
    #[serde(default)]
    labels: Labels,
    created: DateTime<Utc>,
    #[serde(default)]
    protection: Protection,
}

#[derive(Debug, Deserialize)]
struct ApiServerType {
    id: u64,
    name: String,
    cores: u32,
    memory: f64,
    disk: u64,
}

#[derive(Debug, Deserialize)]
struct ApiAction {
    id: u64,
    command: String,
    status: ActionStatus,
    progress: u8,
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ActionEnvelope {
    action: ApiAction,
}

#[derive(Debug, Deserialize)]
struct ServerEnvelope {
    server: ApiServer,
}

#[derive(Debug, Deserialize)]
struct ImageEnvelope {
    image: ApiImage,
}

#[derive(Debug, Deserialize)]
struct ApiCreateServerResponse {
    server: ApiServer,
    action: Option<ApiAction>,
}

#[derive(Debug, Deserialize)]
struct ApiCreateImageResponse {
    image: ApiImage,
    action: ApiAction,
}

#[derive(Debug, Serialize)]
struct ApiCreateServer<'a> {
    name: &'a str,
    server_type: &'a str,
    image: u64,
    location: &'a str,
    start_after_create: bool,
    labels: &'a Labels,
    #[serde(skip_serializing_if = "no_items")]
    networks: &'a [u64],
    #[serde(skip_serializing_if = "no_items")]
    ssh_keys: &'a [String],
}

fn no_items<T>(items: &&[T]) -> bool {
    items.is_empty()
}

#[derive(Debug, Serialize)]
struct ApiCreateImage<'a> {
    description: &'a str,
    r#type: &'a str,
    labels: &'a Labels,
}

#[derive(Debug, Serialize)]
struct LabelsBody<'a> {
    labels: &'a Labels,
}

impl From<ApiServer> for Server {
    fn from(s: ApiServer) -> Self {
        let public_net = PublicNet {
            ipv4: s.public_net.ipv4.as_ref().map(|v4| v4.ip),
            ipv4_dns_ptr: s.public_net.ipv4.and_then(|v4| v4.dns_ptr),
            ipv6_network: s.public_net.ipv6.map(|v6| v6.ip),
        };
        Server {
            id: s.id,
            name: s.name,
            status: s.status,
            server_type: s.server_type.name,
            image: s.image.map(Image::from),
            locked: s.locked,
            public_net,
            labels: s.labels,
            created: s.created,
        }
    }
}

impl From<ApiImage> for Image {
    fn from(i: ApiImage) -> Self {
        Image {
            id: i.id,
            name: i.name,
            description: i.description,
            image_type: i.image_type,
            labels: i.labels,
            created: i.created,
            protection: i.protection,
        }
    }
}

impl From<ApiServerType> for ServerType {
    fn from(t: ApiServerType) -> Self {
        ServerType {
            id: t.id,
            name: t.name,
            cores: t.cores,
            memory_gb: t.memory,
            disk_gb: t.disk,
        }
    }
}

impl From<ApiAction> for Action {
    fn from(a: ApiAction) -> Self {
        Action {
            id: a.id,
            command: a.command,
            status: a.status,
            progress: a.progress,
            error: a.error.map(|e| format!("{}: {}", e.code, e.message)),
        }
    }
}
