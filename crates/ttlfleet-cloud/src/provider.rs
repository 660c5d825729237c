//! Provider trait definitions

use crate::action::Action;
use crate::error::Result;
use crate::label::{LabelSelector, Labels};
use crate::model::{DnsRecord, Image, Server, ServerType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Compute provider abstraction trait
///
/// Every call is a single stateless request against the provider, so an
/// implementation can be shared between the request path and the reaper.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Returns the provider name (e.g. "hetzner-cloud")
    fn name(&self) -> &str;

    /// List servers, optionally narrowed by a label selector
    async fn list_servers(&self, selector: Option<&LabelSelector>) -> Result<Vec<Server>>;

    /// Get a server by its unique name
    async fn get_server(&self, name: &str) -> Result<Option<Server>>;

    /// Create a server
    async fn create_server(&self, request: &CreateServerRequest) -> Result<CreatedServer>;

    /// Replace the complete label map of a server
    async fn update_server_labels(&self, server_id: u64, labels: &Labels) -> Result<Server>;

    /// Delete a server
    async fn delete_server(&self, server_id: u64) -> Result<Action>;

    /// Request a graceful (ACPI) shutdown
    async fn shutdown_server(&self, server_id: u64) -> Result<Action>;

    /// Request a soft reboot
    async fn reboot_server(&self, server_id: u64) -> Result<Action>;

    /// Capture an image of a server's disk
    async fn create_image(
        &self,
        server_id: u64,
        request: &CreateImageRequest,
    ) -> Result<CreatedImage>;

    /// Set (or reset with `None`) the reverse DNS entry of a server address
    async fn change_dns_ptr(
        &self,
        server_id: u64,
        ip: &str,
        dns_ptr: Option<&str>,
    ) -> Result<Action>;

    /// List images, optionally narrowed by a label selector
    async fn list_images(&self, selector: Option<&LabelSelector>) -> Result<Vec<Image>>;

    /// Get an image by ID
    async fn get_image(&self, image_id: u64) -> Result<Option<Image>>;

    /// Replace the complete label map of an image
    async fn update_image_labels(&self, image_id: u64, labels: &Labels) -> Result<Image>;

    /// Delete an image
    async fn delete_image(&self, image_id: u64) -> Result<()>;

    /// Look up a server type in the provider catalog
    async fn get_server_type(&self, name: &str) -> Result<Option<ServerType>>;

    /// Read the current state of an action
    async fn get_action(&self, action_id: u64) -> Result<Action>;
}

/// DNS provider abstraction trait
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Returns the provider name (e.g. "hetzner-dns")
    fn name(&self) -> &str;

    /// Create a record and return its provider-assigned ID
    async fn create_record(&self, record: &DnsRecord) -> Result<String>;

    /// Delete a record by ID
    async fn delete_record(&self, record_id: &str) -> Result<()>;
}

/// Options for creating a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub server_type: String,
    /// Image ID to boot from
    pub image: u64,
    pub location: String,
    pub start_after_create: bool,
    pub labels: Labels,
    /// Private network IDs to attach
    pub networks: Vec<u64>,
    /// SSH key names or IDs
    pub ssh_keys: Vec<String>,
}

/// Result of a server creation
#[derive(Debug, Clone)]
pub struct CreatedServer {
    pub server: Server,
    pub action: Option<Action>,
}

/// Options for capturing an image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateImageRequest {
    pub description: String,
    pub labels: Labels,
}

/// Result of an image capture
#[derive(Debug, Clone)]
pub struct CreatedImage {
    pub image: Image,
    pub action: Action,
}
