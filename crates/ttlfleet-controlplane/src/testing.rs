//! In-memory compute and DNS provider for tests

use crate::config::{ControlPlaneConfig, DnsSettings};
use crate::control::ControlPlane;
use crate::error::Result;
use crate::labels;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use ttlfleet_cloud::{
    Action, ActionStatus, CloudError, ComputeProvider, CreateImageRequest, CreateServerRequest,
    CreatedImage, CreatedServer, DnsProvider, DnsRecord, Image, ImageType, LabelSelector, Labels,
    Protection, PublicNet, Server, ServerStatus, ServerType,
};

/// How actions started on the fake provider end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Succeed,
    Fail(String),
    /// Never leaves the running state
    Hang,
}

#[derive(Debug, Clone)]
enum Injected {
    Api(String),
    NotFound,
}

struct PendingAction {
    action: Action,
    polls_left: u32,
    outcome: ActionOutcome,
}

struct State {
    next_id: u64,
    servers: BTreeMap<u64, Server>,
    images: BTreeMap<u64, Image>,
    actions: HashMap<u64, PendingAction>,
    server_types: Vec<ServerType>,
    records: BTreeMap<String, DnsRecord>,
    dns_ptrs: Vec<(u64, String, Option<String>)>,
    calls: Vec<String>,
    failures: HashMap<String, Injected>,
    locked_reads: HashMap<u64, u32>,
    lock_after_snapshot: u32,
    action_polls: u32,
    action_outcome: ActionOutcome,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn start_action(&mut self, command: &str) -> Action {
        let action = Action {
            id: self.next_id(),
            command: command.to_string(),
            status: ActionStatus::Running,
            progress: 0,
            error: None,
        };
        self.actions.insert(
            action.id,
            PendingAction {
                action: action.clone(),
                polls_left: self.action_polls,
                outcome: self.action_outcome.clone(),
            },
        );
        action
    }

    fn server_id(&self, name: &str) -> Option<u64> {
        self.servers
            .values()
            .find(|s| s.name == name)
            .map(|s| s.id)
    }
}

/// Compute and DNS provider backed by in-memory maps
///
/// Every trait call is recorded as `"<method>:<argument>"`. Failures can be
/// injected per method name.
pub struct FakeCloud {
    state: Mutex<State>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        let server_types = ["cx11", "cx21", "cx31"]
            .iter()
            .enumerate()
            .map(|(i, name)| ServerType {
                id: i as u64 + 1,
                name: name.to_string(),
                cores: 1 << i,
                memory_gb: f64::from(2u32 << i),
                disk_gb: 20 << i,
            })
            .collect();

        Arc::new(Self {
            state: Mutex::new(State {
                next_id: 0,
                servers: BTreeMap::new(),
                images: BTreeMap::new(),
                actions: HashMap::new(),
                server_types,
                records: BTreeMap::new(),
                dns_ptrs: Vec::new(),
                calls: Vec::new(),
                failures: HashMap::new(),
                locked_reads: HashMap::new(),
                lock_after_snapshot: 0,
                action_polls: 1,
                action_outcome: ActionOutcome::Succeed,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Build a control plane using this fake for compute and DNS
    pub fn control_plane(self: &Arc<Self>, config: ControlPlaneConfig) -> Result<ControlPlane> {
        let dns = config
            .dns
            .as_ref()
            .map(|_| self.clone() as Arc<dyn DnsProvider>);
        ControlPlane::new(config, self.clone(), dns)
    }

    fn record_call(&self, method: &str, arg: impl std::fmt::Display) -> ttlfleet_cloud::Result<()> {
        let mut state = self.state();
        state.calls.push(format!("{}:{}", method, arg));
        match state.failures.get(method) {
            Some(Injected::Api(message)) => Err(CloudError::api("fake_failure", message.clone())),
            Some(Injected::NotFound) => Err(CloudError::ResourceNotFound(format!(
                "{} target {}",
                method, arg
            ))),
            None => Ok(()),
        }
    }

    // ============ Seeding ============

    pub fn add_image(
        &self,
        image_type: ImageType,
        labels: Labels,
        created: DateTime<Utc>,
    ) -> Image {
        let mut state = self.state();
        let id = state.next_id();
        let image = Image {
            id,
            name: None,
            description: format!("image-{}", id),
            image_type,
            labels,
            created,
            protection: Protection::default(),
        };
        state.images.insert(id, image.clone());
        image
    }

    pub fn add_blueprint(&self) -> Image {
        let mut labels = Labels::new();
        labels.insert(labels::ACTIVE_BLUEPRINT.to_string(), "true".to_string());
        self.add_image(ImageType::Snapshot, labels, Utc::now())
    }

    pub fn add_snapshot(
        &self,
        service: &str,
        server_type: Option<&str>,
        created: DateTime<Utc>,
    ) -> Image {
        let mut labels = labels::snapshot_labels(service, server_type.unwrap_or_default());
        if server_type.is_none() {
            labels.remove(labels::SERVER_TYPE);
        }
        self.add_image(ImageType::Snapshot, labels, created)
    }

    /// Add a running cx11 server with public IPv4 and IPv6
    pub fn add_server(&self, name: &str, labels: Labels) -> Server {
        let mut state = self.state();
        let id = state.next_id();
        let server = Server {
            id,
            name: name.to_string(),
            status: ServerStatus::Running,
            server_type: "cx11".to_string(),
            image: None,
            locked: false,
            public_net: fake_public_net(id),
            labels,
            created: Utc::now(),
        };
        state.servers.insert(id, server.clone());
        server
    }

    pub fn set_status(&self, name: &str, status: ServerStatus) {
        if let Some(server) = self.state().servers.values_mut().find(|s| s.name == name) {
            server.status = status;
        }
    }

    /// Make `image_id` the boot image of server `name`
    pub fn set_boot_image(&self, name: &str, image_id: u64) {
        let mut state = self.state();
        let image = state.images.get(&image_id).cloned();
        if let Some(server) = state.servers.values_mut().find(|s| s.name == name) {
            server.image = image;
        }
    }

    pub fn protect_image(&self, image_id: u64) {
        if let Some(image) = self.state().images.get_mut(&image_id) {
            image.protection.delete = true;
        }
    }

    // ============ Behavior ============

    /// Fail every call of `method` with an API error
    pub fn fail(&self, method: &str, message: &str) {
        self.state()
            .failures
            .insert(method.to_string(), Injected::Api(message.to_string()));
    }

    /// Fail every call of `method` with a not-found error
    pub fn fail_not_found(&self, method: &str) {
        self.state()
            .failures
            .insert(method.to_string(), Injected::NotFound);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// After a snapshot, report the server as locked for this many reads
    pub fn lock_after_snapshot(&self, reads: u32) {
        self.state().lock_after_snapshot = reads;
    }

    /// Number of `get_action` polls before an action finishes
    pub fn set_action_polls(&self, polls: u32) {
        self.state().action_polls = polls;
    }

    pub fn set_action_outcome(&self, outcome: ActionOutcome) {
        self.state().action_outcome = outcome;
    }

    // ============ Inspection ============

    pub fn server(&self, name: &str) -> Option<Server> {
        let state = self.state();
        state.server_id(name).and_then(|id| state.servers.get(&id).cloned())
    }

    pub fn image(&self, image_id: u64) -> Option<Image> {
        self.state().images.get(&image_id).cloned()
    }

    pub fn images(&self) -> Vec<Image> {
        self.state().images.values().cloned().collect()
    }

    /// DNS records by ID
    pub fn dns_records(&self) -> BTreeMap<String, DnsRecord> {
        self.state().records.clone()
    }

    /// `(server_id, ip, dns_ptr)` of every reverse DNS change
    pub fn dns_ptrs(&self) -> Vec<(u64, String, Option<String>)> {
        self.state().dns_ptrs.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        let prefix = format!("{}:", method);
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }
}

fn fake_public_net(id: u64) -> PublicNet {
    PublicNet {
        ipv4: Some(Ipv4Addr::new(203, 0, 113, (id % 250) as u8 + 1)),
        ipv4_dns_ptr: None,
        ipv6_network: Some(format!("2001:db8:{:x}::/64", id)),
    }
}

fn not_found(kind: &str, id: impl std::fmt::Display) -> CloudError {
    CloudError::ResourceNotFound(format!("{} {}", kind, id))
}

#[async_trait]
impl ComputeProvider for FakeCloud {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_servers(
        &self,
        selector: Option<&LabelSelector>,
    ) -> ttlfleet_cloud::Result<Vec<Server>> {
        let arg = selector.map(|s| s.to_string()).unwrap_or_default();
        self.record_call("list_servers", arg)?;
        Ok(self
            .state()
            .servers
            .values()
            .filter(|s| selector.is_none_or(|sel| sel.matches(&s.labels)))
            .cloned()
            .collect())
    }

    async fn get_server(&self, name: &str) -> ttlfleet_cloud::Result<Option<Server>> {
        self.record_call("get_server", name)?;
        let mut state = self.state();
        let Some(id) = state.server_id(name) else {
            return Ok(None);
        };
        let locked = match state.locked_reads.get_mut(&id) {
            Some(reads) if *reads > 0 => {
                *reads -= 1;
                true
            }
            _ => false,
        };
        let mut server = state.servers.get(&id).cloned();
        if let Some(server) = server.as_mut() {
            server.locked = locked;
        }
        Ok(server)
    }

    async fn create_server(
        &self,
        request: &CreateServerRequest,
    ) -> ttlfleet_cloud::Result<CreatedServer> {
        self.record_call("create_server", &request.name)?;
        let mut state = self.state();
        if state.server_id(&request.name).is_some() {
            return Err(CloudError::api(
                "uniqueness_error",
                format!("server name {} is already used", request.name),
            ));
        }
        let image = state
            .images
            .get(&request.image)
            .cloned()
            .ok_or_else(|| not_found("image", request.image))?;

        let id = state.next_id();
        let server = Server {
            id,
            name: request.name.clone(),
            status: ServerStatus::Running,
            server_type: request.server_type.clone(),
            image: Some(image),
            locked: false,
            public_net: fake_public_net(id),
            labels: request.labels.clone(),
            created: Utc::now(),
        };
        state.servers.insert(id, server.clone());
        let action = state.start_action("create_server");
        Ok(CreatedServer {
            server,
            action: Some(action),
        })
    }

    async fn update_server_labels(
        &self,
        server_id: u64,
        labels: &Labels,
    ) -> ttlfleet_cloud::Result<Server> {
        self.record_call("update_server_labels", server_id)?;
        let mut state = self.state();
        let server = state
            .servers
            .get_mut(&server_id)
            .ok_or_else(|| not_found("server", server_id))?;
        server.labels = labels.clone();
        Ok(server.clone())
    }

    async fn delete_server(&self, server_id: u64) -> ttlfleet_cloud::Result<Action> {
        self.record_call("delete_server", server_id)?;
        let mut state = self.state();
        state
            .servers
            .remove(&server_id)
            .ok_or_else(|| not_found("server", server_id))?;
        Ok(state.start_action("delete_server"))
    }

    async fn shutdown_server(&self, server_id: u64) -> ttlfleet_cloud::Result<Action> {
        self.record_call("shutdown_server", server_id)?;
        let mut state = self.state();
        let server = state
            .servers
            .get_mut(&server_id)
            .ok_or_else(|| not_found("server", server_id))?;
        server.status = ServerStatus::Off;
        Ok(state.start_action("shutdown_server"))
    }

    async fn reboot_server(&self, server_id: u64) -> ttlfleet_cloud::Result<Action> {
        self.record_call("reboot_server", server_id)?;
        let mut state = self.state();
        if !state.servers.contains_key(&server_id) {
            return Err(not_found("server", server_id));
        }
        Ok(state.start_action("reboot_server"))
    }

    async fn create_image(
        &self,
        server_id: u64,
        request: &CreateImageRequest,
    ) -> ttlfleet_cloud::Result<CreatedImage> {
        self.record_call("create_image", server_id)?;
        let mut state = self.state();
        if !state.servers.contains_key(&server_id) {
            return Err(not_found("server", server_id));
        }
        let id = state.next_id();
        let image = Image {
            id,
            name: None,
            description: request.description.clone(),
            image_type: ImageType::Snapshot,
            labels: request.labels.clone(),
            created: Utc::now(),
            protection: Protection::default(),
        };
        state.images.insert(id, image.clone());
        let reads = state.lock_after_snapshot;
        state.locked_reads.insert(server_id, reads);
        let action = state.start_action("create_image");
        Ok(CreatedImage { image, action })
    }

    async fn change_dns_ptr(
        &self,
        server_id: u64,
        ip: &str,
        dns_ptr: Option<&str>,
    ) -> ttlfleet_cloud::Result<Action> {
        self.record_call("change_dns_ptr", ip)?;
        let mut state = self.state();
        state
            .dns_ptrs
            .push((server_id, ip.to_string(), dns_ptr.map(str::to_string)));
        Ok(state.start_action("change_dns_ptr"))
    }

    async fn list_images(
        &self,
        selector: Option<&LabelSelector>,
    ) -> ttlfleet_cloud::Result<Vec<Image>> {
        let arg = selector.map(|s| s.to_string()).unwrap_or_default();
        self.record_call("list_images", arg)?;
        Ok(self
            .state()
            .images
            .values()
            .filter(|i| selector.is_none_or(|sel| sel.matches(&i.labels)))
            .cloned()
            .collect())
    }

    async fn get_image(&self, image_id: u64) -> ttlfleet_cloud::Result<Option<Image>> {
        self.record_call("get_image", image_id)?;
        Ok(self.state().images.get(&image_id).cloned())
    }

    async fn update_image_labels(
        &self,
        image_id: u64,
        labels: &Labels,
    ) -> ttlfleet_cloud::Result<Image> {
        self.record_call("update_image_labels", image_id)?;
        let mut state = self.state();
        let image = state
            .images
            .get_mut(&image_id)
            .ok_or_else(|| not_found("image", image_id))?;
        image.labels = labels.clone();
        Ok(image.clone())
    }

    async fn delete_image(&self, image_id: u64) -> ttlfleet_cloud::Result<()> {
        self.record_call("delete_image", image_id)?;
        let mut state = self.state();
        let image = state
            .images
            .get(&image_id)
            .ok_or_else(|| not_found("image", image_id))?;
        if image.protection.delete {
            return Err(CloudError::api("protected", "image is delete protected"));
        }
        state.images.remove(&image_id);
        Ok(())
    }

    async fn get_server_type(&self, name: &str) -> ttlfleet_cloud::Result<Option<ServerType>> {
        self.record_call("get_server_type", name)?;
        Ok(self
            .state()
            .server_types
            .iter()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn get_action(&self, action_id: u64) -> ttlfleet_cloud::Result<Action> {
        self.record_call("get_action", action_id)?;
        let mut state = self.state();
        let pending = state
            .actions
            .get_mut(&action_id)
            .ok_or_else(|| not_found("action", action_id))?;

        if pending.outcome != ActionOutcome::Hang && pending.polls_left > 0 {
            pending.polls_left -= 1;
        }
        if pending.outcome == ActionOutcome::Hang || pending.polls_left > 0 {
            pending.action.progress = pending.action.progress.saturating_add(10).min(90);
            return Ok(pending.action.clone());
        }

        match &pending.outcome {
            ActionOutcome::Fail(message) => {
                pending.action.status = ActionStatus::Error;
                pending.action.error = Some(message.clone());
            }
            _ => {
                pending.action.status = ActionStatus::Success;
                pending.action.progress = 100;
            }
        }
        Ok(pending.action.clone())
    }
}

#[async_trait]
impl DnsProvider for FakeCloud {
    fn name(&self) -> &str {
        "fake-dns"
    }

    async fn create_record(&self, record: &DnsRecord) -> ttlfleet_cloud::Result<String> {
        self.record_call("create_record", &record.name)?;
        let mut state = self.state();
        let id = format!("rec-{}", state.next_id());
        state.records.insert(id.clone(), record.clone());
        Ok(id)
    }

    async fn delete_record(&self, record_id: &str) -> ttlfleet_cloud::Result<()> {
        self.record_call("delete_record", record_id)?;
        self.state()
            .records
            .remove(record_id)
            .map(|_| ())
            .ok_or_else(|| not_found("record", record_id))
    }
}

/// Configuration with DNS enabled and millisecond poll intervals
pub fn test_config() -> ControlPlaneConfig {
    ControlPlaneConfig {
        unlock_poll_interval: Duration::from_millis(10),
        unlock_timeout: Duration::from_secs(2),
        action_poll_interval: Duration::from_millis(10),
        action_timeout: Some(Duration::from_secs(5)),
        ..ControlPlaneConfig::default()
    }
    .with_dns(DnsSettings::new("zone-1", "example.com"))
}
