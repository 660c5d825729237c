//! Control plane error types

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use ttlfleet_cloud::CloudError;

/// Provider call that failed, used to tell the caller which step broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderOp {
    ListServers,
    GetServer,
    CreateServer,
    UpdateServerLabels,
    DeleteServer,
    ShutdownServer,
    RebootServer,
    CreateSnapshot,
    ChangeDnsPtr,
    ListImages,
    GetImage,
    UpdateImageLabels,
    DeleteImage,
    GetServerType,
    CreateDnsRecord,
    DeleteDnsRecord,
}

impl std::fmt::Display for ProviderOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderOp::ListServers => "list servers",
            ProviderOp::GetServer => "get server",
            ProviderOp::CreateServer => "create server",
            ProviderOp::UpdateServerLabels => "update labels of server",
            ProviderOp::DeleteServer => "delete server",
            ProviderOp::ShutdownServer => "shut down server",
            ProviderOp::RebootServer => "reboot server",
            ProviderOp::CreateSnapshot => "snapshot server",
            ProviderOp::ChangeDnsPtr => "change reverse dns of server",
            ProviderOp::ListImages => "list images",
            ProviderOp::GetImage => "get image",
            ProviderOp::UpdateImageLabels => "update labels of image",
            ProviderOp::DeleteImage => "delete image",
            ProviderOp::GetServerType => "look up server type",
            ProviderOp::CreateDnsRecord => "create dns record for",
            ProviderOp::DeleteDnsRecord => "delete dns record",
        };
        write!(f, "{}", s)
    }
}

/// Error category, used by transports to pick a response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    NotManaged,
    Provider,
    Timeout,
    Policy,
    Conflict,
    Unauthorized,
    Forbidden,
}

/// Control plane errors
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("invalid ttl '{spec}': {reason}")]
    InvalidTtl { spec: String, reason: String },

    #[error(
        "invalid server name '{0}': use 1-63 lowercase letters, digits or '-', not starting or ending with '-'"
    )]
    InvalidName(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("server type {0} is invalid")]
    InvalidInstanceType(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unable to find active blueprint image")]
    BlueprintNotFound,

    #[error("unable to find previous snapshot for server {0}")]
    SnapshotNotFound(String),

    #[error("server {0} does not exist")]
    InstanceNotFound(String),

    #[error("server {0} is not managed by ttlfleet")]
    NotManaged(String),

    #[error("server {0} has no ttl label")]
    MissingTtl(String),

    #[error("server {name} cannot be set to {requested}: at most {limit} from now")]
    TtlBoundExceeded {
        name: String,
        requested: DateTime<Utc>,
        limit: String,
    },

    #[error("server {0} is still running")]
    InstanceStillRunning(String),

    #[error("termination of server {0} is already in progress")]
    AlreadyInProgress(String),

    #[error("timed out after {waited:?} waiting for server {name} to be unlocked")]
    UnlockTimeout { name: String, waited: Duration },

    #[error("timed out after {waited:?} waiting to {op} {name}")]
    ActionTimeout {
        op: ProviderOp,
        name: String,
        waited: Duration,
    },

    #[error("failed to {op} {resource}: {source}")]
    Provider {
        op: ProviderOp,
        resource: String,
        #[source]
        source: CloudError,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::InvalidTtl { .. }
            | ControlError::InvalidName(_)
            | ControlError::MissingField(_)
            | ControlError::InvalidInstanceType(_)
            | ControlError::InvalidConfig(_) => ErrorKind::Validation,
            ControlError::BlueprintNotFound
            | ControlError::SnapshotNotFound(_)
            | ControlError::InstanceNotFound(_) => ErrorKind::NotFound,
            ControlError::NotManaged(_) => ErrorKind::NotManaged,
            ControlError::MissingTtl(_)
            | ControlError::TtlBoundExceeded { .. }
            | ControlError::InstanceStillRunning(_) => ErrorKind::Policy,
            ControlError::AlreadyInProgress(_) => ErrorKind::Conflict,
            ControlError::UnlockTimeout { .. } | ControlError::ActionTimeout { .. } => {
                ErrorKind::Timeout
            }
            ControlError::Provider { .. } => ErrorKind::Provider,
            ControlError::Unauthorized(_) => ErrorKind::Unauthorized,
            ControlError::Forbidden(_) => ErrorKind::Forbidden,
        }
    }

    pub(crate) fn invalid_ttl(spec: &str, reason: impl Into<String>) -> Self {
        ControlError::InvalidTtl {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

/// `map_err` adapter wrapping a provider error with the failed operation
pub(crate) fn provider_err(
    op: ProviderOp,
    resource: impl Into<String>,
) -> impl FnOnce(CloudError) -> ControlError {
    let resource = resource.into();
    move |source| ControlError::Provider {
        op,
        resource,
        source,
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
