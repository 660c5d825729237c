//! Label schema
//!
//! All control plane state lives in provider labels. Servers carry
//! ownership, service name, TTL and the IDs of their forward DNS records.
//! Snapshots carry ownership, service name and the server type they were
//! taken from. The blueprint image carries the active-blueprint marker.

use chrono::{DateTime, Utc};
use ttlfleet_cloud::{LabelSelector, Labels, RecordType};

pub const MANAGED_BY: &str = "ttlfleet.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "ttlfleet";
pub const SERVICE: &str = "ttlfleet.io/service";
/// Expiry as Unix seconds
pub const TTL: &str = "ttlfleet.io/ttl";
pub const ACTIVE_BLUEPRINT: &str = "ttlfleet.io/active-blueprint";
pub const SERVER_TYPE: &str = "ttlfleet.io/server-type";
pub const DNS_A_RECORD_ID: &str = "ttlfleet.io/dns-a-record-id";
pub const DNS_AAAA_RECORD_ID: &str = "ttlfleet.io/dns-aaaa-record-id";

/// Selector matching every resource owned by the control plane
pub fn managed_selector() -> LabelSelector {
    LabelSelector::equals(MANAGED_BY, MANAGED_BY_VALUE)
}

/// Selector matching the active blueprint image
pub fn blueprint_selector() -> LabelSelector {
    LabelSelector::equals(ACTIVE_BLUEPRINT, "true")
}

pub fn is_managed(labels: &Labels) -> bool {
    labels.get(MANAGED_BY).map(String::as_str) == Some(MANAGED_BY_VALUE)
}

pub fn is_active_blueprint(labels: &Labels) -> bool {
    labels.get(ACTIVE_BLUEPRINT).map(String::as_str) == Some("true")
}

pub fn service(labels: &Labels) -> Option<&str> {
    labels.get(SERVICE).map(String::as_str)
}

pub fn server_type(labels: &Labels) -> Option<&str> {
    labels
        .get(SERVER_TYPE)
        .map(String::as_str)
        .filter(|t| !t.is_empty())
}

/// State of the TTL label of a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtlLabel {
    Missing,
    /// Present but not a Unix timestamp
    Invalid(String),
    At(DateTime<Utc>),
}

pub fn read_ttl(labels: &Labels) -> TtlLabel {
    let Some(raw) = labels.get(TTL) else {
        return TtlLabel::Missing;
    };
    match raw.trim().parse::<i64>() {
        Ok(secs) => match DateTime::<Utc>::from_timestamp(secs, 0) {
            Some(at) => TtlLabel::At(at),
            None => TtlLabel::Invalid(raw.clone()),
        },
        Err(_) => TtlLabel::Invalid(raw.clone()),
    }
}

pub fn set_ttl(labels: &mut Labels, at: DateTime<Utc>) {
    labels.insert(TTL.to_string(), at.timestamp().to_string());
}

/// Labels of a freshly provisioned server
pub fn instance_labels(service: &str, ttl: DateTime<Utc>) -> Labels {
    let mut labels = Labels::new();
    labels.insert(MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(SERVICE.to_string(), service.to_string());
    set_ttl(&mut labels, ttl);
    labels
}

/// Labels of a termination snapshot
pub fn snapshot_labels(service: &str, server_type: &str) -> Labels {
    let mut labels = Labels::new();
    labels.insert(MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(SERVICE.to_string(), service.to_string());
    labels.insert(SERVER_TYPE.to_string(), server_type.to_string());
    labels
}

/// Forward DNS record IDs persisted on a server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsRecordIds {
    pub a: Option<String>,
    pub aaaa: Option<String>,
}

impl DnsRecordIds {
    pub fn from_labels(labels: &Labels) -> Self {
        let read = |key: &str| labels.get(key).filter(|id| !id.is_empty()).cloned();
        Self {
            a: read(DNS_A_RECORD_ID),
            aaaa: read(DNS_AAAA_RECORD_ID),
        }
    }

    pub fn apply(&self, labels: &mut Labels) {
        if let Some(id) = &self.a {
            labels.insert(DNS_A_RECORD_ID.to_string(), id.clone());
        }
        if let Some(id) = &self.aaaa {
            labels.insert(DNS_AAAA_RECORD_ID.to_string(), id.clone());
        }
    }

    pub fn records(&self) -> impl Iterator<Item = (RecordType, &str)> {
        self.a
            .as_deref()
            .map(|id| (RecordType::A, id))
            .into_iter()
            .chain(self.aaaa.as_deref().map(|id| (RecordType::Aaaa, id)))
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_none() && self.aaaa.is_none()
    }
}
