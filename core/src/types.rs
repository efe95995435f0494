//! DTOs for the label and workload resources.
//!
//! # Design
//! Only the fields the wrappers read or write are modelled; unknown fields in
//! server bodies are ignored. The mock PCE defines its own copies and the
//! integration tests catch drift between the two.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A label as returned by the PCE.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub href: String,
    pub key: String,
    pub value: String,
}

/// Request payload for creating a label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLabel {
    pub key: String,
    pub value: String,
}

/// Request payload for renaming a label. The key cannot change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLabel {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelRef {
    pub href: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub address: String,
    pub cidr_block: u8,
    pub link_state: String,
}

/// A workload as returned by the PCE.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workload {
    pub href: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub interfaces: Vec<WorkloadInterface>,
    #[serde(default)]
    pub labels: Vec<LabelRef>,
}

impl Workload {
    /// True when `ip` is the public address or sits on any interface.
    pub fn has_address(&self, ip: &str) -> bool {
        self.public_ip.as_deref() == Some(ip)
            || self
                .interfaces
                .iter()
                .any(|interface| interface.address.as_deref() == Some(ip))
    }
}

/// Interface entry of a workload as reported by the PCE.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadInterface {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Request payload replacing a workload's labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadLabels {
    pub labels: Vec<LabelRef>,
}

/// Request payload registering an unmanaged workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnmanagedWorkload {
    pub name: String,
    pub hostname: String,
    pub public_ip: String,
    pub interfaces: Vec<Interface>,
    pub online: bool,
    pub labels: Vec<LabelRef>,
}

impl UnmanagedWorkload {
    /// One `eth0` interface carrying `ip` as a /32, reported online.
    pub fn new<I, S>(name: &str, hostname: &str, ip: &str, label_hrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            hostname: hostname.to_string(),
            public_ip: ip.to_string(),
            interfaces: vec![Interface {
                name: "eth0".to_string(),
                address: ip.to_string(),
                cidr_block: 32,
                link_state: "up".to_string(),
            }],
            online: true,
            labels: label_hrefs
                .into_iter()
                .map(|href| LabelRef { href: href.into() })
                .collect(),
        }
    }
}

/// Label hrefs grouped by key, then value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelIndex {
    by_key: BTreeMap<String, BTreeMap<String, String>>,
}

impl LabelIndex {
    pub fn new(labels: &[Label]) -> Self {
        let mut index = Self::default();
        for label in labels {
            index.insert(label);
        }
        index
    }

    pub fn insert(&mut self, label: &Label) {
        self.by_key
            .entry(label.key.clone())
            .or_default()
            .insert(label.value.clone(), label.href.clone());
    }

    pub fn href(&self, key: &str, value: &str) -> Option<&str> {
        self.by_key.get(key)?.get(value).map(String::as_str)
    }

    pub fn values(&self, key: &str) -> impl Iterator<Item = (&str, &str)> {
        self.by_key
            .get(key)
            .into_iter()
            .flat_map(|values| values.iter().map(|(v, h)| (v.as_str(), h.as_str())))
    }

    pub fn len(&self) -> usize {
        self.by_key.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(href: &str, key: &str, value: &str) -> Label {
        Label {
            href: href.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn unmanaged_workload_body_shape() {
        let wl = UnmanagedWorkload::new("db-1", "db-1.corp", "10.0.0.5", ["/orgs/1/labels/3"]);
        let json = serde_json::to_value(&wl).unwrap();
        assert_eq!(json["public_ip"], "10.0.0.5");
        assert_eq!(json["online"], true);
        assert_eq!(json["interfaces"][0]["name"], "eth0");
        assert_eq!(json["interfaces"][0]["cidr_block"], 32);
        assert_eq!(json["interfaces"][0]["link_state"], "up");
        assert_eq!(json["labels"][0]["href"], "/orgs/1/labels/3");
    }

    #[test]
    fn workload_tolerates_sparse_bodies() {
        let wl: Workload =
            serde_json::from_str(r#"{"href":"/orgs/1/workloads/9","agent":{"status":null}}"#).unwrap();
        assert_eq!(wl.href, "/orgs/1/workloads/9");
        assert!(wl.labels.is_empty());
        assert!(!wl.online);
    }

    #[test]
    fn workload_matches_public_or_interface_address() {
        let wl: Workload = serde_json::from_str(
            r#"{"href":"/orgs/1/workloads/2","public_ip":"10.0.0.1",
                "interfaces":[{"name":"eth1","address":"192.168.1.7","cidr_block":24}]}"#,
        )
        .unwrap();
        assert!(wl.has_address("10.0.0.1"));
        assert!(wl.has_address("192.168.1.7"));
        assert!(!wl.has_address("192.168.1.8"));
    }

    #[test]
    fn label_index_groups_by_key() {
        let index = LabelIndex::new(&[
            label("/orgs/1/labels/1", "role", "db"),
            label("/orgs/1/labels/2", "role", "web"),
            label("/orgs/1/labels/3", "env", "prod"),
        ]);
        assert_eq!(index.len(), 3);
        assert_eq!(index.href("role", "web"), Some("/orgs/1/labels/2"));
        assert_eq!(index.href("loc", "syd"), None);
        let roles: Vec<_> = index.values("role").map(|(v, _)| v).collect();
        assert_eq!(roles, ["db", "web"]);
    }
}
