//! Multus network attachment annotation types

use serde::{Deserialize, Serialize};

/// Pod annotation requesting extra interfaces
pub const NETWORKS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/networks";

/// Pod annotation in which multus reports attached interfaces
pub const NETWORK_STATUS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/network-status";

/// API group of NetworkAttachmentDefinition
pub const NAD_GROUP: &str = "k8s.cni.cncf.io";

/// API version of NetworkAttachmentDefinition
pub const NAD_VERSION: &str = "v1";

/// Kind of NetworkAttachmentDefinition
pub const NAD_KIND: &str = "NetworkAttachmentDefinition";

/// One entry of the [`NETWORKS_ANNOTATION`] list
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct NetworkSelectionElement {
    /// Attachment definition name
    pub name: String,
    /// Attachment definition namespace
    pub namespace: String,
}

/// One entry of the [`NETWORK_STATUS_ANNOTATION`] list
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct NetworkStatus {
    /// `<namespace>/<attachment>` (or the cluster network name)
    pub name: String,
    /// Interface name inside the pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Addresses assigned on this interface
    #[serde(default)]
    pub ips: Vec<String>,
    /// Hardware address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Whether this is the pod's default network
    #[serde(default)]
    pub default: bool,
}

/// Key under which an attachment is reported: `<namespace>/<name>`
pub fn attachment_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_list_matches_multus_format() {
        let list = vec![NetworkSelectionElement {
            name: "internalapi".to_string(),
            namespace: "openstack".to_string(),
        }];
        assert_eq!(
            serde_json::to_string(&list).unwrap(),
            r#"[{"name":"internalapi","namespace":"openstack"}]"#
        );
    }

    #[test]
    fn network_status_parses_multus_annotation() {
        let raw = r#"[
            {"name":"ovn-kubernetes","interface":"eth0","ips":["10.128.0.5"],"default":true},
            {"name":"openstack/internalapi","interface":"net1","ips":["172.17.0.30"],"mac":"aa:bb"}
        ]"#;
        let parsed: Vec<NetworkStatus> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].default);
        assert_eq!(parsed[1].name, attachment_key("openstack", "internalapi"));
        assert_eq!(parsed[1].ips, vec!["172.17.0.30"]);
    }
}
