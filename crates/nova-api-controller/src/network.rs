//! Network attachment readiness
//!
//! Multus reports the interfaces it attached to a pod in the
//! `k8s.v1.cni.cncf.io/network-status` annotation. An attachment is ready
//! once at least as many ready pods report an address on it as the
//! StatefulSet has ready replicas (and at least one). Pods that are not
//! ready are ignored.

use std::collections::BTreeMap;

use nova_common::crd::network::attachment_key;

/// Interfaces reported by one pod
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodInterfaces {
    /// Pod name
    pub pod: String,
    /// Pod reports its Ready condition True
    pub ready: bool,
    /// IPs per `<namespace>/<attachment>`
    pub ips: BTreeMap<String, Vec<String>>,
}

/// Result of tracking the requested attachments
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttachmentReport {
    /// IPs per `<namespace>/<attachment>`, in pod name order
    pub ips: BTreeMap<String, Vec<String>>,
    /// Requested attachment names still missing addresses, sorted
    pub missing: Vec<String>,
}

impl AttachmentReport {
    /// Whether every requested attachment has its addresses
    pub fn is_ready(&self) -> bool {
        self.missing.is_empty()
    }

    /// Message detail for `NetworkAttachmentsReady=False`
    pub fn missing_detail(&self) -> String {
        format!(
            "not all pods have interfaces with ips as configured in NetworkAttachments: [{}]",
            self.missing.join(" ")
        )
    }
}

/// Derive attachment readiness from pod interface state.
///
/// Pods are visited in name order regardless of input order, so the IP
/// lists are stable across passes. Only attachments that were requested
/// appear in the report; an attachment with no addresses is omitted from
/// `ips` and listed in `missing`.
pub fn track(
    namespace: &str,
    requested: &[String],
    ready_count: i32,
    pods: &[PodInterfaces],
) -> AttachmentReport {
    let mut ordered: Vec<&PodInterfaces> = pods.iter().filter(|p| p.ready).collect();
    ordered.sort_by(|a, b| a.pod.cmp(&b.pod));

    let needed = usize::try_from(ready_count.max(1)).unwrap_or(1);
    let mut report = AttachmentReport::default();

    for name in requested {
        let key = attachment_key(namespace, name);
        let mut ips = Vec::new();
        let mut reporting = 0usize;
        for pod in &ordered {
            let pod_ips = pod.ips.get(&key).map(Vec::as_slice).unwrap_or_default();
            if !pod_ips.is_empty() {
                reporting += 1;
                ips.extend(pod_ips.iter().cloned());
            }
        }
        if reporting < needed {
            report.missing.push(name.clone());
        }
        if !ips.is_empty() {
            report.ips.insert(key, ips);
        }
    }

    report.missing.sort();
    report.missing.dedup();
    report
}
