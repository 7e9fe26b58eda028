//! Kubelet container naming scheme used by the docker runtime:
//! `k8s_{container}_{pod}_{namespace}_{uid}_{attempt}`, with an extra random
//! suffix field on older docker versions.

use crate::inspect::IdentityError;
use pkg_types::identity::WorkloadIdentity;

/// Prefix of every container name created by the kubelet.
pub const KUBERNETES_CONTAINER_PREFIX: &str = "k8s_";

/// Whether a docker container name was created by the kubelet.
pub fn is_kubernetes_container(name: &str) -> bool {
    name.trim_start_matches('/')
        .starts_with(KUBERNETES_CONTAINER_PREFIX)
}

/// Decode the owning workload from a kubelet container name.
pub fn parse_container_name(name: &str) -> Result<WorkloadIdentity, IdentityError> {
    // Docker reports names with a leading "/".
    let trimmed = name.trim_start_matches('/');
    let parts: Vec<&str> = trimmed.split('_').collect();
    if parts.len() != 6 && parts.len() != 7 {
        return Err(IdentityError::Parse(name.to_string()));
    }
    if parts[1..5].iter().any(|p| p.is_empty()) {
        return Err(IdentityError::Parse(name.to_string()));
    }
    Ok(WorkloadIdentity {
        container: parts[1].to_string(),
        pod: parts[2].to_string(),
        namespace: parts[3].to_string(),
        uid: parts[4].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_six_fields() {
        let id = parse_container_name("/k8s_nginx_web-0_default_abc-123_0").unwrap();
        assert_eq!(id.container, "nginx");
        assert_eq!(id.pod, "web-0");
        assert_eq!(id.namespace, "default");
        assert_eq!(id.uid, "abc-123");
        assert!(id.is_complete());
    }

    #[test]
    fn test_seven_fields_with_random_suffix() {
        let id = parse_container_name("k8s_app_api-7d9f_prod_uid-9_2_a1b2c3").unwrap();
        assert_eq!(id.container, "app");
        assert_eq!(id.pod, "api-7d9f");
        assert_eq!(id.namespace, "prod");
        assert_eq!(id.uid, "uid-9");
    }

    #[test]
    fn test_other_field_counts_fail() {
        assert!(matches!(
            parse_container_name("/k8s_nginx_web-0_default_abc"),
            Err(IdentityError::Parse(_))
        ));
        assert!(parse_container_name("k8s_a_b_c_d_e_f_g").is_err());
        assert!(parse_container_name("nginx").is_err());
    }

    #[test]
    fn test_empty_fields_fail() {
        assert!(parse_container_name("k8s__web-0_default_abc_0").is_err());
    }

    #[test]
    fn test_kubernetes_prefix() {
        assert!(is_kubernetes_container("/k8s_nginx_web-0_default_abc_0"));
        assert!(is_kubernetes_container("k8s_POD_web-0_default_abc_0"));
        assert!(!is_kubernetes_container("/redis"));
    }
}
