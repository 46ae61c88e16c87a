//! Generated-service configuration for a Canary
//!
//! Describes how the ClusterIP services and the mesh or ingress routing
//! objects for a canary are generated. Apart from the naming and port
//! fields, everything here is handed verbatim to the routing adapters.

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::istio::{CorsPolicy, HTTPMatchRequest, HTTPRetry, HTTPRewrite, Headers, TrafficPolicy};

/// Default port name of the generated services
pub const DEFAULT_PORT_NAME: &str = "http";

/// CanaryService defines how ClusterIP services, service mesh or ingress
/// routing objects are generated
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanaryService {
    /// Name of the generated Kubernetes service (defaults to targetRef.name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Port of the generated Kubernetes service
    pub port: i32,

    /// Port name of the generated Kubernetes service (defaults to http)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,

    /// Target port number or name (defaults to port)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<IntOrString>,

    /// Add all container ports to the generated service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_discovery: Option<bool>,

    /// Timeout of the HTTP or gRPC request (duration string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Gateways attached to the generated virtual service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateways: Option<Vec<String>>,

    /// Hosts attached to the generated virtual service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<String>>,

    /// Traffic policy attached to the generated destination rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_policy: Option<TrafficPolicy>,

    /// URI match conditions for the generated service
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub r#match: Option<Vec<HTTPMatchRequest>>,

    /// Rewrite HTTP URIs for the generated service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<HTTPRewrite>,

    /// Retry policy for the generated virtual service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<HTTPRetry>,

    /// Header operations for the generated virtual service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,

    /// CORS policy for the generated virtual service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors_policy: Option<CorsPolicy>,

    /// Mesh name of the generated App Mesh virtual nodes and service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_name: Option<String>,

    /// Backends of the generated App Mesh virtual nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backends: Option<Vec<String>>,
}

impl CanaryService {
    /// Service with just a port; all other fields absent
    pub fn with_port(port: i32) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// The explicit name override, ignoring an empty string
    pub fn name_override(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }

    /// Port name of the generated services, `http` when unset
    pub fn port_name(&self) -> &str {
        self.port_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_PORT_NAME)
    }

    /// Target port of the generated services, the service port when unset
    pub fn target_port(&self) -> IntOrString {
        self.target_port
            .clone()
            .unwrap_or(IntOrString::Int(self.port))
    }

    /// Whether container ports are discovered and added to the services
    pub fn port_discovery(&self) -> bool {
        self.port_discovery.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_defaults() {
        let svc = CanaryService::with_port(9898);
        assert_eq!(svc.port_name(), "http");
        assert_eq!(svc.target_port(), IntOrString::Int(9898));
        assert!(!svc.port_discovery());
        assert!(svc.name_override().is_none());
    }

    #[test]
    fn test_named_target_port_yaml() {
        let yaml = r#"
name: podinfo-svc
port: 80
portName: grpc
targetPort: http-metrics
portDiscovery: true
timeout: 5s
"#;
        let svc: CanaryService = serde_yaml::from_str(yaml).expect("service should parse");
        assert_eq!(svc.name_override(), Some("podinfo-svc"));
        assert_eq!(svc.port_name(), "grpc");
        assert_eq!(
            svc.target_port(),
            IntOrString::String("http-metrics".to_string())
        );
        assert!(svc.port_discovery());
        assert_eq!(svc.timeout.as_deref(), Some("5s"));
    }

    #[test]
    fn test_empty_name_is_not_an_override() {
        let svc = CanaryService {
            name: Some(String::new()),
            ..CanaryService::with_port(80)
        };
        assert!(svc.name_override().is_none());
    }

    #[test]
    fn test_routing_fields_keep_wire_names() {
        let yaml = r#"
port: 80
gateways: [public-gateway.istio-system.svc.cluster.local]
hosts: [app.example.com]
match:
  - uri:
      prefix: /api
retries:
  attempts: 3
corsPolicy:
  allowMethods: [GET]
meshName: global
backends: [backend.test]
"#;
        let svc: CanaryService = serde_yaml::from_str(yaml).expect("service should parse");
        assert_eq!(svc.r#match.as_ref().map(Vec::len), Some(1));
        assert_eq!(svc.mesh_name.as_deref(), Some("global"));

        let json = serde_json::to_value(&svc).expect("service should serialize");
        assert!(json.get("match").is_some());
        assert!(json.get("corsPolicy").is_some());
        assert!(json.get("trafficPolicy").is_none());
        assert!(json.get("portDiscovery").is_none());
    }
}
