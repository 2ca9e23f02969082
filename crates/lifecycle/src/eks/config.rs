//! Typed cluster configuration, as found under `ResourceProperties.Config`.
use std::collections::BTreeMap;

/// `ResourceProperties` of a cluster event.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterProperties {
    /// Role assumed to call the EKS API.
    #[serde(default)]
    pub assume_role_arn: Option<String>,
    #[serde(default)]
    pub config: ClusterConfig,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role_arn: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub resources_vpc_config: Option<VpcConfig>,
    #[serde(default)]
    pub kubernetes_network_config: Option<KubernetesNetworkConfig>,
    #[serde(default)]
    pub logging: Option<Logging>,
    #[serde(default)]
    pub encryption_config: Option<Vec<EncryptionConfig>>,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcConfig {
    #[serde(default)]
    pub subnet_ids: Option<Vec<String>>,
    #[serde(default)]
    pub security_group_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "crate::props::option_bool")]
    pub endpoint_private_access: Option<bool>,
    #[serde(default, deserialize_with = "crate::props::option_bool")]
    pub endpoint_public_access: Option<bool>,
    #[serde(default)]
    pub public_access_cidrs: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesNetworkConfig {
    #[serde(default)]
    pub service_ipv4_cidr: Option<String>,
    #[serde(default)]
    pub ip_family: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Logging {
    #[serde(default)]
    pub cluster_logging: Vec<LogSetup>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSetup {
    #[serde(default)]
    pub types: Vec<String>,
    /// A setup without this flag enables its types.
    #[serde(default, deserialize_with = "crate::props::option_bool")]
    pub enabled: Option<bool>,
}

impl LogSetup {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub provider: Option<EncryptionProvider>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionProvider {
    #[serde(default)]
    pub key_arn: Option<String>,
}

/// Access settings of the cluster endpoint.
///
/// These are the only VPC settings EKS accepts in an update; subnets and
/// security groups are fixed at creation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AccessUpdate {
    pub endpoint_private_access: Option<bool>,
    pub endpoint_public_access: Option<bool>,
    pub public_access_cidrs: Option<Vec<String>>,
}

impl From<&VpcConfig> for AccessUpdate {
    fn from(vpc: &VpcConfig) -> Self {
        AccessUpdate {
            endpoint_private_access: vpc.endpoint_private_access,
            endpoint_public_access: vpc.endpoint_public_access,
            public_access_cidrs: vpc.public_access_cidrs.clone(),
        }
    }
}

/// A single `UpdateClusterConfig` call. EKS accepts one kind of change per
/// call.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigUpdate {
    Logging(Logging),
    Access(AccessUpdate),
}
