//! [`EksApi`] backed by the AWS SDK.
use anyhow::Context;
use aws_config::SdkConfig;
use aws_sdk_eks::types;

use super::{
    config::{
        AccessUpdate, ClusterConfig, ConfigUpdate, EncryptionConfig, EncryptionProvider,
        KubernetesNetworkConfig, Logging, VpcConfig,
    },
    ClusterDescription, EksApi, ErrorDetail, UpdateDescription, SUBJECT,
};
use crate::ApiError;

impl From<&VpcConfig> for types::VpcConfigRequest {
    fn from(vpc: &VpcConfig) -> Self {
        types::VpcConfigRequest::builder()
            .set_subnet_ids(vpc.subnet_ids.clone())
            .set_security_group_ids(vpc.security_group_ids.clone())
            .set_endpoint_private_access(vpc.endpoint_private_access)
            .set_endpoint_public_access(vpc.endpoint_public_access)
            .set_public_access_cidrs(vpc.public_access_cidrs.clone())
            .build()
    }
}

impl From<&AccessUpdate> for types::VpcConfigRequest {
    fn from(access: &AccessUpdate) -> Self {
        types::VpcConfigRequest::builder()
            .set_endpoint_private_access(access.endpoint_private_access)
            .set_endpoint_public_access(access.endpoint_public_access)
            .set_public_access_cidrs(access.public_access_cidrs.clone())
            .build()
    }
}

impl From<&Logging> for types::Logging {
    fn from(logging: &Logging) -> Self {
        let setups = logging
            .cluster_logging
            .iter()
            .map(|setup| {
                types::LogSetup::builder()
                    .set_types(Some(
                        setup
                            .types
                            .iter()
                            .map(|ty| types::LogType::from(ty.as_str()))
                            .collect(),
                    ))
                    .enabled(setup.is_enabled())
                    .build()
            })
            .collect();
        types::Logging::builder()
            .set_cluster_logging(Some(setups))
            .build()
    }
}

impl From<&EncryptionConfig> for types::EncryptionConfig {
    fn from(config: &EncryptionConfig) -> Self {
        types::EncryptionConfig::builder()
            .set_resources(Some(config.resources.clone()))
            .set_provider(config.provider.as_ref().map(|provider| {
                types::Provider::builder()
                    .set_key_arn(provider.key_arn.clone())
                    .build()
            }))
            .build()
    }
}

impl From<&types::EncryptionConfig> for EncryptionConfig {
    fn from(config: &types::EncryptionConfig) -> Self {
        EncryptionConfig {
            resources: config.resources().to_vec(),
            provider: config.provider().map(|provider| EncryptionProvider {
                key_arn: provider.key_arn().map(str::to_owned),
            }),
        }
    }
}

impl From<&KubernetesNetworkConfig> for types::KubernetesNetworkConfigRequest {
    fn from(config: &KubernetesNetworkConfig) -> Self {
        types::KubernetesNetworkConfigRequest::builder()
            .set_service_ipv4_cidr(config.service_ipv4_cidr.clone())
            .set_ip_family(config.ip_family.as_deref().map(types::IpFamily::from))
            .build()
    }
}

impl From<&types::Cluster> for ClusterDescription {
    fn from(cluster: &types::Cluster) -> Self {
        ClusterDescription {
            name: cluster.name().unwrap_or_default().to_owned(),
            arn: cluster.arn().map(str::to_owned),
            status: cluster
                .status()
                .map(|status| status.as_str())
                .unwrap_or_default()
                .into(),
            version: cluster.version().map(str::to_owned),
            endpoint: cluster.endpoint().map(str::to_owned),
            certificate_authority_data: cluster
                .certificate_authority()
                .and_then(|ca| ca.data())
                .map(str::to_owned),
            cluster_security_group_id: cluster
                .resources_vpc_config()
                .and_then(|vpc| vpc.cluster_security_group_id())
                .map(str::to_owned),
            oidc_issuer: cluster
                .identity()
                .and_then(|identity| identity.oidc())
                .and_then(|oidc| oidc.issuer())
                .map(str::to_owned),
            encryption_config: cluster
                .encryption_config()
                .iter()
                .map(EncryptionConfig::from)
                .collect(),
        }
    }
}

impl From<&types::Update> for UpdateDescription {
    fn from(update: &types::Update) -> Self {
        UpdateDescription {
            id: update.id().unwrap_or_default().to_owned(),
            status: update
                .status()
                .map(|status| status.as_str())
                .unwrap_or_default()
                .into(),
            errors: update
                .errors()
                .iter()
                .map(|e| ErrorDetail {
                    code: e.error_code().map(|code| code.as_str().to_owned()),
                    message: e.error_message().map(str::to_owned),
                })
                .collect(),
        }
    }
}

/// EKS client.
pub struct EksClient {
    client: aws_sdk_eks::Client,
}

impl EksClient {
    pub fn new(cfg: &SdkConfig) -> Self {
        EksClient {
            client: aws_sdk_eks::Client::new(cfg),
        }
    }

    /// Creates a client whose calls are made as `role_arn`.
    pub async fn assuming_role(cfg: &SdkConfig, role_arn: &str, session_name: &str) -> Self {
        log::debug!("assuming role {role_arn} as '{session_name}'");
        let provider = aws_config::sts::AssumeRoleProvider::builder(role_arn)
            .session_name(session_name)
            .configure(cfg)
            .build()
            .await;
        let conf = aws_sdk_eks::config::Builder::from(cfg)
            .credentials_provider(provider)
            .build();
        EksClient {
            client: aws_sdk_eks::Client::from_conf(conf),
        }
    }
}

impl EksApi for EksClient {
    async fn create_cluster(&self, name: &str, config: &ClusterConfig) -> Result<String, ApiError> {
        let out = self
            .client
            .create_cluster()
            .name(name)
            .set_role_arn(config.role_arn.clone())
            .set_version(config.version.clone())
            .set_resources_vpc_config(config.resources_vpc_config.as_ref().map(Into::into))
            .set_kubernetes_network_config(
                config.kubernetes_network_config.as_ref().map(Into::into),
            )
            .set_logging(config.logging.as_ref().map(Into::into))
            .set_encryption_config(
                config
                    .encryption_config
                    .as_ref()
                    .map(|configs| configs.iter().map(Into::into).collect()),
            )
            .set_tags(
                config
                    .tags
                    .as_ref()
                    .map(|tags| tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            )
            .send()
            .await
            .with_context(|| format!("could not create cluster '{name}'"))?;
        let cluster = out.cluster().with_context(|| {
            format!("CreateCluster returned without cluster information for '{name}'")
        })?;
        Ok(cluster.name().unwrap_or(name).to_owned())
    }

    async fn describe_cluster(&self, name: &str) -> Result<ClusterDescription, ApiError> {
        let out = self
            .client
            .describe_cluster()
            .name(name)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception());
                ApiError::classify(SUBJECT, name, not_found, anyhow::Error::new(err))
            })?;
        let cluster = out
            .cluster()
            .with_context(|| format!("DescribeCluster returned no cluster for '{name}'"))?;
        Ok(cluster.into())
    }

    async fn delete_cluster(&self, name: &str) -> Result<(), ApiError> {
        self.client
            .delete_cluster()
            .name(name)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception());
                ApiError::classify(SUBJECT, name, not_found, anyhow::Error::new(err))
            })?;
        Ok(())
    }

    async fn update_cluster_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<String>, ApiError> {
        let out = self
            .client
            .update_cluster_version()
            .name(name)
            .version(version)
            .send()
            .await
            .with_context(|| format!("could not update cluster '{name}' to version {version}"))?;
        Ok(out.update().and_then(|u| u.id()).map(str::to_owned))
    }

    async fn update_cluster_config(
        &self,
        name: &str,
        update: &ConfigUpdate,
    ) -> Result<Option<String>, ApiError> {
        let request = self.client.update_cluster_config().name(name);
        let request = match update {
            ConfigUpdate::Logging(logging) => request.logging(logging.into()),
            ConfigUpdate::Access(access) => request.resources_vpc_config(access.into()),
        };
        let out = request
            .send()
            .await
            .with_context(|| format!("could not update cluster '{name}' configuration"))?;
        Ok(out.update().and_then(|u| u.id()).map(str::to_owned))
    }

    async fn describe_update(
        &self,
        name: &str,
        update_id: &str,
    ) -> Result<UpdateDescription, ApiError> {
        let out = self
            .client
            .describe_update()
            .name(name)
            .update_id(update_id)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception());
                ApiError::classify("cluster update", update_id, not_found, anyhow::Error::new(err))
            })?;
        let update = out
            .update()
            .with_context(|| format!("unable to describe update with id \"{update_id}\""))?;
        Ok(update.into())
    }
}
