//! EKS cluster lifecycle.
//!
//! The physical resource id of a cluster is its name. Creation, version
//! updates and configuration updates are all asynchronous on the EKS side:
//! `on_*` starts them and `is_*_complete` watches the cluster (or the EKS
//! update) until it settles.
use std::future::Future;

use snafu::prelude::*;

use crate::{
    diff::log_changes,
    naming,
    poll::{self, Observed, Progress},
    ApiError, Attributes, Completion, Lifecycle, MissingFieldSnafu, OnEventResponse, Request,
    Result,
};

pub mod client;
pub mod config;
pub mod diff;
pub mod logging;

use config::{ClusterConfig, ClusterProperties, ConfigUpdate, EncryptionConfig};
use diff::{ChangeClassification, UpdateIntent};

/// Event key of the EKS update id.
pub const TOKEN_KEY: &str = "EksUpdateId";

const SUBJECT: &str = "cluster";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterStatus {
    Creating,
    Active,
    Deleting,
    Failed,
    Updating,
    Pending,
    Other(String),
}

impl From<&str> for ClusterStatus {
    fn from(status: &str) -> Self {
        match status {
            "CREATING" => ClusterStatus::Creating,
            "ACTIVE" => ClusterStatus::Active,
            "DELETING" => ClusterStatus::Deleting,
            "FAILED" => ClusterStatus::Failed,
            "UPDATING" => ClusterStatus::Updating,
            "PENDING" => ClusterStatus::Pending,
            other => ClusterStatus::Other(other.to_owned()),
        }
    }
}

impl ClusterStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ClusterStatus::Creating => "CREATING",
            ClusterStatus::Active => "ACTIVE",
            ClusterStatus::Deleting => "DELETING",
            ClusterStatus::Failed => "FAILED",
            ClusterStatus::Updating => "UPDATING",
            ClusterStatus::Pending => "PENDING",
            ClusterStatus::Other(status) => status,
        }
    }
}

/// What `DescribeCluster` reports about a cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterDescription {
    pub name: String,
    pub arn: Option<String>,
    pub status: ClusterStatus,
    pub version: Option<String>,
    pub endpoint: Option<String>,
    pub certificate_authority_data: Option<String>,
    pub cluster_security_group_id: Option<String>,
    pub oidc_issuer: Option<String>,
    pub encryption_config: Vec<EncryptionConfig>,
}

impl Observed for ClusterDescription {
    fn status(&self) -> &str {
        self.status.as_str()
    }

    fn progress(&self) -> Progress {
        match self.status {
            ClusterStatus::Active => Progress::Succeeded,
            // EKS gives no reason for a failed cluster
            ClusterStatus::Failed => Progress::Failed { detail: None },
            _ => Progress::InProgress,
        }
    }
}

/// Attributes of an active cluster.
///
/// CloudFormation rejects a response that lacks any declared attribute, so
/// every one of them has a value, empty if EKS did not report it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterAttributes {
    pub name: String,
    pub endpoint: String,
    pub arn: String,
    pub certificate_authority_data: String,
    pub cluster_security_group_id: String,
    pub open_id_connect_issuer_url: String,
    pub open_id_connect_issuer: String,
    pub encryption_config_key_arn: String,
}

impl From<&ClusterDescription> for ClusterAttributes {
    fn from(cluster: &ClusterDescription) -> Self {
        let issuer_url = cluster.oidc_issuer.clone().unwrap_or_default();
        let issuer = issuer_url
            .strip_prefix("https://")
            .unwrap_or(&issuer_url)
            .to_owned();
        ClusterAttributes {
            name: cluster.name.clone(),
            endpoint: cluster.endpoint.clone().unwrap_or_default(),
            arn: cluster.arn.clone().unwrap_or_default(),
            certificate_authority_data: cluster
                .certificate_authority_data
                .clone()
                .unwrap_or_default(),
            cluster_security_group_id: cluster
                .cluster_security_group_id
                .clone()
                .unwrap_or_default(),
            open_id_connect_issuer_url: issuer_url,
            open_id_connect_issuer: issuer,
            // EKS allows a single encryption config
            encryption_config_key_arn: cluster
                .encryption_config
                .first()
                .and_then(|config| config.provider.as_ref())
                .and_then(|provider| provider.key_arn.clone())
                .unwrap_or_default(),
        }
    }
}

impl From<ClusterAttributes> for Attributes {
    fn from(attrs: ClusterAttributes) -> Self {
        Attributes::from([
            ("Name".to_owned(), attrs.name),
            ("Endpoint".to_owned(), attrs.endpoint),
            ("Arn".to_owned(), attrs.arn),
            (
                "CertificateAuthorityData".to_owned(),
                attrs.certificate_authority_data,
            ),
            (
                "ClusterSecurityGroupId".to_owned(),
                attrs.cluster_security_group_id,
            ),
            (
                "OpenIdConnectIssuerUrl".to_owned(),
                attrs.open_id_connect_issuer_url,
            ),
            (
                "OpenIdConnectIssuer".to_owned(),
                attrs.open_id_connect_issuer,
            ),
            (
                "EncryptionConfigKeyArn".to_owned(),
                attrs.encryption_config_key_arn,
            ),
        ])
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateStatus {
    InProgress,
    Successful,
    Failed,
    Cancelled,
    Other(String),
}

impl From<&str> for UpdateStatus {
    fn from(status: &str) -> Self {
        match status {
            "InProgress" => UpdateStatus::InProgress,
            "Successful" => UpdateStatus::Successful,
            "Failed" => UpdateStatus::Failed,
            "Cancelled" => UpdateStatus::Cancelled,
            other => UpdateStatus::Other(other.to_owned()),
        }
    }
}

impl UpdateStatus {
    pub fn as_str(&self) -> &str {
        match self {
            UpdateStatus::InProgress => "InProgress",
            UpdateStatus::Successful => "Successful",
            UpdateStatus::Failed => "Failed",
            UpdateStatus::Cancelled => "Cancelled",
            UpdateStatus::Other(status) => status,
        }
    }
}

/// An error reported on an EKS update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErrorDetail {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl core::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{code}: {message}"),
            (Some(text), None) | (None, Some(text)) => f.write_str(text),
            (None, None) => f.write_str("unspecified error"),
        }
    }
}

/// What `DescribeUpdate` reports about an update.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateDescription {
    pub id: String,
    pub status: UpdateStatus,
    pub errors: Vec<ErrorDetail>,
}

impl Observed for UpdateDescription {
    fn status(&self) -> &str {
        self.status.as_str()
    }

    fn progress(&self) -> Progress {
        match self.status {
            UpdateStatus::InProgress => Progress::InProgress,
            UpdateStatus::Successful => Progress::Succeeded,
            UpdateStatus::Failed | UpdateStatus::Cancelled => Progress::Failed {
                detail: if self.errors.is_empty() {
                    None
                } else {
                    Some(
                        self.errors
                            .iter()
                            .map(|e| e.to_string())
                            .collect::<Vec<_>>()
                            .join("; "),
                    )
                },
            },
            UpdateStatus::Other(_) => Progress::Unknown,
        }
    }
}

/// The EKS API calls the cluster handler makes.
pub trait EksApi {
    /// Creates a cluster, returning its name.
    fn create_cluster(
        &self,
        name: &str,
        config: &ClusterConfig,
    ) -> impl Future<Output = Result<String, ApiError>>;

    fn describe_cluster(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<ClusterDescription, ApiError>>;

    fn delete_cluster(&self, name: &str) -> impl Future<Output = Result<(), ApiError>>;

    /// Starts a version update, returning the update id.
    fn update_cluster_version(
        &self,
        name: &str,
        version: &str,
    ) -> impl Future<Output = Result<Option<String>, ApiError>>;

    /// Starts a configuration update, returning the update id.
    fn update_cluster_config(
        &self,
        name: &str,
        update: &ConfigUpdate,
    ) -> impl Future<Output = Result<Option<String>, ApiError>>;

    fn describe_update(
        &self,
        name: &str,
        update_id: &str,
    ) -> impl Future<Output = Result<UpdateDescription, ApiError>>;
}

/// Role assumed to call the EKS API on behalf of an event.
#[derive(Clone, Debug, PartialEq)]
pub struct AssumeRole {
    pub role_arn: String,
    pub session_name: String,
}

impl AssumeRole {
    /// Reads the role from a raw cluster event.
    ///
    /// ## Errors
    /// Errs if the event has no `ResourceProperties.AssumeRoleArn`.
    pub fn from_event(event: &serde_json::Value) -> Result<Self> {
        let role_arn = event
            .pointer("/ResourceProperties/AssumeRoleArn")
            .and_then(serde_json::Value::as_str)
            .context(MissingFieldSnafu {
                field: "AssumeRoleArn",
            })?;
        let request_type = event
            .get("RequestType")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let request_id = event
            .get("RequestId")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        Ok(AssumeRole {
            role_arn: role_arn.to_owned(),
            session_name: format!("AWSCDK.EKSCluster.{request_type}.{request_id}"),
        })
    }
}

/// Desired configuration with logging rewritten so that types that are no
/// longer wanted get disabled.
fn desired_config(request: &Request<ClusterProperties>) -> ClusterConfig {
    let old_logging = request
        .old_properties
        .as_ref()
        .and_then(|old| old.config.logging.as_ref());
    let mut config = request.properties.config.clone();
    config.logging = logging::normalize(old_logging, config.logging.as_ref());
    config
}

/// Configuration of the previous deployment, as written in the template.
fn prior_config(request: &Request<ClusterProperties>) -> ClusterConfig {
    request
        .old_properties
        .as_ref()
        .map(|old| old.config.clone())
        .unwrap_or_default()
}

/// Lifecycle handler of an EKS cluster.
pub struct ClusterHandler<C> {
    client: C,
}

impl<C: EksApi> ClusterHandler<C> {
    pub fn new(client: C) -> Self {
        ClusterHandler { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    async fn create(
        &self,
        request: &Request<ClusterProperties>,
        config: &ClusterConfig,
    ) -> Result<OnEventResponse> {
        ensure!(
            config.role_arn.is_some(),
            MissingFieldSnafu { field: "roleArn" }
        );
        let name = match config.name.as_ref() {
            Some(name) => name.clone(),
            None => naming::cluster_name(&request.logical_resource_id, &request.request_id),
        };
        log::info!("creating cluster '{name}'");
        log::debug!("cluster configuration: {config:#?}");
        let name = self.client.create_cluster(&name, config).await?;
        Ok(OnEventResponse::new(name))
    }

    async fn update_version(&self, name: &str, version: &str) -> Result<OnEventResponse> {
        // EKS rejects an update to the version the cluster already runs
        let cluster = self.client.describe_cluster(name).await?;
        if cluster.version.as_deref() == Some(version) {
            log::info!("cluster '{name}' is already at version {version}, skipping version update");
            return Ok(OnEventResponse::new(name));
        }
        log::info!("updating cluster '{name}' to version {version}");
        let update_id = self.client.update_cluster_version(name, version).await?;
        Ok(OnEventResponse::new(name).with_token(update_id))
    }

    /// Completes once the cluster is active, with its attributes.
    async fn is_active(&self, name: &str) -> Result<Completion> {
        let cluster = self.client.describe_cluster(name).await?;
        log::trace!("described cluster: {cluster:#?}");
        if poll::check(SUBJECT, name, &cluster)? {
            let attrs = ClusterAttributes::from(&cluster);
            Ok(Completion::Complete(Some(attrs.into())))
        } else {
            Ok(Completion::Pending)
        }
    }
}

impl<C: EksApi> Lifecycle for ClusterHandler<C> {
    type Properties = ClusterProperties;

    const TOKEN_KEY: &'static str = TOKEN_KEY;

    async fn on_create(&self, request: &Request<ClusterProperties>) -> Result<OnEventResponse> {
        self.create(request, &desired_config(request)).await
    }

    async fn is_create_complete(&self, request: &Request<ClusterProperties>) -> Result<Completion> {
        self.is_active(request.physical_id()?).await
    }

    async fn on_update(
        &self,
        request: &Request<ClusterProperties>,
    ) -> Result<Option<OnEventResponse>> {
        let name = request.physical_id()?;
        let desired = desired_config(request);
        let prior = prior_config(request);
        log_changes(SUBJECT, &prior, &request.properties.config);

        let changes = ChangeClassification::analyze(&prior, &desired);
        log::info!("cluster '{name}' changes: {changes:?}");
        match UpdateIntent::resolve(&changes, &prior, &desired)? {
            UpdateIntent::Replace => {
                log::info!("cluster '{name}' must be replaced");
                self.create(request, &desired).await.map(Some)
            }
            UpdateIntent::Version(version) => self.update_version(name, &version).await.map(Some),
            UpdateIntent::Config(update) => {
                log::info!("updating cluster '{name}' configuration: {update:?}");
                let update_id = self.client.update_cluster_config(name, &update).await?;
                Ok(Some(OnEventResponse::new(name).with_token(update_id)))
            }
            UpdateIntent::NoOp => {
                log::info!("cluster '{name}' has nothing to update");
                Ok(None)
            }
        }
    }

    async fn is_update_complete(&self, request: &Request<ClusterProperties>) -> Result<Completion> {
        let name = request.physical_id()?;
        if let Some(update_id) = request.token.as_deref() {
            let update = self.client.describe_update(name, update_id).await?;
            if !poll::check("cluster update", update_id, &update)? {
                return Ok(Completion::Pending);
            }
        }
        self.is_active(name).await
    }

    async fn on_delete(&self, request: &Request<ClusterProperties>) -> Result<OnEventResponse> {
        let name = request.physical_id()?;
        log::info!("deleting cluster '{name}'");
        match self.client.delete_cluster(name).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                log::info!("cluster '{name}' not found, idempotently succeeded");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(OnEventResponse::new(name))
    }

    async fn is_delete_complete(&self, request: &Request<ClusterProperties>) -> Result<Completion> {
        let name = request.physical_id()?;
        match self.client.describe_cluster(name).await {
            Ok(cluster) => {
                log::info!("cluster '{name}' is {}, not deleted yet", cluster.status.as_str());
                Ok(Completion::Pending)
            }
            Err(err) if err.is_not_found() => {
                log::info!("cluster '{name}' is gone");
                Ok(Completion::Complete(None))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{poll::check, Error};

    fn cluster(status: &str) -> ClusterDescription {
        ClusterDescription {
            name: "c".to_owned(),
            arn: Some("arn:aws:eks:us-east-1:1:cluster/c".to_owned()),
            status: status.into(),
            version: Some("1.29".to_owned()),
            endpoint: None,
            certificate_authority_data: None,
            cluster_security_group_id: None,
            oidc_issuer: Some("https://oidc.eks.amazonaws.com/id/ABC".to_owned()),
            encryption_config: vec![],
        }
    }

    #[test]
    fn unknown_cluster_status_is_in_progress() {
        assert!(!check(SUBJECT, "c", &cluster("RESIZING")).unwrap());
        let err = check(SUBJECT, "c", &cluster("FAILED")).unwrap_err();
        assert_eq!("cluster 'c' is in a FAILED status", err.to_string());
    }

    #[test]
    fn reordered_logging_is_not_reported_as_a_change() {
        let props: ClusterProperties = serde_json::from_value(serde_json::json!({
            "Config": {
                "roleArn": "arn:aws:iam::1:role/cluster",
                "logging": { "clusterLogging": [{ "types": ["audit", "api"] }] }
            }
        }))
        .unwrap();
        let request = Request {
            request_type: crate::RequestType::Update,
            request_id: "r".to_owned(),
            stack_id: "s".to_owned(),
            logical_resource_id: "Cluster".to_owned(),
            physical_resource_id: Some("c".to_owned()),
            properties: props.clone(),
            old_properties: Some(props),
            token: None,
        };
        let prior = prior_config(&request);
        assert_eq!(None, crate::diff::changes(&prior, &request.properties.config));
        // normalization sorts and flags the types, so it must not be diffed
        assert!(crate::diff::changes(&prior, &desired_config(&request)).is_some());
    }

    #[test]
    fn attributes_are_always_present() {
        let attrs: Attributes = ClusterAttributes::from(&cluster("ACTIVE")).into();
        assert_eq!(8, attrs.len());
        assert_eq!("", attrs["Endpoint"]);
        assert_eq!("", attrs["EncryptionConfigKeyArn"]);
        assert_eq!("oidc.eks.amazonaws.com/id/ABC", attrs["OpenIdConnectIssuer"]);
        assert_eq!(
            "https://oidc.eks.amazonaws.com/id/ABC",
            attrs["OpenIdConnectIssuerUrl"]
        );
    }

    #[test]
    fn failed_update_reports_its_errors() {
        let update = UpdateDescription {
            id: "u-1".to_owned(),
            status: "Failed".into(),
            errors: vec![ErrorDetail {
                code: Some("AccessDenied".to_owned()),
                message: Some("no".to_owned()),
            }],
        };
        let err = check("cluster update", "u-1", &update).unwrap_err();
        assert_eq!(
            "cluster update 'u-1' is in a Failed status: AccessDenied: no",
            err.to_string()
        );

        let update = UpdateDescription {
            status: "Exploded".into(),
            ..update
        };
        let err = check("cluster update", "u-1", &update).unwrap_err();
        assert!(matches!(err, Error::UnknownStatus { .. }), "{err}");
    }

    #[test]
    fn assume_role_session_name() {
        let role = AssumeRole::from_event(&serde_json::json!({
            "RequestType": "Update",
            "RequestId": "r-1",
            "ResourceProperties": { "AssumeRoleArn": "arn:aws:iam::1:role/creation" }
        }))
        .unwrap();
        assert_eq!("AWSCDK.EKSCluster.Update.r-1", role.session_name);

        let err = AssumeRole::from_event(&serde_json::json!({ "ResourceProperties": {} }))
            .unwrap_err();
        assert_eq!("\"AssumeRoleArn\" is required", err.to_string());
    }
}
