//! Classification of cluster configuration changes.
use snafu::prelude::*;

use super::config::{AccessUpdate, ClusterConfig, ConfigUpdate, VpcConfig};
use super::logging;
use crate::{
    diff::{set_changed, set_changed_or_empty},
    ConflictingUpdateSnafu, ImmutableSnafu, NamedReplacementSnafu, Result, ValidationSnafu,
};

/// Independent flags, one per dimension of the cluster configuration that
/// can change.
///
/// Produced by [`ChangeClassification::analyze`], a pure function of the
/// prior and desired configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeClassification {
    pub replace_name: bool,
    pub replace_vpc: bool,
    pub replace_role: bool,
    pub update_version: bool,
    pub update_access: bool,
    pub update_logging: bool,
    pub update_encryption: bool,
}

impl ChangeClassification {
    pub fn analyze(old: &ClusterConfig, new: &ClusterConfig) -> Self {
        let default_vpc = VpcConfig::default();
        let old_vpc = old.resources_vpc_config.as_ref().unwrap_or(&default_vpc);
        let new_vpc = new.resources_vpc_config.as_ref().unwrap_or(&default_vpc);

        ChangeClassification {
            replace_name: old.name != new.name,
            replace_vpc: set_changed(old_vpc.subnet_ids.as_deref(), new_vpc.subnet_ids.as_deref())
                || set_changed(
                    old_vpc.security_group_ids.as_deref(),
                    new_vpc.security_group_ids.as_deref(),
                ),
            replace_role: old.role_arn != new.role_arn,
            update_version: old.version != new.version,
            update_access: old_vpc.endpoint_private_access != new_vpc.endpoint_private_access
                || old_vpc.endpoint_public_access != new_vpc.endpoint_public_access
                || set_changed_or_empty(
                    old_vpc.public_access_cidrs.as_deref(),
                    new_vpc.public_access_cidrs.as_deref(),
                ),
            update_logging: logging::enabled_types(old.logging.as_ref())
                != logging::enabled_types(new.logging.as_ref()),
            update_encryption: old.encryption_config.as_deref().unwrap_or_default()
                != new.encryption_config.as_deref().unwrap_or_default(),
        }
    }

    pub fn requires_replacement(&self) -> bool {
        self.replace_name || self.replace_vpc || self.replace_role
    }
}

/// The one thing an update event will do.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateIntent {
    /// Create a new cluster, the old one is deleted by CloudFormation.
    Replace,
    /// Move the cluster to this Kubernetes version.
    Version(String),
    /// Change logging or endpoint access in place.
    Config(ConfigUpdate),
    NoOp,
}

impl UpdateIntent {
    /// Resolves the flags into a single intent.
    ///
    /// ## Errors
    /// Errs when the changes cannot be applied: encryption changes, replacing
    /// a cluster that keeps its explicit name, removing the version, or
    /// changing logging and access together.
    pub fn resolve(
        changes: &ChangeClassification,
        old: &ClusterConfig,
        new: &ClusterConfig,
    ) -> Result<Self> {
        ensure!(
            !changes.update_encryption,
            ImmutableSnafu {
                subject: "cluster",
                what: "encryption"
            }
        );

        if changes.requires_replacement() {
            // The new cluster would collide with the old one, which still
            // exists until CloudFormation cleans it up.
            if let Some(name) = old.name.as_ref().filter(|name| Some(*name) == new.name.as_ref()) {
                return NamedReplacementSnafu {
                    subject: "cluster",
                    name,
                    hint: "Either rename the cluster or remove the \"name\" configuration",
                }
                .fail();
            }
            return Ok(UpdateIntent::Replace);
        }

        if changes.update_version {
            let version = new.version.clone().with_context(|| ValidationSnafu {
                msg: format!(
                    "Cannot remove cluster version configuration. Current version is {}",
                    old.version.as_deref().unwrap_or("unknown")
                ),
            })?;
            return Ok(UpdateIntent::Version(version));
        }

        ensure!(
            !(changes.update_logging && changes.update_access),
            ConflictingUpdateSnafu {
                first: "logging",
                second: "access"
            }
        );
        if changes.update_logging {
            return Ok(UpdateIntent::Config(ConfigUpdate::Logging(
                new.logging.clone().unwrap_or_default(),
            )));
        }
        if changes.update_access {
            let access = new
                .resources_vpc_config
                .as_ref()
                .map(AccessUpdate::from)
                .unwrap_or_default();
            return Ok(UpdateIntent::Config(ConfigUpdate::Access(access)));
        }

        Ok(UpdateIntent::NoOp)
    }
}
