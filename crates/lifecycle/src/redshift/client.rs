//! [`RedshiftDataApi`] and [`SecretsApi`] backed by the AWS SDK.
use anyhow::Context;
use aws_config::SdkConfig;
use aws_sdk_redshiftdata::error::ProvideErrorMetadata;

use super::{user::SecretsApi, RedshiftDataApi, StatementDescription, Target};
use crate::ApiError;

/// Redshift Data API client.
pub struct RedshiftDataClient {
    client: aws_sdk_redshiftdata::Client,
}

impl RedshiftDataClient {
    pub fn new(cfg: &SdkConfig) -> Self {
        RedshiftDataClient {
            client: aws_sdk_redshiftdata::Client::new(cfg),
        }
    }
}

/// Whether a rejected statement submission means the cluster is gone.
///
/// The Data API reports an unknown cluster as a `ValidationException`
/// rather than as a missing resource.
fn is_missing_cluster(code: Option<&str>, message: Option<&str>) -> bool {
    match code {
        Some("ResourceNotFoundException") => true,
        Some("ValidationException") => message.is_some_and(|message| {
            let message = message.to_ascii_lowercase();
            message.contains("cluster")
                && (message.contains("not found") || message.contains("doesn't exist"))
        }),
        _ => false,
    }
}

impl RedshiftDataApi for RedshiftDataClient {
    async fn execute(&self, target: &Target, statements: &[String]) -> Result<String, ApiError> {
        log::trace!(
            "executing {} statements on {}/{}",
            statements.len(),
            target.cluster,
            target.database
        );
        let out = self
            .client
            .batch_execute_statement()
            .cluster_identifier(&target.cluster)
            .database(&target.database)
            .secret_arn(&target.secret_arn)
            .set_sqls(Some(statements.to_vec()))
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|e| is_missing_cluster(e.code(), e.message()));
                ApiError::classify(
                    "cluster",
                    target.cluster.as_str(),
                    not_found,
                    anyhow::Error::new(err).context(format!(
                        "could not execute statements on {}/{}",
                        target.cluster, target.database
                    )),
                )
            })?;
        let id = out
            .id()
            .context("BatchExecuteStatement returned no statement id")?;
        Ok(id.to_owned())
    }

    async fn describe_statement(&self, id: &str) -> Result<StatementDescription, ApiError> {
        let out = self
            .client
            .describe_statement()
            .id(id)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception());
                ApiError::classify("statement", id, not_found, anyhow::Error::new(err))
            })?;
        Ok(StatementDescription {
            id: id.to_owned(),
            status: out
                .status()
                .map(|status| status.as_str())
                .unwrap_or_default()
                .into(),
            error: out.error().map(str::to_owned),
        })
    }
}

/// Secrets Manager client.
pub struct SecretsManagerClient {
    client: aws_sdk_secretsmanager::Client,
}

impl SecretsManagerClient {
    pub fn new(cfg: &SdkConfig) -> Self {
        SecretsManagerClient {
            client: aws_sdk_secretsmanager::Client::new(cfg),
        }
    }
}

impl SecretsApi for SecretsManagerClient {
    async fn secret_string(&self, secret_arn: &str) -> Result<Option<String>, ApiError> {
        let out = self
            .client
            .get_secret_value()
            .secret_id(secret_arn)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception());
                ApiError::classify(
                    "secret",
                    secret_arn,
                    not_found,
                    anyhow::Error::new(err).context(format!("could not read secret {secret_arn}")),
                )
            })?;
        Ok(out.secret_string().map(str::to_owned))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_cluster_errors() {
        assert!(is_missing_cluster(
            Some("ValidationException"),
            Some("Cluster analytics not found.")
        ));
        assert!(is_missing_cluster(Some("ResourceNotFoundException"), None));
        assert!(!is_missing_cluster(
            Some("ValidationException"),
            Some("Sqls must contain at least one statement")
        ));
        assert!(!is_missing_cluster(Some("ActiveStatementsExceededException"), None));
        assert!(!is_missing_cluster(None, None));
    }
}
