//! Redshift user lifecycle.
//!
//! A user's password lives in a Secrets Manager secret whose JSON value has a
//! `password` field. The password is read when the user is created, and on
//! every update so that a rotated secret is applied with `ALTER USER`.
//!
//! Moving a user to another cluster or database, or renaming it, creates a
//! new user under a new physical id. CloudFormation then deletes the old one.
use std::future::Future;

use snafu::prelude::*;

use super::{ddl::quote, is_drop_complete, physical_id, RedshiftDataApi, Target, TOKEN_KEY};
use crate::{
    diff::log_changes,
    poll, ApiError, Attributes, Completion, DecodeSnafu, Lifecycle, OnEventResponse, Request,
    Result, ValidationSnafu,
};

const SUBJECT: &str = "user";

/// `ResourceProperties` of a user event.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProperties {
    pub cluster_name: String,
    pub database_name: String,
    /// Secret holding the credentials the Data API connects with.
    pub admin_user_arn: String,
    pub username: String,
    /// Secret holding the user's password.
    pub password_secret_arn: String,
}

impl From<&UserProperties> for Target {
    fn from(props: &UserProperties) -> Self {
        Target {
            cluster: props.cluster_name.clone(),
            database: props.database_name.clone(),
            secret_arn: props.admin_user_arn.clone(),
        }
    }
}

impl UserProperties {
    /// Whether moving from `old` to `self` needs a new user.
    pub fn replaces(&self, old: &UserProperties) -> bool {
        self.cluster_name != old.cluster_name
            || self.database_name != old.database_name
            || self.username != old.username
    }
}

/// The Secrets Manager calls the user handler makes.
pub trait SecretsApi {
    /// The string value of the secret, if it has one.
    fn secret_string(
        &self,
        secret_arn: &str,
    ) -> impl Future<Output = Result<Option<String>, ApiError>>;
}

#[derive(serde::Deserialize)]
struct Credentials {
    password: String,
}

/// Reads the password out of a secret's string value.
pub fn password_from_secret(secret_arn: &str, secret: Option<&str>) -> Result<String> {
    let secret = secret.filter(|secret| !secret.is_empty()).context(ValidationSnafu {
        msg: format!("Secret string for {secret_arn} was empty"),
    })?;
    let credentials: Credentials =
        serde_json::from_str(secret).context(DecodeSnafu { what: "password secret" })?;
    Ok(credentials.password)
}

pub fn create_user(username: &str, password: &str) -> String {
    format!("CREATE USER {username} PASSWORD {}", quote(password))
}

pub fn alter_password(username: &str, password: &str) -> String {
    format!("ALTER USER {username} PASSWORD {}", quote(password))
}

pub fn drop_user(username: &str) -> String {
    format!("DROP USER IF EXISTS {username}")
}

/// Lifecycle handler of a Redshift user.
pub struct UserHandler<C, S> {
    client: C,
    secrets: S,
}

impl<C: RedshiftDataApi, S: SecretsApi> UserHandler<C, S> {
    pub fn new(client: C, secrets: S) -> Self {
        UserHandler { client, secrets }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn secrets(&self) -> &S {
        &self.secrets
    }

    async fn password(&self, secret_arn: &str) -> Result<String> {
        let secret = self.secrets.secret_string(secret_arn).await?;
        password_from_secret(secret_arn, secret.as_deref())
    }

    async fn create(&self, request: &Request<UserProperties>) -> Result<OnEventResponse> {
        let props = &request.properties;
        let target = Target::from(props);
        let password = self.password(&props.password_secret_arn).await?;
        log::info!("creating user '{}'", props.username);
        // the statement carries the password, keep it out of the logs
        let statement_id = self
            .client
            .execute(&target, &[create_user(&props.username, &password)])
            .await?;
        Ok(
            OnEventResponse::new(physical_id(&target, &props.username, &request.request_id))
                .with_token(Some(statement_id)),
        )
    }

    async fn is_statement_complete(&self, request: &Request<UserProperties>) -> Result<Completion> {
        if let Some(id) = request.token.as_deref() {
            let statement = self.client.describe_statement(id).await?;
            if !poll::check("statement", id, &statement)? {
                return Ok(Completion::Pending);
            }
        }
        Ok(Completion::Complete(Some(Attributes::from([(
            "username".to_owned(),
            request.properties.username.clone(),
        )]))))
    }
}

impl<C: RedshiftDataApi, S: SecretsApi> Lifecycle for UserHandler<C, S> {
    type Properties = UserProperties;

    const TOKEN_KEY: &'static str = TOKEN_KEY;

    async fn on_create(&self, request: &Request<UserProperties>) -> Result<OnEventResponse> {
        self.create(request).await
    }

    async fn is_create_complete(&self, request: &Request<UserProperties>) -> Result<Completion> {
        self.is_statement_complete(request).await
    }

    async fn on_update(
        &self,
        request: &Request<UserProperties>,
    ) -> Result<Option<OnEventResponse>> {
        let id = request.physical_id()?;
        let new = &request.properties;
        let old = request.old_properties.as_ref().unwrap_or(new);
        log_changes(SUBJECT, old, new);

        if new.replaces(old) {
            log::info!("user '{}' must be replaced", old.username);
            return self.create(request).await.map(Some);
        }

        let old_password = self.password(&old.password_secret_arn).await?;
        let password = self.password(&new.password_secret_arn).await?;
        if password == old_password {
            log::info!("user '{}' has nothing to update", new.username);
            return Ok(None);
        }
        log::info!("changing the password of user '{}'", new.username);
        let statement_id = self
            .client
            .execute(&new.into(), &[alter_password(&new.username, &password)])
            .await?;
        Ok(Some(OnEventResponse::new(id).with_token(Some(statement_id))))
    }

    async fn is_update_complete(&self, request: &Request<UserProperties>) -> Result<Completion> {
        self.is_statement_complete(request).await
    }

    async fn on_delete(&self, request: &Request<UserProperties>) -> Result<OnEventResponse> {
        let id = request.physical_id()?;
        let props = &request.properties;
        log::info!("dropping user '{}'", props.username);
        match self
            .client
            .execute(&props.into(), &[drop_user(&props.username)])
            .await
        {
            Ok(statement_id) => Ok(OnEventResponse::new(id).with_token(Some(statement_id))),
            Err(err) if err.is_not_found() => {
                log::info!("cluster '{}' not found, idempotently succeeded", props.cluster_name);
                Ok(OnEventResponse::new(id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn is_delete_complete(&self, request: &Request<UserProperties>) -> Result<Completion> {
        is_drop_complete(&self.client, request.token.as_deref()).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;

    #[test]
    fn password_is_read_from_the_secret() {
        assert_eq!(
            "hunter2",
            password_from_secret("arn", Some(r#"{"username":"bob","password":"hunter2"}"#)).unwrap()
        );
        let err = password_from_secret("arn:secret", None).unwrap_err();
        assert_eq!("Secret string for arn:secret was empty", err.to_string());
        assert!(password_from_secret("arn", Some("")).is_err());
        assert!(matches!(
            password_from_secret("arn", Some(r#"{"username":"bob"}"#)),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn passwords_are_quoted() {
        assert_eq!(
            "CREATE USER bob PASSWORD 'it''s Secret1'",
            create_user("bob", "it's Secret1")
        );
        assert_eq!("ALTER USER bob PASSWORD 'Secret2'", alter_password("bob", "Secret2"));
        assert_eq!("DROP USER IF EXISTS bob", drop_user("bob"));
    }

    #[test]
    fn replacement_follows_identity() {
        let old = UserProperties {
            cluster_name: "cluster".to_owned(),
            database_name: "db".to_owned(),
            admin_user_arn: "admin".to_owned(),
            username: "bob".to_owned(),
            password_secret_arn: "secret-1".to_owned(),
        };
        let rotated = UserProperties {
            password_secret_arn: "secret-2".to_owned(),
            admin_user_arn: "other-admin".to_owned(),
            ..old.clone()
        };
        assert!(!rotated.replaces(&old));
        for new in [
            UserProperties {
                username: "alice".to_owned(),
                ..old.clone()
            },
            UserProperties {
                database_name: "warehouse".to_owned(),
                ..old.clone()
            },
            UserProperties {
                cluster_name: "other".to_owned(),
                ..old.clone()
            },
        ] {
            assert!(new.replaces(&old), "{new:?}");
        }
    }
}
