//! Redshift table and user lifecycles.
//!
//! Tables and users are managed with SQL submitted through the Redshift Data
//! API. The statements of one event go out as a single batch, and the batch's
//! statement id is the continuation token that `is_*_complete` polls.
//!
//! The physical resource id of a table is
//! `<cluster>:<database>:<prefix>:<stack suffix>`. Tables created before ids
//! took that form use the table name itself as their id; those are "legacy"
//! ids and are never renamed.
use std::future::Future;

use crate::{
    diff::log_changes,
    naming,
    poll::{self, Observed, Progress},
    ApiError, Attributes, Completion, Lifecycle, NamedReplacementSnafu, OnEventResponse, Request,
    Result,
};

pub mod client;
pub mod ddl;
pub mod props;
pub mod user;

use ddl::TablePlan;
use props::TableProperties;

/// Event key of the Data API statement id.
pub const TOKEN_KEY: &str = "StatementId";

const SUBJECT: &str = "table";

const REPLACEMENT_HINT: &str =
    "Change the table name prefix, or move the table to another cluster or database";

/// Where statements run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub cluster: String,
    pub database: String,
    /// Secret holding the database credentials.
    pub secret_arn: String,
}

impl From<&TableProperties> for Target {
    fn from(props: &TableProperties) -> Self {
        Target {
            cluster: props.cluster_name.clone(),
            database: props.database_name.clone(),
            secret_arn: props.admin_user_arn.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatementStatus {
    Submitted,
    Picked,
    Started,
    Finished,
    Failed,
    Aborted,
    Other(String),
}

impl From<&str> for StatementStatus {
    fn from(status: &str) -> Self {
        match status {
            "SUBMITTED" => StatementStatus::Submitted,
            "PICKED" => StatementStatus::Picked,
            "STARTED" => StatementStatus::Started,
            "FINISHED" => StatementStatus::Finished,
            "FAILED" => StatementStatus::Failed,
            "ABORTED" => StatementStatus::Aborted,
            other => StatementStatus::Other(other.to_owned()),
        }
    }
}

impl StatementStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StatementStatus::Submitted => "SUBMITTED",
            StatementStatus::Picked => "PICKED",
            StatementStatus::Started => "STARTED",
            StatementStatus::Finished => "FINISHED",
            StatementStatus::Failed => "FAILED",
            StatementStatus::Aborted => "ABORTED",
            StatementStatus::Other(status) => status,
        }
    }
}

/// What `DescribeStatement` reports about a statement.
#[derive(Clone, Debug, PartialEq)]
pub struct StatementDescription {
    pub id: String,
    pub status: StatementStatus,
    pub error: Option<String>,
}

impl StatementDescription {
    /// Whether the statement failed because its database no longer exists.
    pub fn database_is_gone(&self) -> bool {
        self.status == StatementStatus::Failed
            && self.error.as_deref().is_some_and(|error| {
                error.contains("database") && error.contains("does not exist")
            })
    }
}

impl Observed for StatementDescription {
    fn status(&self) -> &str {
        self.status.as_str()
    }

    fn progress(&self) -> Progress {
        match self.status {
            StatementStatus::Submitted | StatementStatus::Picked | StatementStatus::Started => {
                Progress::InProgress
            }
            StatementStatus::Finished => Progress::Succeeded,
            StatementStatus::Failed | StatementStatus::Aborted => Progress::Failed {
                detail: self.error.clone(),
            },
            StatementStatus::Other(_) => Progress::Unknown,
        }
    }
}

/// The Redshift Data API calls the handlers make.
pub trait RedshiftDataApi {
    /// Submits `statements` to run in order, returning the statement id.
    ///
    /// Errs with [`ApiError::NotFound`] when the cluster does not exist.
    fn execute(
        &self,
        target: &Target,
        statements: &[String],
    ) -> impl Future<Output = Result<String, ApiError>>;

    fn describe_statement(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<StatementDescription, ApiError>>;
}

/// Physical resource id of the object `name` in the target's database.
pub fn physical_id(target: &Target, name: &str, suffix: &str) -> String {
    format!("{}:{}:{name}:{suffix}", target.cluster, target.database)
}

/// Completes a deletion once its statement has run.
///
/// A statement or database that is gone counts as deleted.
pub(crate) async fn is_drop_complete<C: RedshiftDataApi>(
    client: &C,
    statement_id: Option<&str>,
) -> Result<Completion> {
    let Some(statement_id) = statement_id else {
        return Ok(Completion::Complete(None));
    };
    match client.describe_statement(statement_id).await {
        Ok(statement) if statement.database_is_gone() => {
            log::info!("database is gone, idempotently succeeded");
            Ok(Completion::Complete(None))
        }
        Ok(statement) => {
            if poll::check("statement", statement_id, &statement)? {
                Ok(Completion::Complete(None))
            } else {
                Ok(Completion::Pending)
            }
        }
        Err(err) if err.is_not_found() => Ok(Completion::Complete(None)),
        Err(err) => Err(err.into()),
    }
}

/// Lifecycle handler of a Redshift table.
pub struct TableHandler<C> {
    client: C,
}

impl<C: RedshiftDataApi> TableHandler<C> {
    pub fn new(client: C) -> Self {
        TableHandler { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Whether the physical id predates ids carrying the stack suffix.
    fn is_legacy(request: &Request<TableProperties>, physical_id: &str) -> bool {
        !physical_id.contains(&naming::stack_suffix(&request.stack_id))
    }

    /// Name of the table as described by `props`, respecting legacy ids.
    fn table_name(request: &Request<TableProperties>, props: &TableProperties) -> String {
        match request.physical_resource_id.as_deref() {
            Some(id) if Self::is_legacy(request, id) => id.to_owned(),
            _ => props.table_name.resolve(&request.stack_id),
        }
    }

    /// Physical id the table described by `props` gets when it is created.
    fn new_physical_id(request: &Request<TableProperties>, props: &TableProperties) -> String {
        physical_id(
            &props.into(),
            &props.table_name.prefix,
            &naming::stack_suffix(&request.stack_id),
        )
    }

    async fn create(&self, request: &Request<TableProperties>) -> Result<OnEventResponse> {
        let props = &request.properties;
        let table = props.table_name.resolve(&request.stack_id);
        log::info!("creating table '{table}'");
        let statements = ddl::create_statements(&table, props)?;
        log::debug!("create statements: {statements:#?}");
        let statement_id = self.client.execute(&props.into(), &statements).await?;
        Ok(OnEventResponse::new(Self::new_physical_id(request, props)).with_token(Some(statement_id)))
    }

    async fn is_statement_complete(
        &self,
        request: &Request<TableProperties>,
    ) -> Result<Completion> {
        if let Some(id) = request.token.as_deref() {
            let statement = self.client.describe_statement(id).await?;
            if !poll::check("statement", id, &statement)? {
                return Ok(Completion::Pending);
            }
        }
        let table = Self::table_name(request, &request.properties);
        Ok(Completion::Complete(Some(Attributes::from([(
            "TableName".to_owned(),
            table,
        )]))))
    }
}

impl<C: RedshiftDataApi> Lifecycle for TableHandler<C> {
    type Properties = TableProperties;

    const TOKEN_KEY: &'static str = TOKEN_KEY;

    async fn on_create(&self, request: &Request<TableProperties>) -> Result<OnEventResponse> {
        self.create(request).await
    }

    async fn is_create_complete(&self, request: &Request<TableProperties>) -> Result<Completion> {
        self.is_statement_complete(request).await
    }

    async fn on_update(
        &self,
        request: &Request<TableProperties>,
    ) -> Result<Option<OnEventResponse>> {
        let id = request.physical_id()?;
        let new = &request.properties;
        let old = request.old_properties.as_ref().unwrap_or(new);
        log_changes(SUBJECT, old, new);

        let legacy = Self::is_legacy(request, id);
        let table = Self::table_name(request, old);
        let new_table = new.table_name.resolve(&request.stack_id);
        let rename_to = if legacy { None } else { Some(new_table.as_str()) };

        match ddl::plan_update(&table, rename_to, old, new)? {
            TablePlan::Replace => {
                let same_place = old.cluster_name == new.cluster_name
                    && old.database_name == new.database_name;
                // CloudFormation only deletes the old table when the id changes
                let same_id = Self::new_physical_id(request, new) == id;
                if same_id || (same_place && new_table == table) {
                    return NamedReplacementSnafu {
                        subject: SUBJECT,
                        name: table,
                        hint: REPLACEMENT_HINT,
                    }
                    .fail();
                }
                log::info!("table '{table}' must be replaced");
                self.create(request).await.map(Some)
            }
            TablePlan::Alter(statements) if statements.is_empty() => {
                log::info!("table '{table}' has nothing to update");
                Ok(None)
            }
            TablePlan::Alter(statements) => {
                log::info!("altering table '{table}' with {} statements", statements.len());
                log::debug!("alter statements: {statements:#?}");
                let statement_id = self.client.execute(&new.into(), &statements).await?;
                Ok(Some(OnEventResponse::new(id).with_token(Some(statement_id))))
            }
        }
    }

    async fn is_update_complete(&self, request: &Request<TableProperties>) -> Result<Completion> {
        self.is_statement_complete(request).await
    }

    async fn on_delete(&self, request: &Request<TableProperties>) -> Result<OnEventResponse> {
        let id = request.physical_id()?;
        let table = Self::table_name(request, &request.properties);
        log::info!("dropping table '{table}'");
        let statements = [format!("DROP TABLE IF EXISTS {table}")];
        match self
            .client
            .execute(&(&request.properties).into(), &statements)
            .await
        {
            Ok(statement_id) => Ok(OnEventResponse::new(id).with_token(Some(statement_id))),
            Err(err) if err.is_not_found() => {
                log::info!("table '{table}' not found, idempotently succeeded");
                Ok(OnEventResponse::new(id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn is_delete_complete(&self, request: &Request<TableProperties>) -> Result<Completion> {
        is_drop_complete(&self.client, request.token.as_deref()).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::poll::check;

    #[test]
    fn statement_statuses() {
        let statement = |status: &str, error: Option<&str>| StatementDescription {
            id: "s-1".to_owned(),
            status: status.into(),
            error: error.map(str::to_owned),
        };
        for status in ["SUBMITTED", "PICKED", "STARTED"] {
            assert!(!check("statement", "s-1", &statement(status, None)).unwrap());
        }
        assert!(check("statement", "s-1", &statement("FINISHED", None)).unwrap());
        let err = check(
            "statement",
            "s-1",
            &statement("FAILED", Some("relation already exists")),
        )
        .unwrap_err();
        assert_eq!(
            "statement 's-1' is in a FAILED status: relation already exists",
            err.to_string()
        );
        assert!(check("statement", "s-1", &statement("ALL", None)).is_err());
    }

    #[test]
    fn physical_id_layout() {
        let props = TableProperties {
            cluster_name: "cluster".to_owned(),
            database_name: "db".to_owned(),
            table_name: props::TableName {
                prefix: "events".to_owned(),
                generate_suffix: true,
            },
            ..Default::default()
        };
        assert_eq!(
            "cluster:db:events:0123456789ab",
            physical_id(&(&props).into(), &props.table_name.prefix, "0123456789ab")
        );
    }

    #[test]
    fn missing_database_is_recognized() {
        let failed = |error: &str| StatementDescription {
            id: "s-1".to_owned(),
            status: StatementStatus::Failed,
            error: Some(error.to_owned()),
        };
        assert!(failed("ERROR: database \"db\" does not exist").database_is_gone());
        assert!(!failed("ERROR: relation \"events\" does not exist").database_is_gone());
        let finished = StatementDescription {
            status: StatementStatus::Finished,
            ..failed("database \"db\" does not exist")
        };
        assert!(!finished.database_is_gone());
    }
}
