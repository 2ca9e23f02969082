//! Lambda host for the custom resource lifecycle handlers.
//!
//! One deployed function serves one resource kind and one phase of the
//! provider framework, both chosen through the environment:
//!
//! ```sh
//! LIFECYCLE_RESOURCE=eks-cluster LIFECYCLE_PHASE=on-event handler
//! LIFECYCLE_RESOURCE=redshift-table LIFECYCLE_PHASE=is-complete handler
//! LIFECYCLE_RESOURCE=redshift-user LIFECYCLE_PHASE=on-event handler
//! ```
//!
//! Set `RUST_LOG` to change the log level, it defaults to `info`.
use aws_config::SdkConfig;
use clap::{Parser, ValueEnum};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use lifecycle::{
    eks::{client::EksClient, AssumeRole, ClusterHandler},
    redshift::{
        client::{RedshiftDataClient, SecretsManagerClient},
        user::UserHandler,
        TableHandler,
    },
    Lifecycle,
};
use serde_json::Value;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ResourceKind {
    /// An EKS cluster.
    EksCluster,
    /// A table in a Redshift database.
    RedshiftTable,
    /// A user of a Redshift database.
    RedshiftUser,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Phase {
    /// Start a create, update or delete.
    OnEvent,
    /// Check whether the last event has completed.
    IsComplete,
}

#[derive(Debug, Parser)]
#[command(name = "handler", about = "CloudFormation custom resource lifecycle handler")]
struct Cli {
    /// The kind of resource this function manages.
    #[arg(long, env = "LIFECYCLE_RESOURCE", value_enum)]
    resource: ResourceKind,

    /// The provider framework phase this function serves.
    #[arg(long, env = "LIFECYCLE_PHASE", value_enum)]
    phase: Phase,
}

async fn dispatch<H: Lifecycle>(handler: &H, phase: Phase, event: Value) -> lifecycle::Result<Value> {
    match phase {
        Phase::OnEvent => lifecycle::on_event(handler, event).await,
        Phase::IsComplete => lifecycle::is_complete(handler, event).await,
    }
}

async fn handle(cfg: &SdkConfig, cli: &Cli, event: LambdaEvent<Value>) -> Result<Value, Error> {
    let (payload, context) = event.into_parts();
    log::debug!("invocation {}: {payload}", context.request_id);
    let result = match cli.resource {
        ResourceKind::EksCluster => {
            let role = AssumeRole::from_event(&payload)?;
            let client = EksClient::assuming_role(cfg, &role.role_arn, &role.session_name).await;
            dispatch(&ClusterHandler::new(client), cli.phase, payload).await
        }
        ResourceKind::RedshiftTable => {
            let client = RedshiftDataClient::new(cfg);
            dispatch(&TableHandler::new(client), cli.phase, payload).await
        }
        ResourceKind::RedshiftUser => {
            let handler = UserHandler::new(
                RedshiftDataClient::new(cfg),
                SecretsManagerClient::new(cfg),
            );
            dispatch(&handler, cli.phase, payload).await
        }
    };
    match result {
        Ok(response) => {
            log::info!("response: {response}");
            Ok(response)
        }
        Err(e) => {
            log::error!("{e}");
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        // CloudWatch adds its own timestamps
        .format_timestamp(None)
        .init();
    let cli = Cli::parse();
    log::info!("serving {:?} for {:?} resources", cli.phase, cli.resource);

    let cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    run(service_fn(|event| handle(&cfg, &cli, event))).await
}
