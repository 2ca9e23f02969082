//! # Lifecycle
//!
//! Lifecycle handlers for CloudFormation custom resources.
//!
//! A custom resource hands the creation, update and deletion of a resource
//! to user code. The provider framework that drives that code calls an
//! `on_event` function once per lifecycle event, then calls an
//! `is_complete` function over and over until it reports completion or the
//! framework gives up. This crate implements that two-phase protocol as the
//! [`Lifecycle`] trait, and provides three handlers built on it:
//!
//! - [`eks::ClusterHandler`] manages an EKS cluster.
//! - [`redshift::TableHandler`] manages a table inside a Redshift database
//!   through the Redshift Data API.
//! - [`redshift::user::UserHandler`] manages a Redshift database user whose
//!   password is kept in Secrets Manager.
//!
//! ## Concepts
//!
//! - **Desired configuration**: the resource properties of the incoming
//!   event, decoded once at the boundary into a typed struct.
//! - **Prior configuration**: the properties of the previous deployment,
//!   only present on updates.
//! - **Physical resource id**: the identity of the provisioned resource. It
//!   is produced by `on_create`, and only changes when an update has to
//!   replace the resource.
//! - **Continuation token**: the id of an in-flight remote operation. It is
//!   returned from `on_event` and travels back in the next `is_complete`
//!   event, so handlers never keep state between invocations.
//!
//! Handlers never sleep or loop waiting for a remote resource. Waiting is
//! expressed by returning [`Completion::Pending`] and letting the framework
//! invoke the handler again later.
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Error`]. Errors from the service APIs
//! are reported as [`ApiError`], which separates "not found" from every
//! other failure so that handlers can treat a missing resource as success
//! where that is the right thing to do.

use std::future::Future;

use snafu::prelude::*;

pub mod diff;
pub mod eks;
pub mod event;
pub mod naming;
pub mod poll;
pub mod props;
pub mod redshift;

pub use event::{Attributes, Completion, IsCompleteResponse, OnEventResponse, Request, RequestType};

/// Errors reported by the service API clients.
#[derive(snafu::Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum ApiError {
    #[snafu(display("{subject} '{id}' was not found"))]
    NotFound { subject: &'static str, id: String },

    #[snafu(display("{source}:\n{}",
                source.chain()
                    .skip(1)
                    .map(|e| format!("{e}"))
                    .collect::<Vec<_>>()
                    .join("\n -> ")))]
    Sdk { source: anyhow::Error },
}

impl From<anyhow::Error> for ApiError {
    fn from(source: anyhow::Error) -> Self {
        ApiError::Sdk { source }
    }
}

impl ApiError {
    /// Sorts a failed service call into "not found" or anything else.
    pub fn classify(
        subject: &'static str,
        id: impl Into<String>,
        not_found: bool,
        source: anyhow::Error,
    ) -> Self {
        if not_found {
            ApiError::NotFound {
                subject,
                id: id.into(),
            }
        } else {
            ApiError::Sdk { source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

/// Top-level error enum that encompasses all errors.
#[derive(snafu::Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Could not decode the {what} of the event: {source}"))]
    Decode {
        what: &'static str,
        source: serde_json::Error,
    },

    #[snafu(display("Could not encode the handler response: {source}"))]
    Encode { source: serde_json::Error },

    #[snafu(display("\"{field}\" is required"))]
    MissingField { field: &'static str },

    #[snafu(display("Cannot handle a {request} request without a physical resource id"))]
    MissingPhysicalId { request: RequestType },

    #[snafu(display("{msg}"))]
    Validation { msg: String },

    #[snafu(display("Cannot update {first} and {second} at the same time"))]
    ConflictingUpdate {
        first: &'static str,
        second: &'static str,
    },

    #[snafu(display("Cannot update {subject} {what} configuration"))]
    Immutable {
        subject: &'static str,
        what: &'static str,
    },

    /// The replacement would reuse the physical identity of the resource it
    /// replaces. `hint` tells the user how to get a fresh one.
    #[snafu(display(
        "Cannot replace {subject} \"{name}\" since the replacement would keep its physical name. {hint}"
    ))]
    NamedReplacement {
        subject: &'static str,
        name: String,
        hint: &'static str,
    },

    #[snafu(display("{subject} '{id}' is in a {status} status{}",
                    detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default()))]
    RemoteFailure {
        subject: &'static str,
        id: String,
        status: String,
        detail: Option<String>,
    },

    #[snafu(display("Unknown status \"{status}\" for {subject} '{id}'"))]
    UnknownStatus {
        subject: &'static str,
        id: String,
        status: String,
    },

    #[snafu(display("{source}"))]
    Api { source: ApiError },
}

impl From<ApiError> for Error {
    fn from(source: ApiError) -> Self {
        Error::Api { source }
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The create/update/delete contract of a custom resource.
///
/// Each `on_*` method starts a lifecycle event and each `is_*_complete`
/// method checks on it. The checks must be re-entrant: everything they need
/// arrives in the [`Request`], either as properties, as the physical
/// resource id, or as the continuation token stored under
/// [`Lifecycle::TOKEN_KEY`].
pub trait Lifecycle {
    /// Decoded `ResourceProperties` of the events this handler accepts.
    type Properties: serde::de::DeserializeOwned + core::fmt::Debug;

    /// Event key that carries the continuation token between `on_event` and
    /// `is_complete`.
    const TOKEN_KEY: &'static str;

    /// Starts creating the resource.
    fn on_create(
        &self,
        request: &Request<Self::Properties>,
    ) -> impl Future<Output = Result<OnEventResponse>>;

    /// Checks on a creation started by [`Lifecycle::on_create`].
    fn is_create_complete(
        &self,
        request: &Request<Self::Properties>,
    ) -> impl Future<Output = Result<Completion>>;

    /// Starts updating the resource.
    ///
    /// Returns `None` when there is nothing to update.
    fn on_update(
        &self,
        request: &Request<Self::Properties>,
    ) -> impl Future<Output = Result<Option<OnEventResponse>>>;

    /// Checks on an update started by [`Lifecycle::on_update`].
    fn is_update_complete(
        &self,
        request: &Request<Self::Properties>,
    ) -> impl Future<Output = Result<Completion>>;

    /// Starts deleting the resource.
    ///
    /// A resource that does not exist counts as deleted.
    fn on_delete(
        &self,
        request: &Request<Self::Properties>,
    ) -> impl Future<Output = Result<OnEventResponse>>;

    /// Checks on a deletion started by [`Lifecycle::on_delete`].
    fn is_delete_complete(
        &self,
        request: &Request<Self::Properties>,
    ) -> impl Future<Output = Result<Completion>>;
}

/// Routes a raw `onEvent` invocation to the handler.
///
/// Returns the JSON response expected by the provider framework, which is
/// `null` when an update turned out to be a no-op.
pub async fn on_event<H: Lifecycle>(
    handler: &H,
    event: serde_json::Value,
) -> Result<serde_json::Value> {
    let request = Request::<H::Properties>::decode(event, H::TOKEN_KEY)?;
    log::info!(
        "on_event: {} '{}' ({})",
        request.request_type,
        request.logical_resource_id,
        request.request_id
    );
    let response = match request.request_type {
        RequestType::Create => Some(handler.on_create(&request).await?),
        RequestType::Update => handler.on_update(&request).await?,
        RequestType::Delete => Some(handler.on_delete(&request).await?),
    };
    log::debug!("on_event response: {response:?}");
    Ok(match response {
        Some(response) => response.into_json(H::TOKEN_KEY),
        None => serde_json::Value::Null,
    })
}

/// Routes a raw `isComplete` invocation to the handler.
pub async fn is_complete<H: Lifecycle>(
    handler: &H,
    event: serde_json::Value,
) -> Result<serde_json::Value> {
    let request = Request::<H::Properties>::decode(event, H::TOKEN_KEY)?;
    log::info!(
        "is_complete: {} '{}' ({})",
        request.request_type,
        request.logical_resource_id,
        request.request_id
    );
    let completion = match request.request_type {
        RequestType::Create => handler.is_create_complete(&request).await?,
        RequestType::Update => handler.is_update_complete(&request).await?,
        RequestType::Delete => handler.is_delete_complete(&request).await?,
    };
    log::debug!("is_complete response: {completion:?}");
    serde_json::to_value(IsCompleteResponse::from(completion)).context(EncodeSnafu)
}
