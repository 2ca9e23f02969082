//! Custom resource events and responses.
//!
//! Events arrive as loosely typed JSON. They are decoded here, once, into a
//! [`Request`] whose properties are the handler's typed configuration.
use std::collections::BTreeMap;

use snafu::prelude::*;

use crate::{DecodeSnafu, Error, MissingFieldSnafu, MissingPhysicalIdSnafu, Result};

/// Attributes returned to CloudFormation once a resource is complete.
pub type Attributes = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl core::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RequestType::Create => "create",
            RequestType::Update => "update",
            RequestType::Delete => "delete",
        })
    }
}

/// The event as it is delivered by the provider framework.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawEvent {
    request_type: RequestType,
    request_id: String,
    stack_id: String,
    logical_resource_id: String,
    #[serde(default)]
    physical_resource_id: Option<String>,
    resource_properties: serde_json::Value,
    #[serde(default)]
    old_resource_properties: Option<serde_json::Value>,
    /// Everything else, including any continuation token.
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

/// A decoded lifecycle event.
#[derive(Clone, Debug, PartialEq)]
pub struct Request<P> {
    pub request_type: RequestType,
    /// Unique id of this request, shared by `on_event` and every
    /// `is_complete` call that follows it.
    pub request_id: String,
    pub stack_id: String,
    /// Template-level name of the resource.
    pub logical_resource_id: String,
    pub physical_resource_id: Option<String>,
    /// Desired configuration.
    pub properties: P,
    /// Prior configuration, present on updates.
    pub old_properties: Option<P>,
    /// Id of the in-flight remote operation, if any.
    pub token: Option<String>,
}

impl<P: serde::de::DeserializeOwned> Request<P> {
    /// Decodes a raw event, reading the continuation token from `token_key`.
    ///
    /// ## Errors
    /// Errs if the envelope or the properties cannot be decoded, or if an
    /// update is missing its prior properties.
    pub fn decode(event: serde_json::Value, token_key: &str) -> Result<Self> {
        let RawEvent {
            request_type,
            request_id,
            stack_id,
            logical_resource_id,
            physical_resource_id,
            resource_properties,
            old_resource_properties,
            mut rest,
        } = serde_json::from_value(event).context(DecodeSnafu { what: "envelope" })?;

        let properties = serde_json::from_value(resource_properties).context(DecodeSnafu {
            what: "resource properties",
        })?;
        let old_properties = old_resource_properties
            .map(serde_json::from_value)
            .transpose()
            .context(DecodeSnafu {
                what: "old resource properties",
            })?;
        if request_type == RequestType::Update {
            ensure!(
                old_properties.is_some(),
                MissingFieldSnafu {
                    field: "OldResourceProperties"
                }
            );
        }

        let token = match rest.remove(token_key) {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(token)) => Some(token),
            Some(other) => {
                return Err(Error::Validation {
                    msg: format!("\"{token_key}\" must be a string, found {other}"),
                })
            }
        };

        Ok(Request {
            request_type,
            request_id,
            stack_id,
            logical_resource_id,
            physical_resource_id,
            properties,
            old_properties,
            token,
        })
    }
}

impl<P> Request<P> {
    /// Returns the physical resource id of the event.
    ///
    /// ## Errors
    /// Errs if the event does not carry one.
    pub fn physical_id(&self) -> Result<&str> {
        self.physical_resource_id
            .as_deref()
            .context(MissingPhysicalIdSnafu {
                request: self.request_type,
            })
    }
}

/// Response of `on_event`.
#[derive(Clone, Debug, PartialEq)]
pub struct OnEventResponse {
    pub physical_resource_id: String,
    pub token: Option<String>,
}

impl OnEventResponse {
    pub fn new(physical_resource_id: impl Into<String>) -> Self {
        OnEventResponse {
            physical_resource_id: physical_resource_id.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Serializes the response, storing the token under `token_key`.
    pub fn into_json(self, token_key: &str) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(
            "PhysicalResourceId".to_owned(),
            self.physical_resource_id.into(),
        );
        if let Some(token) = self.token {
            map.insert(token_key.to_owned(), token.into());
        }
        serde_json::Value::Object(map)
    }
}

/// Outcome of a single completion check.
#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    /// Still working, check again later.
    Pending,
    /// Done, with the resource's attributes if it has any.
    Complete(Option<Attributes>),
}

/// Response of `is_complete`.
///
/// `Data` is never present while the resource is incomplete.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IsCompleteResponse {
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Attributes>,
}

impl From<Completion> for IsCompleteResponse {
    fn from(completion: Completion) -> Self {
        match completion {
            Completion::Pending => IsCompleteResponse {
                is_complete: false,
                data: None,
            },
            Completion::Complete(data) => IsCompleteResponse {
                is_complete: true,
                data,
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Props {
        size: u32,
    }

    fn event(request_type: &str) -> serde_json::Value {
        serde_json::json!({
            "RequestType": request_type,
            "RequestId": "a1b2",
            "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/s/0123456789ab",
            "LogicalResourceId": "Thing",
            "PhysicalResourceId": "thing-1",
            "ResourceProperties": { "size": 2, "ServiceToken": "arn:aws:lambda:fn" },
            "OldResourceProperties": { "size": 1 },
            "ResponseURL": "https://example.com",
            "UpdateId": "u-1"
        })
    }

    #[test]
    fn decodes_update_with_token() {
        let request = Request::<Props>::decode(event("Update"), "UpdateId").unwrap();
        assert_eq!(RequestType::Update, request.request_type);
        assert_eq!(Props { size: 2 }, request.properties);
        assert_eq!(Some(Props { size: 1 }), request.old_properties);
        assert_eq!(Some("u-1"), request.token.as_deref());
        assert_eq!("thing-1", request.physical_id().unwrap());
    }

    #[test]
    fn token_is_absent_under_another_key() {
        let request = Request::<Props>::decode(event("Create"), "StatementId").unwrap();
        assert_eq!(None, request.token);
    }

    #[test]
    fn update_requires_old_properties() {
        let mut event = event("Update");
        event
            .as_object_mut()
            .unwrap()
            .remove("OldResourceProperties");
        let err = Request::<Props>::decode(event, "UpdateId").unwrap_err();
        assert!(matches!(err, Error::MissingField { .. }), "{err}");
    }

    #[test]
    fn unknown_request_type_is_rejected() {
        let err = Request::<Props>::decode(event("Upsert"), "UpdateId").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }), "{err}");
    }

    #[test]
    fn pending_response_has_no_data() {
        let json = serde_json::to_value(IsCompleteResponse::from(Completion::Pending)).unwrap();
        assert_eq!(serde_json::json!({ "IsComplete": false }), json);

        let done = Completion::Complete(Some(Attributes::from([(
            "Name".to_owned(),
            "c".to_owned(),
        )])));
        let json = serde_json::to_value(IsCompleteResponse::from(done)).unwrap();
        assert_eq!(
            serde_json::json!({ "IsComplete": true, "Data": { "Name": "c" } }),
            json
        );
    }

    #[test]
    fn on_event_response_carries_token_under_key() {
        let json = OnEventResponse::new("c-1")
            .with_token(Some("u-9".to_owned()))
            .into_json("EksUpdateId");
        assert_eq!(
            serde_json::json!({ "PhysicalResourceId": "c-1", "EksUpdateId": "u-9" }),
            json
        );
    }
}
