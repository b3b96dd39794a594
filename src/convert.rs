//! Response conversion.
//!
//! A [`Converter`] turns a [`RawResponse`] into a JSON value (or a failure);
//! the value is then deserialized into the caller's type. Keeping the
//! converter object-safe lets the registry hold one behind an `Arc`.

use crate::response::RawResponse;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Converts raw responses for every call dispatched through a registry.
///
/// Implementations decide which statuses count as failures and may unwrap
/// envelopes such as `{"code": 0, "data": {...}}`, reporting application
/// errors as [`Error::Response`].
pub trait Converter: Send + Sync {
    fn convert(&self, response: &RawResponse) -> Result<Value>;
}

/// The default converter.
///
/// - 2xx with an empty or `null` body converts to `Value::Null`
/// - 2xx otherwise must be valid JSON
/// - 4xx fails with [`Error::RequestParams`]
/// - 5xx fails with [`Error::ServerResponse`]
/// - anything else fails with [`Error::ConvertFailed`]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverter;

impl Converter for JsonConverter {
    fn convert(&self, response: &RawResponse) -> Result<Value> {
        let status = response.status;

        if status.is_success() {
            if response.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&response.body).map_err(|e| Error::ConvertFailed {
                raw_response: response.body.clone(),
                message: e.to_string(),
                status,
            });
        }

        if status.is_client_error() {
            Err(Error::RequestParams {
                status,
                raw_response: response.body.clone(),
            })
        } else if status.is_server_error() {
            Err(Error::ServerResponse {
                status,
                raw_response: response.body.clone(),
            })
        } else {
            Err(Error::ConvertFailed {
                raw_response: response.body.clone(),
                message: format!("unexpected status {}", status),
                status,
            })
        }
    }
}

/// Runs `converter` and deserializes its output into `T`.
///
/// A `null` value that `T` cannot represent is reported as
/// [`Error::NullResult`] rather than a conversion failure.
pub(crate) fn decode<T: DeserializeOwned>(
    converter: &dyn Converter,
    response: &RawResponse,
) -> Result<T> {
    let value = converter.convert(response)?;
    let was_null = value.is_null();

    serde_json::from_value(value).map_err(|e| {
        if was_null {
            Error::NullResult {
                status: response.status,
            }
        } else {
            tracing::error!(
                error = %e,
                raw_response = %response.body,
                "Failed to deserialize response"
            );
            Error::ConvertFailed {
                raw_response: response.body.clone(),
                message: e.to_string(),
                status: response.status,
            }
        }
    })
}
