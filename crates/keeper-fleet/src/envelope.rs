//! The `{code, data, msg}` response envelope.

use bytes::Bytes;
use http::Response;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use keeper_core::{KeeperError, KeeperResult};

/// `code` value that marks a successful envelope.
pub const SUCCESS_CODE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    pub data: Option<T>,
    #[serde(default)]
    pub msg: String,
}

impl<T> Envelope<T> {
    /// The payload of a successful envelope; an `Api` error otherwise.
    pub fn into_data(self) -> KeeperResult<Option<T>> {
        if self.code != SUCCESS_CODE {
            return Err(KeeperError::Api {
                code: self.code,
                message: self.msg,
            });
        }
        Ok(self.data)
    }
}

/// Decode an envelope from a buffered response.
///
/// A body that is not an envelope is reported as an `Api` error carrying
/// the HTTP status when the status is not 2xx, and as a `Decode` error
/// otherwise.
pub fn decode<T: DeserializeOwned>(response: &Response<Bytes>) -> KeeperResult<Envelope<T>> {
    match serde_json::from_slice::<Envelope<T>>(response.body()) {
        Ok(envelope) => Ok(envelope),
        Err(e) if !response.status().is_success() => Err(KeeperError::Api {
            code: i64::from(response.status().as_u16()),
            message: format!("non-envelope response body: {e}"),
        }),
        Err(e) => Err(KeeperError::Decode(e.to_string())),
    }
}

/// Decode and unwrap a payload that must be present.
pub fn decode_data<T: DeserializeOwned>(response: &Response<Bytes>) -> KeeperResult<T> {
    decode::<T>(response)?
        .into_data()?
        .ok_or_else(|| KeeperError::Decode("envelope has no data".into()))
}

/// Check a response whose payload is irrelevant.
pub fn decode_ack(response: &Response<Bytes>) -> KeeperResult<()> {
    decode::<serde_json::Value>(response)?.into_data().map(|_| ())
}
