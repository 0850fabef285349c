use serde_json::{Map, Value};

use super::error::{Result, WirecallError};
use crate::wire::value::type_name;
use crate::wire::{ValueReader, ValueWriter, WireReader, WireWriter};

/// An encoded RPC request.
///
/// The body is the wire stream `String(method) Object(params) END_OF_STREAM`;
/// the optional payload travels as raw bytes after the terminator. A request
/// is immutable once built and is shared read-only between a call and its
/// clones.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: String,
    body: Vec<u8>,
    payload: Option<Vec<u8>>,
}

impl Request {
    /// Encodes a request whose parameter object is filled in by `params`.
    ///
    /// `params` runs with the parameter object already open and must write
    /// named entries only.
    pub fn new<F>(method: impl Into<String>, params: F) -> Result<Self>
    where
        F: FnOnce(&mut WireWriter) -> Result<()>,
    {
        let method = method.into();
        let mut writer = WireWriter::with_capacity(64);
        writer.write_string(&method)?;
        writer.begin_object()?;
        params(&mut writer)?;
        writer.end_object()?;

        Ok(Request {
            method,
            body: writer.finish()?,
            payload: None,
        })
    }

    /// Encodes a request from untyped scalar parameters. Null parameters are
    /// left out.
    pub fn from_params(method: impl Into<String>, params: &Map<String, Value>) -> Result<Self> {
        Self::new(method, |writer| ValueWriter::write_all(writer, params))
    }

    /// Attaches a binary payload sent after the stream terminator.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// The full frame body: encoded stream followed by the payload, if any.
    pub fn to_frame(&self) -> Vec<u8> {
        let payload = self.payload.as_deref().unwrap_or_default();
        let mut frame = Vec::with_capacity(self.body.len() + payload.len());
        frame.extend_from_slice(&self.body);
        frame.extend_from_slice(payload);
        frame
    }
}

/// A request as seen by the receiving side, decoded generically.
///
/// Servers and test doubles use this to inspect what a client sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedRequest {
    pub method: String,
    pub params: Map<String, Value>,
    pub payload: Vec<u8>,
}

impl ReceivedRequest {
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(frame);
        let method = reader.read_string()?;
        let params = match ValueReader::read(&mut reader)? {
            Value::Object(params) => params,
            other => {
                return Err(WirecallError::Serialization(format!(
                    "request parameters must be an object, found {}",
                    type_name(&other)
                )))
            }
        };
        let payload = reader.finish()?.to_vec();

        Ok(ReceivedRequest {
            method,
            params,
            payload,
        })
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}
