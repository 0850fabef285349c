//! Response envelope.
//!
//! Every response is a single object followed by the stream terminator:
//!
//! ```text
//! { "code": NUMBER, "message": STRING?, "data": any? }  END_OF_STREAM
//! ```
//!
//! A zero `code` means success and `data`, if present, is the method's
//! return value. Any other code is an application-level failure reported as
//! [`WirecallError::Application`]; the exchange itself succeeded.

use serde_json::Value;

use super::error::{Result, WirecallError};
use crate::transform::TypeAdapter;
use crate::wire::{ValueReader, ValueWriter, WireReader, WireToken, WireWriter};

/// Result code of a successful call.
pub const CODE_OK: i64 = 0;

const FIELD_CODE: &str = "code";
const FIELD_MESSAGE: &str = "message";
const FIELD_DATA: &str = "data";

/// Untyped view of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub code: i64,
    pub message: Option<String>,
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    pub fn success(data: Value) -> Self {
        ResponseEnvelope {
            code: CODE_OK,
            message: None,
            data: (!data.is_null()).then_some(data),
        }
    }

    /// A successful response without data.
    pub fn empty() -> Self {
        ResponseEnvelope {
            code: CODE_OK,
            message: None,
            data: None,
        }
    }

    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        ResponseEnvelope {
            code,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_OK
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = WireWriter::new();
        writer.begin_object()?;
        writer.write_name(FIELD_CODE, WireToken::Number)?;
        writer.write_number(self.code)?;
        if let Some(message) = &self.message {
            writer.write_name(FIELD_MESSAGE, WireToken::String)?;
            writer.write_string(message)?;
        }
        if let Some(data) = self.data.as_ref().filter(|d| !d.is_null()) {
            writer.write_name(FIELD_DATA, ValueWriter::token_of(data)?)?;
            ValueWriter::write(&mut writer, data)?;
        }
        writer.end_object()?;
        writer.finish()
    }

    /// Decodes a response generically.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut envelope = Self::read_header(bytes)?;
        if envelope.is_success() {
            envelope.data = Self::read_data(bytes, |reader| ValueReader::read(reader))?;
        }
        Ok(envelope)
    }

    /// Decodes a response's `data` with `adapter`.
    ///
    /// A non-zero code yields [`WirecallError::Application`] without
    /// touching `data`. Missing data decodes as the adapter's absent value,
    /// so it is only accepted for `()` and `Option` return types.
    pub fn decode_with<T: 'static>(bytes: &[u8], adapter: &dyn TypeAdapter<T>) -> Result<T> {
        let header = Self::read_header(bytes)?;
        if !header.is_success() {
            return Err(WirecallError::Application {
                code: header.code,
                message: header.message.unwrap_or_default(),
            });
        }
        match Self::read_data(bytes, |reader| adapter.read(reader))? {
            Some(value) => Ok(value),
            None => adapter.absent(),
        }
    }

    /// Reads `code` and `message`, skipping everything else.
    fn read_header(bytes: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(bytes);
        let mut code = None;
        let mut message = None;

        reader.begin_object()?;
        while reader.has_next()? {
            match reader.next_name()?.as_str() {
                FIELD_CODE => code = Some(reader.read_number()?),
                FIELD_MESSAGE => message = Some(reader.read_string()?),
                _ => reader.skip_value()?,
            }
        }
        reader.end_object()?;
        reader.finish()?;

        let code = code.ok_or_else(|| {
            WirecallError::Serialization("response has no result code".to_string())
        })?;
        Ok(ResponseEnvelope {
            code,
            message,
            data: None,
        })
    }

    fn read_data<T, F>(bytes: &[u8], mut read: F) -> Result<Option<T>>
    where
        F: FnMut(&mut WireReader<'_>) -> Result<T>,
    {
        let mut reader = WireReader::new(bytes);
        let mut data = None;

        reader.begin_object()?;
        while reader.has_next()? {
            if reader.next_name()? == FIELD_DATA {
                data = Some(read(&mut reader)?);
            } else {
                reader.skip_value()?;
            }
        }
        reader.end_object()?;
        Ok(data)
    }
}
