use super::{Scope, WireToken, MAX_DEPTH};
use crate::protocol::error::{Result, WirecallError};

/// Streaming writer producing an encoded wire stream.
///
/// Inside an object every value is announced with
/// [`write_name`](Self::write_name), which emits the value's tag and name;
/// the following value call must then match the announced token. Nesting is
/// checked as the stream is built and [`finish`](Self::finish) refuses to
/// terminate a stream with open scopes.
pub struct WireWriter {
    out: Vec<u8>,
    scopes: Vec<Scope>,
    announced: Option<WireToken>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
            scopes: Vec::new(),
            announced: None,
        }
    }

    /// Nesting depth of the current scope (0 at top level).
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Writes an object entry's tag and name. The next value written must be
    /// of kind `token`.
    pub fn write_name(&mut self, name: &str, token: WireToken) -> Result<()> {
        if self.scopes.last() != Some(&Scope::Object) {
            return Err(WirecallError::Structural(format!(
                "field name '{}' written outside of an object",
                name
            )));
        }
        if let Some(pending) = self.announced {
            return Err(WirecallError::Structural(format!(
                "field name '{}' written while a {} value is still pending",
                name, pending
            )));
        }
        if !token.starts_value() {
            return Err(WirecallError::Structural(format!(
                "field '{}' cannot hold {}",
                name, token
            )));
        }
        let len = u16::try_from(name.len()).map_err(|_| {
            WirecallError::Serialization(format!("field name of {} bytes is too long", name.len()))
        })?;

        self.out.push(token.tag());
        self.out.extend_from_slice(&len.to_be_bytes());
        self.out.extend_from_slice(name.as_bytes());
        self.announced = Some(token);
        Ok(())
    }

    pub fn write_number(&mut self, value: i64) -> Result<()> {
        self.open_value(WireToken::Number)?;
        self.out.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len()).map_err(|_| {
            WirecallError::Serialization(format!("string of {} bytes is too long", value.len()))
        })?;
        self.open_value(WireToken::String)?;
        self.out.extend_from_slice(&len.to_be_bytes());
        self.out.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.open_value(WireToken::Boolean)?;
        self.out.push(u8::from(value));
        Ok(())
    }

    pub fn begin_array(&mut self) -> Result<()> {
        self.open_value(WireToken::BeginArray)?;
        self.push(Scope::Array)
    }

    pub fn end_array(&mut self) -> Result<()> {
        self.close(Scope::Array, WireToken::EndArray)
    }

    pub fn begin_object(&mut self) -> Result<()> {
        self.open_value(WireToken::BeginObject)?;
        self.push(Scope::Object)
    }

    pub fn end_object(&mut self) -> Result<()> {
        self.close(Scope::Object, WireToken::EndObject)
    }

    /// Terminates the stream and returns the encoded bytes.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if let Some(scope) = self.scopes.last() {
            return Err(WirecallError::Structural(format!(
                "stream finished with an open {}",
                scope
            )));
        }
        self.out.push(WireToken::EndOfStream.tag());
        Ok(self.out)
    }

    fn open_value(&mut self, token: WireToken) -> Result<()> {
        match self.scopes.last() {
            Some(Scope::Object) => match self.announced.take() {
                Some(announced) if announced == token => Ok(()),
                Some(announced) => Err(WirecallError::Structural(format!(
                    "field announced as {} but {} was written",
                    announced, token
                ))),
                None => Err(WirecallError::Structural(format!(
                    "{} written inside an object without a field name",
                    token
                ))),
            },
            _ => {
                self.out.push(token.tag());
                Ok(())
            }
        }
    }

    fn push(&mut self, scope: Scope) -> Result<()> {
        if self.scopes.len() >= MAX_DEPTH {
            return Err(WirecallError::Structural(format!(
                "nesting deeper than {} levels",
                MAX_DEPTH
            )));
        }
        self.scopes.push(scope);
        Ok(())
    }

    fn close(&mut self, scope: Scope, end: WireToken) -> Result<()> {
        if self.scopes.last() != Some(&scope) {
            return Err(WirecallError::Structural(format!(
                "{} without a matching open {}",
                end, scope
            )));
        }
        if let Some(pending) = self.announced {
            return Err(WirecallError::Structural(format!(
                "{} closed while a {} value is still pending",
                scope, pending
            )));
        }
        self.out.push(end.tag());
        self.scopes.pop();
        Ok(())
    }
}

impl Default for WireWriter {
    fn default() -> Self {
        Self::new()
    }
}
