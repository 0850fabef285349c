use super::{Scope, WireToken, MAX_DEPTH};
use crate::protocol::error::{Result, WirecallError};

/// Streaming pull reader over an encoded wire stream.
///
/// The reader never materializes values on its own: callers drive it token
/// by token, always able to [`peek`](Self::peek) at the kind of the next
/// value before consuming it. Inside an object each entry's name is read
/// together with its tag and must be taken with [`next_name`](Self::next_name)
/// before the value itself is read.
///
/// # Example
///
/// ```
/// use wirecall_common::wire::{WireReader, WireToken, WireWriter};
///
/// let mut writer = WireWriter::new();
/// writer.begin_object().unwrap();
/// writer.write_name("id", WireToken::Number).unwrap();
/// writer.write_number(7).unwrap();
/// writer.end_object().unwrap();
/// let bytes = writer.finish().unwrap();
///
/// let mut reader = WireReader::new(&bytes);
/// reader.begin_object().unwrap();
/// assert!(reader.has_next().unwrap());
/// assert_eq!(reader.next_name().unwrap(), "id");
/// assert_eq!(reader.read_number().unwrap(), 7);
/// reader.end_object().unwrap();
/// assert_eq!(reader.peek().unwrap(), WireToken::EndOfStream);
/// ```
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    scopes: Vec<Scope>,
    peeked: Option<WireToken>,
    pending_name: Option<String>,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            scopes: Vec::new(),
            peeked: None,
            pending_name: None,
        }
    }

    /// Byte offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Nesting depth of the current scope (0 at top level).
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Returns the kind of the next value without consuming it.
    ///
    /// Running out of bytes at top level reads as `EndOfStream`; running out
    /// inside an array or object is a structural error.
    pub fn peek(&mut self) -> Result<WireToken> {
        if let Some(token) = self.peeked {
            return Ok(token);
        }

        let scope = self.scopes.last().copied();
        if self.pos >= self.buf.len() {
            return match scope {
                None => {
                    self.peeked = Some(WireToken::EndOfStream);
                    Ok(WireToken::EndOfStream)
                }
                Some(scope) => Err(WirecallError::Structural(format!(
                    "truncated stream inside {} at byte {}",
                    scope, self.pos
                ))),
            };
        }

        let tag = self.buf[self.pos];
        let token = WireToken::from_tag(tag).ok_or_else(|| {
            WirecallError::Structural(format!("unknown tag 0x{:02x} at byte {}", tag, self.pos))
        })?;

        match (scope, token) {
            (None, WireToken::EndArray | WireToken::EndObject) => {
                return Err(WirecallError::Structural(format!(
                    "unbalanced {} at top level",
                    token
                )));
            }
            (Some(Scope::Array), WireToken::EndObject | WireToken::EndOfStream)
            | (Some(Scope::Object), WireToken::EndArray | WireToken::EndOfStream) => {
                return Err(WirecallError::Structural(format!(
                    "{} inside {} at byte {}",
                    token,
                    scope.map(|s| s.to_string()).unwrap_or_default(),
                    self.pos
                )));
            }
            _ => {}
        }
        self.pos += 1;

        if scope == Some(Scope::Object) && token.starts_value() {
            let len = u16::from_be_bytes(self.take_array::<2>()?) as usize;
            let raw = self.take(len)?;
            let name = std::str::from_utf8(raw)
                .map_err(|e| WirecallError::Structural(format!("invalid UTF-8 in field name: {}", e)))?;
            self.pending_name = Some(name.to_string());
        }

        self.peeked = Some(token);
        Ok(token)
    }

    /// Returns `true` while the current array, object or stream has more
    /// values.
    pub fn has_next(&mut self) -> Result<bool> {
        let token = self.peek()?;
        Ok(!matches!(
            token,
            WireToken::EndArray | WireToken::EndObject | WireToken::EndOfStream
        ))
    }

    /// Takes the name of the next object entry.
    pub fn next_name(&mut self) -> Result<String> {
        if self.scopes.last() != Some(&Scope::Object) {
            return Err(WirecallError::Structural(
                "next_name called outside of an object".to_string(),
            ));
        }
        let token = self.peek()?;
        self.pending_name
            .take()
            .ok_or_else(|| WirecallError::unexpected("a field name", token))
    }

    pub fn read_number(&mut self) -> Result<i64> {
        self.consume(WireToken::Number, "a number")?;
        Ok(i64::from_be_bytes(self.take_array::<8>()?))
    }

    pub fn read_string(&mut self) -> Result<String> {
        self.consume(WireToken::String, "a string")?;
        let len = u32::from_be_bytes(self.take_array::<4>()?) as usize;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|e| WirecallError::Structural(format!("invalid UTF-8 in string: {}", e)))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.consume(WireToken::Boolean, "a boolean")?;
        match self.take_array::<1>()?[0] {
            0x00 => Ok(false),
            0x01 => Ok(true),
            other => Err(WirecallError::Structural(format!(
                "invalid boolean byte 0x{:02x}",
                other
            ))),
        }
    }

    pub fn begin_array(&mut self) -> Result<()> {
        self.consume(WireToken::BeginArray, "the start of an array")?;
        self.push(Scope::Array)
    }

    pub fn end_array(&mut self) -> Result<()> {
        self.close(Scope::Array, WireToken::EndArray)
    }

    pub fn begin_object(&mut self) -> Result<()> {
        self.consume(WireToken::BeginObject, "the start of an object")?;
        self.push(Scope::Object)
    }

    pub fn end_object(&mut self) -> Result<()> {
        self.close(Scope::Object, WireToken::EndObject)
    }

    /// Consumes the next value whatever its kind, including nested arrays
    /// and objects. Inside an object a pending field name is discarded too.
    pub fn skip_value(&mut self) -> Result<()> {
        let token = self.peek()?;
        if self.scopes.last() == Some(&Scope::Object) {
            self.pending_name = None;
        }
        match token {
            WireToken::Number => self.read_number().map(drop),
            WireToken::String => self.read_string().map(drop),
            WireToken::Boolean => self.read_bool().map(drop),
            WireToken::BeginArray => {
                self.begin_array()?;
                while self.has_next()? {
                    self.skip_value()?;
                }
                self.end_array()
            }
            WireToken::BeginObject => {
                self.begin_object()?;
                while self.has_next()? {
                    self.next_name()?;
                    self.skip_value()?;
                }
                self.end_object()
            }
            other => Err(WirecallError::unexpected("a value", other)),
        }
    }

    /// Consumes the stream terminator and returns the bytes that follow it.
    ///
    /// Trailing bytes carry a request's binary attachment.
    pub fn finish(mut self) -> Result<&'a [u8]> {
        if let Some(scope) = self.scopes.last() {
            return Err(WirecallError::Structural(format!(
                "stream finished with an open {}",
                scope
            )));
        }
        match self.peek()? {
            WireToken::EndOfStream => Ok(&self.buf[self.pos.min(self.buf.len())..]),
            other => Err(WirecallError::Structural(format!(
                "expected END_OF_STREAM, found {}",
                other
            ))),
        }
    }

    fn consume(&mut self, expected: WireToken, what: &str) -> Result<()> {
        let token = self.peek()?;
        if token != expected {
            return Err(WirecallError::unexpected(what, token));
        }
        if self.pending_name.is_some() {
            return Err(WirecallError::Structural(format!(
                "{} read before its field name",
                token
            )));
        }
        self.peeked = None;
        Ok(())
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
        let token = self.peek()?;
        if token != end {
            return Err(WirecallError::Structural(format!(
                "{} still has unread values (next is {})",
                scope, token
            )));
        }
        self.peeked = None;
        self.scopes.pop();
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(WirecallError::Structural(format!(
                "truncated stream: needed {} bytes at byte {}, {} available",
                len,
                self.pos,
                self.buf.len().saturating_sub(self.pos)
            ))),
        }
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}
