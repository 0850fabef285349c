use std::fmt;

/// Tag identifying the kind of the next value in a wire stream.
///
/// Every value on the wire is prefixed by exactly one tag byte. Scalars carry
/// a payload after the tag; array and object boundaries do not.
///
/// | Tag    | Token         | Payload                                  |
/// |--------|---------------|------------------------------------------|
/// | `0x00` | `EndOfStream` | none                                     |
/// | `0x01` | `Number`      | 8-byte big-endian `i64`                  |
/// | `0x02` | `String`      | `u32` big-endian length + UTF-8 bytes    |
/// | `0x03` | `Boolean`     | one byte, `0x00` or `0x01`               |
/// | `0x04` | `BeginArray`  | none                                     |
/// | `0x05` | `EndArray`    | none                                     |
/// | `0x06` | `BeginObject` | none                                     |
/// | `0x07` | `EndObject`   | none                                     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireToken {
    Number,
    String,
    Boolean,
    BeginArray,
    EndArray,
    BeginObject,
    EndObject,
    EndOfStream,
}

impl WireToken {
    pub const fn tag(self) -> u8 {
        match self {
            WireToken::EndOfStream => 0x00,
            WireToken::Number => 0x01,
            WireToken::String => 0x02,
            WireToken::Boolean => 0x03,
            WireToken::BeginArray => 0x04,
            WireToken::EndArray => 0x05,
            WireToken::BeginObject => 0x06,
            WireToken::EndObject => 0x07,
        }
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(WireToken::EndOfStream),
            0x01 => Some(WireToken::Number),
            0x02 => Some(WireToken::String),
            0x03 => Some(WireToken::Boolean),
            0x04 => Some(WireToken::BeginArray),
            0x05 => Some(WireToken::EndArray),
            0x06 => Some(WireToken::BeginObject),
            0x07 => Some(WireToken::EndObject),
            _ => None,
        }
    }

    /// Returns `true` for tokens that start a value (scalars and opening
    /// boundaries).
    pub const fn starts_value(self) -> bool {
        matches!(
            self,
            WireToken::Number
                | WireToken::String
                | WireToken::Boolean
                | WireToken::BeginArray
                | WireToken::BeginObject
        )
    }
}

impl fmt::Display for WireToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireToken::Number => "NUMBER",
            WireToken::String => "STRING",
            WireToken::Boolean => "BOOLEAN",
            WireToken::BeginArray => "BEGIN_ARRAY",
            WireToken::EndArray => "END_ARRAY",
            WireToken::BeginObject => "BEGIN_OBJECT",
            WireToken::EndObject => "END_OBJECT",
            WireToken::EndOfStream => "END_OF_STREAM",
        };
        f.write_str(name)
    }
}
