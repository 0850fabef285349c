//! Request/response protocol on top of the wire value model.
//!
//! - [`Request`]: method name plus encoded parameter object and optional
//!   binary payload
//! - [`ResponseEnvelope`]: result code, message and data
//! - [`ParameterBinding`]: member and wire name of one parameter
//! - [`error`]: the crate's error taxonomy

pub mod binding;
pub mod error;
pub mod requests;
pub mod responses;


pub use binding::{derive_wire_name, ParameterBinding};
pub use error::{Result, WirecallError};
pub use requests::{ReceivedRequest, Request};
pub use responses::{ResponseEnvelope, CODE_OK};
