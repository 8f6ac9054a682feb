//! RESP Protocol Implementation
//!
//! The wire codec for driftkv: a strict request-frame decoder and the reply
//! encoder.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and serialization
//! - `parser`: Incremental decoder for request frames (arrays of bulk strings)
//!
//! ## Example
//!
//! ```
//! use driftkv::protocol::{parse_request, RespValue};
//! use bytes::Bytes;
//!
//! // Decoding an incoming request
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (args, consumed) = parse_request(data).unwrap().unwrap();
//! assert_eq!(args.len(), 2);
//! assert_eq!(consumed, data.len());
//!
//! // Encoding a reply
//! let response = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(response.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_request, ParseError, ParseResult, Request, RequestParser};
pub use types::RespValue;
