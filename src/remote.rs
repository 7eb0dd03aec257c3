//! Prometheus remote write / remote read wire protocol.
//!
//! - [`proto`]: prost message definitions
//! - [`codec`]: snappy framing plus conversion to and from storage types

pub mod codec;
pub mod proto;

pub use codec::{
    CodecError, decode_read_request, decode_read_response, decode_write_request,
    encode_read_request, encode_read_response, encode_write_request,
};
