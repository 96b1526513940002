//! ip-relay Common Types
//!
//! Wire types shared by the relay backend and its clients.

pub mod api;

pub use api::{ErrorResponse, GetIpRequest, GetIpResponse, IpLookupResponse};
