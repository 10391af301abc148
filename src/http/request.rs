//! Request metadata helpers.
//!
//! # Responsibilities
//! - Name the correlation header set and propagated by the server layers
//! - Read the request ID back out for handler logs
//! - Resolve the client address behind proxies

use axum::http::{HeaderMap, HeaderName};
use std::net::IpAddr;

use crate::geo::client_addr;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_SOURCE_REGION: &str = "x-source-region";

pub fn request_id_header() -> HeaderName {
    HeaderName::from_static(X_REQUEST_ID)
}

/// Access to the request ID assigned by `SetRequestIdLayer`.
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> &str {
        self.get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}

/// Client address from `X-Forwarded-For`, else the socket peer.
pub fn client_address(headers: &HeaderMap, peer: IpAddr) -> IpAddr {
    let forwarded = headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok());
    client_addr(forwarded, peer)
}
