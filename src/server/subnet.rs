//! Trusted-subnet filter.
//!
//! With `AppState::trusted_subnet` set, a request is served only when its
//! client address lies inside that network. The client address is taken
//! from `X-Real-IP`, then the first `X-Forwarded-For` entry, then the TCP
//! peer. A request with no usable address is refused.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::error::AppError;
use super::AppState;

pub async fn trusted_subnet(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(subnet) = state.trusted_subnet else {
        return Ok(next.run(req).await);
    };

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());
    match client_ip(req.headers(), peer) {
        Some(ip) if subnet.contains(&ip) => Ok(next.run(req).await),
        Some(ip) => {
            debug!(%ip, %subnet, "client outside trusted subnet");
            Err(AppError::Forbidden(format!("{ip} is not in the trusted subnet")))
        }
        None => Err(AppError::Forbidden("client address unknown".into())),
    }
}

/// Client address as seen through a reverse proxy, falling back to `peer`.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    if let Some(real_ip) = header(headers, "x-real-ip") {
        return real_ip.trim().parse().ok();
    }
    if let Some(forwarded) = header(headers, "x-forwarded-for") {
        return forwarded.split(',').next()?.trim().parse().ok();
    }
    peer
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
