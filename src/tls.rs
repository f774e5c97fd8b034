//! HTTP clients for the two TLS trust modes.
//!
//! The devices present a certificate chained to a vendor self-signed root
//! whose subject never matches the device address. The verified client trusts
//! only that root and ignores hostnames; the unverified client accepts any
//! certificate.

use crate::config::ClientConfig;
use crate::error::{LinkplayError, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION};
use std::sync::Once;

/// Vendor root certificate the device chains are signed with
pub const PINNED_ROOT_PEM: &[u8] = include_bytes!("certs/linkplay_root.pem");

static PINNED_ROOT_WARNING: Once = Once::new();

/// HTTP clients for one endpoint
#[derive(Clone)]
pub(crate) struct TlsClients {
    /// `None` when the pinned root could not be loaded
    pub verified: Option<reqwest::Client>,
    pub unverified: reqwest::Client,
}

/// Build the verified and unverified clients.
///
/// Failing to load the pinned root is not fatal: the verified client is left
/// out and a warning is logged once per process.
pub(crate) fn build_clients(config: &ClientConfig) -> Result<TlsClients> {
    build_clients_with_root(config, PINNED_ROOT_PEM)
}

pub(crate) fn build_clients_with_root(config: &ClientConfig, root_pem: &[u8]) -> Result<TlsClients> {
    let unverified = base_builder(config)
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| LinkplayError::Tls(e.to_string()))?;

    let verified = if config.pinned_ca {
        match pinned_client(config, root_pem) {
            Ok(client) => Some(client),
            Err(e) => {
                PINNED_ROOT_WARNING.call_once(|| {
                    tracing::warn!(
                        "Failed to load pinned vendor root certificate ({}); using unverified TLS",
                        e
                    );
                });
                None
            }
        }
    } else {
        None
    };

    Ok(TlsClients { verified, unverified })
}

fn pinned_client(config: &ClientConfig, pem: &[u8]) -> std::result::Result<reqwest::Client, reqwest::Error> {
    let root = reqwest::Certificate::from_pem(pem)?;
    base_builder(config)
        .tls_built_in_root_certs(false)
        .add_root_certificate(root)
        .danger_accept_invalid_hostnames(true)
        .build()
}

fn base_builder(config: &ClientConfig) -> reqwest::ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(CONNECTION, HeaderValue::from_static("close"));

    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .default_headers(headers)
}
