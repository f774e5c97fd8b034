use crate::config::{ClientConfig, Scheme};
use crate::protocol::CONTROL_PATH;
use std::sync::atomic::{AtomicBool, Ordering};

/// One physical device's address and TLS trust state
///
/// The endpoint starts out trying TLS verification against the pinned vendor
/// root. The first verification failure flips it to unverified TLS for the
/// rest of its lifetime; recreate the endpoint to try verification again.
#[derive(Debug)]
pub struct Endpoint {
    host: String,
    ports: Vec<u16>,
    scheme: Scheme,
    verified_tls_failed: AtomicBool,
}

/// A single candidate in the fallback matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub port: u16,
    /// Whether the certificate chain is checked on this attempt
    pub verify_tls: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, config: &ClientConfig) -> Self {
        Self {
            host: host.into(),
            ports: config.ports.clone(),
            scheme: config.scheme,
            verified_tls_failed: AtomicBool::new(false),
        }
    }

    /// Get the device host
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Whether verified TLS has already failed for this endpoint
    pub fn verified_tls_failed(&self) -> bool {
        self.verified_tls_failed.load(Ordering::Acquire)
    }

    /// Permanently downgrade to unverified TLS.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn mark_verified_tls_failed(&self) -> bool {
        !self.verified_tls_failed.swap(true, Ordering::AcqRel)
    }

    /// Ordered attempt matrix for the next request
    pub fn attempts(&self) -> Vec<Attempt> {
        match self.scheme {
            Scheme::Http => self
                .ports
                .iter()
                .map(|&port| Attempt { port, verify_tls: false })
                .collect(),
            Scheme::Https if self.verified_tls_failed() => self
                .ports
                .iter()
                .map(|&port| Attempt { port, verify_tls: false })
                .collect(),
            Scheme::Https => self
                .ports
                .iter()
                .flat_map(|&port| {
                    [
                        Attempt { port, verify_tls: true },
                        Attempt { port, verify_tls: false },
                    ]
                })
                .collect(),
        }
    }

    /// Full URL for a command on the given port
    pub fn url(&self, port: u16, command: &str) -> String {
        format!(
            "{}://{}:{}{}?command={}",
            self.scheme.as_str(),
            self.host,
            port,
            CONTROL_PATH,
            command
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn https() -> Endpoint {
        Endpoint::new("192.168.1.20", &ClientConfig::default())
    }

    #[test]
    fn fresh_endpoint_tries_verified_first_on_each_port() {
        let attempts = https().attempts();
        assert_eq!(
            attempts,
            vec![
                Attempt { port: 443, verify_tls: true },
                Attempt { port: 443, verify_tls: false },
                Attempt { port: 4443, verify_tls: true },
                Attempt { port: 4443, verify_tls: false },
            ]
        );
    }

    #[test]
    fn downgrade_is_one_way_and_reported_once() {
        let endpoint = https();
        assert!(endpoint.mark_verified_tls_failed());
        assert!(!endpoint.mark_verified_tls_failed());
        assert!(endpoint.verified_tls_failed());
        assert_eq!(
            endpoint.attempts(),
            vec![
                Attempt { port: 443, verify_tls: false },
                Attempt { port: 4443, verify_tls: false },
            ]
        );
    }

    #[test]
    fn plain_http_has_no_tls_dimension() {
        let config = ClientConfig {
            scheme: Scheme::Http,
            ports: vec![80, 8080],
            ..ClientConfig::default()
        };
        let endpoint = Endpoint::new("10.0.0.5", &config);
        assert_eq!(endpoint.attempts().len(), 2);
        assert!(endpoint.attempts().iter().all(|a| !a.verify_tls));
        assert_eq!(
            endpoint.url(8080, "getStatusEx"),
            "http://10.0.0.5:8080/httpapi.asp?command=getStatusEx"
        );
    }
}
