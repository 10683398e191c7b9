//! ==============================================================================
//! access.rs - api key check and cors allow-list
//! ==============================================================================
//!
//! purpose:
//!     decides whether a request may read the cache (shared api key) and
//!     whether the response may name the caller's origin in
//!     Access-Control-Allow-Origin (hostname suffix allow-list).
//!
//! relationships:
//!     - used by: server.rs (before note_access, and when building the reply)
//!
//! ==============================================================================

use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct AccessGate {
    api_key: String,
    allowed_origin: Option<String>,
}

impl AccessGate {
    pub fn new(api_key: impl Into<String>, allowed_origin: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            allowed_origin,
        }
    }

    /// exact, case-sensitive match; a missing key never matches
    pub fn authorize(&self, presented: Option<&str>) -> bool {
        let authorized = presented == Some(self.api_key.as_str());
        if !authorized {
            debug!("request with invalid apiKey {:?}", presented);
        }
        authorized
    }

    /// the value for Access-Control-Allow-Origin, if `origin` is allowed
    pub fn cors_header_for(&self, origin: Option<&str>) -> Option<String> {
        cors_origin(origin, self.allowed_origin.as_deref())
    }
}

/// echo `origin` back iff its hostname ends with `allowed_suffix`
///
/// no suffix, no origin, an unparsable origin or one without a host all
/// yield `None`.
pub fn cors_origin(origin: Option<&str>, allowed_suffix: Option<&str>) -> Option<String> {
    let (origin, suffix) = (origin?, allowed_suffix?);

    let parsed = match Url::parse(origin) {
        Ok(url) => url,
        Err(e) => {
            debug!("ignoring malformed origin {:?}: {}", origin, e);
            return None;
        }
    };

    parsed
        .host_str()
        .filter(|host| host.ends_with(suffix))
        .map(|_| origin.to_string())
}
