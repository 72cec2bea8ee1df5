//! Supported HTTP verbs.
//!
//! Handler files are matched to a verb by their uppercased stem, so the
//! whitelist here is the complete set of file names that produce routes.

use std::fmt;
use std::str::FromStr;

/// An HTTP method a handler file may be named after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Delete,
    Get,
    Head,
    Patch,
    Post,
    Put,
    Options,
    Search,
    Trace,
    Propfind,
    Proppatch,
    Mkcol,
    Copy,
    Move,
    Lock,
    Unlock,
}

impl HttpMethod {
    /// Every supported method, in whitelist order.
    pub const ALL: [HttpMethod; 16] = [
        HttpMethod::Delete,
        HttpMethod::Get,
        HttpMethod::Head,
        HttpMethod::Patch,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Options,
        HttpMethod::Search,
        HttpMethod::Trace,
        HttpMethod::Propfind,
        HttpMethod::Proppatch,
        HttpMethod::Mkcol,
        HttpMethod::Copy,
        HttpMethod::Move,
        HttpMethod::Lock,
        HttpMethod::Unlock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Delete => "DELETE",
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Search => "SEARCH",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Propfind => "PROPFIND",
            HttpMethod::Proppatch => "PROPPATCH",
            HttpMethod::Mkcol => "MKCOL",
            HttpMethod::Copy => "COPY",
            HttpMethod::Move => "MOVE",
            HttpMethod::Lock => "LOCK",
            HttpMethod::Unlock => "UNLOCK",
        }
    }

    /// Convert to the `http` crate's method type used by axum.
    pub fn to_http(self) -> axum::http::Method {
        match self {
            HttpMethod::Delete => axum::http::Method::DELETE,
            HttpMethod::Get => axum::http::Method::GET,
            HttpMethod::Head => axum::http::Method::HEAD,
            HttpMethod::Patch => axum::http::Method::PATCH,
            HttpMethod::Post => axum::http::Method::POST,
            HttpMethod::Put => axum::http::Method::PUT,
            HttpMethod::Options => axum::http::Method::OPTIONS,
            HttpMethod::Trace => axum::http::Method::TRACE,
            // Extension methods: all-uppercase tokens are always valid.
            other => axum::http::Method::from_bytes(other.as_str().as_bytes())
                .unwrap_or(axum::http::Method::GET),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a name is not in the method whitelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedMethod(pub String);

impl fmt::Display for UnsupportedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method {} is not supported", self.0)
    }
}

impl std::error::Error for UnsupportedMethod {}

impl FromStr for HttpMethod {
    type Err = UnsupportedMethod;

    /// Matches exactly against the uppercase whitelist; callers uppercase first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnsupportedMethod(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whitelist() {
        for method in HttpMethod::ALL {
            assert_eq!(method.as_str().parse::<HttpMethod>(), Ok(method));
        }
        assert!("FETCH".parse::<HttpMethod>().is_err());
        // Matching is exact; the classifier uppercases before parsing.
        assert!("get".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_to_http_extension_methods() {
        assert_eq!(HttpMethod::Get.to_http(), axum::http::Method::GET);
        assert_eq!(HttpMethod::Propfind.to_http().as_str(), "PROPFIND");
        assert_eq!(HttpMethod::Unlock.to_http().as_str(), "UNLOCK");
    }

    #[test]
    fn test_unsupported_display() {
        let err = "WEIRD".parse::<HttpMethod>().unwrap_err();
        assert_eq!(err.to_string(), "method WEIRD is not supported");
    }
}
