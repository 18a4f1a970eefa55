//! Caller identifier resolution.
//!
//! The decision engine only requires a non-empty string per request;
//! producing one belongs to the pipeline integration. A custom resolver can
//! derive the identifier from request metadata (API key, tenant, forwarded
//! address). When no resolver is configured, or the resolver comes back
//! empty, the caller's network address is used.

use std::fmt;
use std::net::IpAddr;

/// Request metadata available to identifier resolution.
///
/// Deliberately small: the pipeline adapter owns the real request type and
/// copies in what resolution needs.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// The caller's network address, when the transport knows it
    pub remote_addr: Option<IpAddr>,
}

impl RequestMeta {
    /// Metadata with no known remote address.
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata for a caller at the given address.
    pub fn with_remote_addr(addr: IpAddr) -> Self {
        Self {
            remote_addr: Some(addr),
        }
    }
}

type ResolverFn = dyn Fn(&RequestMeta) -> Option<String> + Send + Sync;

/// Produces the identifier that groups throttle state per caller.
pub struct IdentifierResolver {
    custom: Option<Box<ResolverFn>>,
}

impl fmt::Debug for IdentifierResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierResolver")
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl Default for IdentifierResolver {
    fn default() -> Self {
        Self::remote_addr()
    }
}

impl IdentifierResolver {
    /// Resolver that identifies callers by their network address.
    pub fn remote_addr() -> Self {
        Self { custom: None }
    }

    /// Resolver with a custom derivation.
    ///
    /// Applications behind a reverse proxy need this: the transport address
    /// is the proxy, not the caller.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&RequestMeta) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            custom: Some(Box::new(f)),
        }
    }

    /// Resolve the identifier, falling back to the remote address when the
    /// custom resolver is absent or produces an empty value. `None` means
    /// the caller cannot be identified and throttling should be skipped.
    pub fn resolve(&self, meta: &RequestMeta) -> Option<String> {
        if let Some(custom) = &self.custom {
            if let Some(id) = custom(meta) {
                if !id.is_empty() {
                    return Some(id);
                }
            }
        }

        meta.remote_addr.map(|addr| addr.to_string())
    }
}
