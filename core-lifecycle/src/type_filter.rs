//! Resource kinds that are never tracked.
//!
//! Hosts create many short-lived resources for their own housekeeping
//! (timers, DNS lookups, stream wrappers, microtasks). Tracking them would
//! grow the registry without bound and make "nothing leaked" assertions fail
//! on resources test code never created.

use std::collections::HashSet;

/// Host-internal resource kinds, in byte order.
pub const IGNORED_TYPES: &[&str] = &[
    "FSEVENTWRAP",
    "FSREQCALLBACK",
    "GETADDRINFOREQWRAP",
    "GETNAMEINFOREQWRAP",
    "HTTPCLIENTREQUEST",
    "HTTPINCOMINGMESSAGE",
    "Immediate",
    "JSSTREAM",
    "Microtask",
    "PBKDF2REQUEST",
    "PIPECONNECTWRAP",
    "PIPEWRAP",
    "PROCESSWRAP",
    "PROMISE",
    "QUERYWRAP",
    "RANDOMBYTESREQUEST",
    "SHUTDOWNWRAP",
    "SIGNALWRAP",
    "SSLCONNECTION",
    "STATWATCHER",
    "TCPCONNECTWRAP",
    "TCPSERVERWRAP",
    "TCPWRAP",
    "TLSWRAP",
    "TTYWRAP",
    "TickObject",
    "Timeout",
    "UDPSENDWRAP",
    "UDPWRAP",
    "WRITEWRAP",
    "ZLIB",
];

/// Membership test over [`IGNORED_TYPES`] plus caller-supplied kinds.
#[derive(Debug, Clone, Default)]
pub struct TypeFilter {
    additional: HashSet<String>,
}

impl TypeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter that also ignores every name in `types`.
    pub fn with_additional<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            additional: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether resources reported under `type_name` are skipped.
    pub fn is_ignored(&self, type_name: &str) -> bool {
        Self::is_builtin(type_name) || self.additional.contains(type_name)
    }

    /// Whether `type_name` is one of the host-internal kinds.
    pub fn is_builtin(type_name: &str) -> bool {
        IGNORED_TYPES.binary_search(&type_name).is_ok()
    }
}
