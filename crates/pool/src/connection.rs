//! Collaborator traits: raw connections, their factory, and probe operations.
//!
//! The pool never speaks the directory protocol itself. It opens connections
//! through a [`ConnectionFactory`], closes them through [`Connection`], and
//! health-checks them through the two [`DirectoryProbe`] operations.

use std::future::Future;

use dirpool_resilience::OperationError;
use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;

/// An open protocol connection.
pub trait Connection: Send + 'static {
    /// Cheap local liveness check; no network round trip.
    fn is_usable(&self) -> bool {
        true
    }

    /// Release the underlying transport.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens connections to a specific endpoint.
///
/// Bind, TLS and SASL negotiation happen inside the factory and are opaque
/// to the pool.
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Connection type produced by this factory
    type Connection: Connection;
    /// Error reported when a connection cannot be opened
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new connection to `endpoint`.
    fn create(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;
}

/// Attribute value assertion against a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareRequest {
    /// Entry to compare against
    pub dn: String,
    /// Attribute description
    pub attribute: String,
    /// Asserted value
    pub value: String,
}

/// Base-object search with a size limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Entry the search is scoped to
    pub base_dn: String,
    /// Search filter in string form
    pub filter: String,
    /// Maximum entries to return
    pub size_limit: u32,
}

/// The two side-effect-free operations used for health probes.
pub trait DirectoryProbe: Connection {
    /// Run a compare; `Ok(true)` when the assertion holds.
    fn compare(
        &mut self,
        request: &CompareRequest,
    ) -> impl Future<Output = Result<bool, OperationError>> + Send;

    /// Run an object-scope search; returns the number of entries found.
    fn search(
        &mut self,
        request: &SearchRequest,
    ) -> impl Future<Output = Result<usize, OperationError>> + Send;
}
