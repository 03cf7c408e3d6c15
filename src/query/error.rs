//! Errors raised while building or combining Solr queries

use thiserror::Error;

/// All possible errors that can occur while composing subqueries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolrSubqueryError {
    /// The URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Request has no `q` parameter
    #[error("Request has no `q` query parameter")]
    MissingQQueryParameter,

    /// Request has more than one `q` parameter
    #[error("Request has multiple `q` query parameters")]
    MultipleQQueryParameters,

    /// Requests point at different hosts
    #[error("Requests have different hosts: {0:?} and {1:?}")]
    DifferentHosts(Option<String>, Option<String>),

    /// Requests point at different ports
    #[error("Requests have different ports: {0:?} and {1:?}")]
    DifferentPorts(Option<u16>, Option<u16>),

    /// Requests point at different collections or handlers
    #[error("Requests have different paths: {0} and {1}")]
    DifferentPaths(String, String),

    /// Folding was requested on a chain with no queries
    #[error("Query chain is empty")]
    EmptyChain,
}
