//! Parse and evaluation errors.

use thiserror::Error;

use crate::common::dns::DnsError;

use super::types::SpfResult;

/// Error type for SPF record parsing. All parse failures map to PermError in evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpfParseError {
    #[error("invalid SPF version: expected 'v=spf1'")]
    InvalidVersion,
    #[error("unknown mechanism: {0}")]
    UnknownMechanism(String),
    #[error("unknown modifier: {0}")]
    UnknownModifier(String),
    #[error("invalid argument in `{term}`: {reason}")]
    InvalidArgument { term: String, reason: String },
    #[error("missing required argument in `{0}`")]
    MissingArgument(String),
    #[error("invalid CIDR prefix in `{0}`")]
    InvalidCidr(String),
    #[error("duplicate modifier: {0}")]
    DuplicateModifier(String),
}

/// Reason an evaluation ended in PermError or TempError.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpfError {
    #[error("invalid SPF record for {domain}: {source}")]
    Syntax {
        domain: String,
        #[source]
        source: SpfParseError,
    },
    #[error("{0} publishes more than one SPF record")]
    MultipleRecords(String),
    #[error("DNS lookup limit of {limit} exceeded at `{term}`")]
    TooManyLookups { limit: usize, term: String },
    #[error("void lookup limit of {limit} exceeded at `{term}`")]
    TooManyVoidLookups { limit: usize, term: String },
    #[error("{domain} has {count} MX hosts, limit is {limit}")]
    TooManyMxHosts {
        domain: String,
        count: usize,
        limit: usize,
    },
    #[error("recursion depth limit of {limit} exceeded entering {domain}")]
    DepthExceeded { limit: usize, domain: String },
    #[error("transient DNS failure for {domain}: {source}")]
    Transient {
        domain: String,
        #[source]
        source: DnsError,
    },
    #[error("DNS failure for {domain}: {source}")]
    Resolution {
        domain: String,
        #[source]
        source: DnsError,
    },
}

impl SpfError {
    /// Wrap a resolver failure, keeping the transient/permanent distinction.
    pub fn from_dns(domain: &str, source: DnsError) -> Self {
        let domain = domain.to_string();
        match source {
            DnsError::TempFail(_) => SpfError::Transient { domain, source },
            _ => SpfError::Resolution { domain, source },
        }
    }

    pub fn result(&self) -> SpfResult {
        match self {
            SpfError::Transient { .. } => SpfResult::TempError,
            _ => SpfResult::PermError,
        }
    }
}
