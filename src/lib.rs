//! SPF (Sender Policy Framework) evaluation.
//!
//! Parses `v=spf1` records, evaluates them for a client address and derives
//! the networks a record permits. DNS access goes through the [`DnsResolver`]
//! trait; caching is the resolver's responsibility.

pub mod common;
pub mod spf;

pub use common::cidr::DualCidr;
pub use common::dns::{DnsError, DnsResolver, HickoryResolver};
pub use spf::{
    Budget, EvalLimits, Mechanism, MechanismKind, Modifier, Qualifier, SpfError, SpfEvaluator,
    SpfParseError, SpfRecord, SpfResult, SpfVerdict, Term,
};
