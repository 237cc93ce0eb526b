//! Processing limits (RFC 7208 Section 4.6.4) and the budget that enforces them.

use serde::Deserialize;
use tracing::warn;

use super::error::SpfError;

/// Limits applied to one top-level evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalLimits {
    /// Terms and hops that cause DNS queries (`a`, `mx`, MX hosts, `ptr`,
    /// `exists`, `include`, `redirect`).
    pub max_lookups: usize,
    /// Lookups answered with NXDOMAIN or no records.
    pub max_void_lookups: usize,
    /// Nested `include`/`redirect` hops.
    pub max_depth: usize,
    /// MX hosts a single `mx` term may expand to.
    pub max_mx_hosts: usize,
    /// PTR names examined by a `ptr` term.
    pub max_ptr_names: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_lookups: 10,
            max_void_lookups: 2,
            max_depth: 10,
            max_mx_hosts: 10,
            max_ptr_names: 10,
        }
    }
}

/// Remaining work for one evaluation, shared by every recursion level.
#[derive(Debug, Clone)]
pub struct Budget {
    limits: EvalLimits,
    depth: usize,
    lookups: usize,
    void_lookups: usize,
}

impl Budget {
    pub fn new(limits: EvalLimits) -> Self {
        Self {
            limits,
            depth: limits.max_depth,
            lookups: limits.max_lookups,
            void_lookups: limits.max_void_lookups,
        }
    }

    pub fn limits(&self) -> &EvalLimits {
        &self.limits
    }

    /// Charge one DNS-backed lookup for `term`.
    pub fn charge_lookup(&mut self, term: &str) -> Result<(), SpfError> {
        if self.lookups == 0 {
            warn!(term, limit = self.limits.max_lookups, "SPF DNS lookup limit exceeded");
            return Err(SpfError::TooManyLookups {
                limit: self.limits.max_lookups,
                term: term.to_string(),
            });
        }
        self.lookups -= 1;
        Ok(())
    }

    /// Record a lookup that came back empty.
    pub fn charge_void(&mut self, term: &str) -> Result<(), SpfError> {
        if self.void_lookups == 0 {
            warn!(term, limit = self.limits.max_void_lookups, "SPF void lookup limit exceeded");
            return Err(SpfError::TooManyVoidLookups {
                limit: self.limits.max_void_lookups,
                term: term.to_string(),
            });
        }
        self.void_lookups -= 1;
        Ok(())
    }

    /// Descend into the record of `domain`. Pair with [`Budget::leave`].
    pub fn enter(&mut self, domain: &str) -> Result<(), SpfError> {
        if self.depth == 0 {
            warn!(domain, limit = self.limits.max_depth, "SPF recursion depth exceeded");
            return Err(SpfError::DepthExceeded {
                limit: self.limits.max_depth,
                domain: domain.to_string(),
            });
        }
        self.depth -= 1;
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = (self.depth + 1).min(self.limits.max_depth);
    }

    pub fn lookups_used(&self) -> usize {
        self.limits.max_lookups - self.lookups
    }

    pub fn void_lookups_used(&self) -> usize {
        self.limits.max_void_lookups - self.void_lookups
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::new(EvalLimits::default())
    }
}
