//! Networks a record authorizes, computed without a client address.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;
use tracing::debug;

use crate::common::cidr::{build_networks, network_for};
use crate::common::dns::DnsResolver;
use crate::common::domain::has_macro;

use super::budget::Budget;
use super::error::SpfError;
use super::eval::{EvalFuture, SpfEvaluator};
use super::lookup::lookup_spf;
use super::mechanism::MechanismKind;
use super::record::SpfRecord;
use super::types::Qualifier;

impl<R: DnsResolver> SpfEvaluator<R> {
    /// Union of the networks reachable through Pass-qualified `ip4`, `ip6`,
    /// `a`, `mx` and `include` terms. `ptr` and `exists` cannot be expressed
    /// as networks and are skipped. A Pass-qualified `all` permits everything.
    ///
    /// DNS lookups are charged against the same limits as evaluation.
    pub async fn permitted_networks(&self, record: &SpfRecord) -> Result<Vec<IpNet>, SpfError> {
        let mut budget = self.new_budget();
        let mut networks = Vec::new();
        self.collect_networks(record, &mut budget, &mut networks).await?;

        let mut seen = HashSet::new();
        networks.retain(|net| seen.insert(*net));
        debug!(domain = %record.owner, count = networks.len(), "computed permitted networks");
        Ok(networks)
    }

    fn collect_networks<'a>(
        &'a self,
        record: &'a SpfRecord,
        budget: &'a mut Budget,
        out: &'a mut Vec<IpNet>,
    ) -> EvalFuture<'a, ()> {
        Box::pin(async move {
            for mechanism in record.mechanisms() {
                let pass = mechanism.qualifier == Qualifier::Pass;
                let term = mechanism.to_string();
                let domain = mechanism.domain.as_str();

                match &mechanism.kind {
                    // nothing after `all` is reachable, including a redirect
                    MechanismKind::All => {
                        if pass {
                            out.extend(network_for(IpAddr::V4(Ipv4Addr::UNSPECIFIED), Some(0)));
                            out.extend(network_for(IpAddr::V6(Ipv6Addr::UNSPECIFIED), Some(0)));
                        }
                        return Ok(());
                    }
                    _ if !pass => {}
                    _ if mechanism.requires_lookup() && has_macro(domain) => {
                        budget.charge_lookup(&term)?;
                    }
                    MechanismKind::Ip4 { addr, prefix } => {
                        out.extend(network_for((*addr).into(), *prefix));
                    }
                    MechanismKind::Ip6 { addr, prefix } => {
                        out.extend(network_for((*addr).into(), *prefix));
                    }
                    MechanismKind::A { cidr, .. } => {
                        budget.charge_lookup(&term)?;
                        let addrs = self.resolve_ips(domain, &term, budget).await?;
                        out.extend(build_networks(addrs, *cidr));
                    }
                    MechanismKind::Mx { cidr, .. } => {
                        for host in self.mx_hosts(domain, &term, budget).await? {
                            budget.charge_lookup(&term)?;
                            let addrs = self.resolve_ips(&host, &term, budget).await?;
                            out.extend(build_networks(addrs, *cidr));
                        }
                    }
                    MechanismKind::Include(_) => {
                        budget.charge_lookup(&term)?;
                        self.collect_from_domain(domain, budget, out).await?;
                    }
                    MechanismKind::Ptr(_) | MechanismKind::Exists(_) => {}
                }
            }

            if let Some(target) = record.redirect() {
                budget.charge_lookup(&format!("redirect={target}"))?;
                if !has_macro(target) {
                    self.collect_from_domain(target, budget, out).await?;
                }
            }
            Ok(())
        })
    }

    async fn collect_from_domain(
        &self,
        domain: &str,
        budget: &mut Budget,
        out: &mut Vec<IpNet>,
    ) -> Result<(), SpfError> {
        budget.enter(domain)?;
        let result = match lookup_spf(self.resolver(), domain).await {
            Ok(Some(nested)) => self.collect_networks(&nested, budget, out).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        budget.leave();
        result
    }
}
