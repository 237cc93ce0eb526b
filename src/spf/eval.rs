//! check_host() evaluation (RFC 7208 Section 4 and 5).

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use tracing::{debug, trace};

use crate::common::cidr::{build_networks, canonical_ip, contains, network_for, DualCidr};
use crate::common::dns::DnsResolver;
use crate::common::domain::{has_macro, is_within, sender_domain};

use super::budget::{Budget, EvalLimits};
use super::error::SpfError;
use super::lookup::lookup_spf;
use super::mechanism::{Mechanism, MechanismKind};
use super::record::SpfRecord;
use super::types::SpfResult;

pub type EvalFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SpfError>> + Send + 'a>>;

/// Outcome of one top-level evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfVerdict {
    pub result: SpfResult,
    /// Why the result is PermError or TempError.
    pub error: Option<SpfError>,
    /// DNS-backed lookups charged against the budget.
    pub lookups: usize,
    pub void_lookups: usize,
}

impl SpfVerdict {
    fn new(outcome: Result<SpfResult, SpfError>, budget: &Budget) -> Self {
        let (result, error) = match outcome {
            Ok(result) => (result, None),
            Err(e) => (e.result(), Some(e)),
        };
        Self {
            result,
            error,
            lookups: budget.lookups_used(),
            void_lookups: budget.void_lookups_used(),
        }
    }

    pub fn result(&self) -> SpfResult {
        self.result
    }
}

/// SPF evaluator (RFC 7208 check_host()).
pub struct SpfEvaluator<R: DnsResolver> {
    resolver: R,
    limits: EvalLimits,
}

impl<R: DnsResolver> SpfEvaluator<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            limits: EvalLimits::default(),
        }
    }

    pub fn limits(mut self, limits: EvalLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub(super) fn new_budget(&self) -> Budget {
        Budget::new(self.limits)
    }

    /// Fetch the SPF record of `domain` and evaluate it for `ip`.
    pub async fn check_host(&self, ip: IpAddr, domain: &str) -> SpfVerdict {
        let mut budget = self.new_budget();
        let outcome = self.check_domain(domain, ip, &mut budget).await;
        let verdict = SpfVerdict::new(outcome, &budget);
        debug!(
            domain,
            %ip,
            result = %verdict.result,
            lookups = verdict.lookups,
            "SPF evaluation finished"
        );
        verdict
    }

    /// Evaluate for a sender address `local@domain`. A bare domain, such as a
    /// HELO identity, is used as is.
    pub async fn check_sender(&self, ip: IpAddr, sender: &str) -> SpfVerdict {
        let domain = sender_domain(sender).trim();
        if domain.is_empty() {
            debug!(sender, "no domain in sender");
            return SpfVerdict::new(Ok(SpfResult::None), &self.new_budget());
        }
        self.check_host(ip, domain).await
    }

    /// Evaluate an already parsed record with a fresh budget.
    pub async fn evaluate(&self, record: &SpfRecord, ip: IpAddr) -> SpfVerdict {
        let mut budget = self.new_budget();
        let outcome = self.evaluate_with_budget(record, ip, &mut budget).await;
        SpfVerdict::new(outcome, &budget)
    }

    /// Walk the terms of `record` in order; the first matching mechanism decides.
    pub fn evaluate_with_budget<'a>(
        &'a self,
        record: &'a SpfRecord,
        ip: IpAddr,
        budget: &'a mut Budget,
    ) -> EvalFuture<'a, SpfResult> {
        Box::pin(async move {
            let ip = canonical_ip(ip);

            for mechanism in record.mechanisms() {
                trace!(domain = %record.owner, term = %mechanism, "evaluating");
                if self.matches(mechanism, ip, budget).await? {
                    let result = mechanism.qualifier.result();
                    debug!(domain = %record.owner, term = %mechanism, %result, "mechanism matched");
                    return Ok(result);
                }
            }

            if let Some(target) = record.redirect() {
                budget.charge_lookup(&format!("redirect={target}"))?;
                if has_macro(target) {
                    debug!(domain = %record.owner, target, "macro redirect target not expanded");
                    return Ok(SpfResult::None);
                }
                budget.enter(target)?;
                let result = self.check_domain(target, ip, budget).await;
                budget.leave();
                return result;
            }

            Ok(SpfResult::Neutral)
        })
    }

    async fn check_domain(
        &self,
        domain: &str,
        ip: IpAddr,
        budget: &mut Budget,
    ) -> Result<SpfResult, SpfError> {
        match lookup_spf(&self.resolver, domain).await? {
            Some(record) => self.evaluate_with_budget(&record, ip, budget).await,
            None => Ok(SpfResult::None),
        }
    }

    async fn matches(
        &self,
        mechanism: &Mechanism,
        ip: IpAddr,
        budget: &mut Budget,
    ) -> Result<bool, SpfError> {
        let term = mechanism.to_string();
        let domain = mechanism.domain.as_str();

        // Macros are not expanded: the term costs its lookup and never matches.
        if mechanism.requires_lookup() && has_macro(domain) {
            budget.charge_lookup(&term)?;
            debug!(term, "macro domain not expanded, no match");
            return Ok(false);
        }

        match &mechanism.kind {
            MechanismKind::All => Ok(true),
            MechanismKind::Ip4 { addr, prefix } => {
                Ok(network_for(IpAddr::V4(*addr), *prefix).is_some_and(|net| net.contains(&ip)))
            }
            MechanismKind::Ip6 { addr, prefix } => {
                Ok(network_for(IpAddr::V6(*addr), *prefix).is_some_and(|net| net.contains(&ip)))
            }
            MechanismKind::A { cidr, .. } => {
                budget.charge_lookup(&term)?;
                let addrs = self.resolve_ips(domain, &term, budget).await?;
                Ok(contains(&build_networks(addrs, *cidr), ip))
            }
            MechanismKind::Mx { cidr, .. } => self.match_mx(domain, *cidr, ip, &term, budget).await,
            MechanismKind::Ptr(_) => self.match_ptr(domain, ip, &term, budget).await,
            MechanismKind::Exists(_) => {
                budget.charge_lookup(&term)?;
                let addrs = self.resolve_ips(domain, &term, budget).await?;
                Ok(!addrs.is_empty())
            }
            MechanismKind::Include(_) => {
                budget.charge_lookup(&term)?;
                budget.enter(domain)?;
                let nested = self.check_domain(domain, ip, budget).await;
                budget.leave();
                // Errors propagate through `?`; of the remaining results only
                // Pass makes the include match.
                Ok(nested? == SpfResult::Pass)
            }
        }
    }

    async fn match_mx(
        &self,
        domain: &str,
        cidr: DualCidr,
        ip: IpAddr,
        term: &str,
        budget: &mut Budget,
    ) -> Result<bool, SpfError> {
        for host in self.mx_hosts(domain, term, budget).await? {
            budget.charge_lookup(term)?;
            let addrs = self.resolve_ips(&host, term, budget).await?;
            if contains(&build_networks(addrs, cidr), ip) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn match_ptr(
        &self,
        domain: &str,
        ip: IpAddr,
        term: &str,
        budget: &mut Budget,
    ) -> Result<bool, SpfError> {
        budget.charge_lookup(term)?;
        // Empty reverse answers are not void lookups.
        let names = match self.resolver.query_ptr(ip).await {
            Ok(names) => names,
            Err(e) if e.is_empty_answer() => return Ok(false),
            Err(e) => return Err(SpfError::from_dns(&ip.to_string(), e)),
        };
        let limit = budget.limits().max_ptr_names;
        Ok(names.iter().take(limit).any(|name| is_within(name, domain)))
    }

    /// Addresses of `host`. An empty answer is charged as a void lookup.
    pub(super) async fn resolve_ips(
        &self,
        host: &str,
        term: &str,
        budget: &mut Budget,
    ) -> Result<Vec<IpAddr>, SpfError> {
        let addrs = match self.resolver.query_ip(host).await {
            Ok(addrs) => addrs,
            Err(e) if e.is_empty_answer() => Vec::new(),
            Err(e) => return Err(SpfError::from_dns(host, e)),
        };
        if addrs.is_empty() {
            trace!(host, term, "void lookup");
            budget.charge_void(term)?;
        }
        Ok(addrs)
    }

    /// MX exchanges of `domain` by preference, charging the MX query itself.
    /// Null MX entries are skipped.
    pub(super) async fn mx_hosts(
        &self,
        domain: &str,
        term: &str,
        budget: &mut Budget,
    ) -> Result<Vec<String>, SpfError> {
        budget.charge_lookup(term)?;
        let mut records = match self.resolver.query_mx(domain).await {
            Ok(records) => records,
            Err(e) if e.is_empty_answer() => Vec::new(),
            Err(e) => return Err(SpfError::from_dns(domain, e)),
        };
        if records.is_empty() {
            budget.charge_void(term)?;
            return Ok(Vec::new());
        }

        let limit = budget.limits().max_mx_hosts;
        if records.len() > limit {
            return Err(SpfError::TooManyMxHosts {
                domain: domain.to_string(),
                count: records.len(),
                limit,
            });
        }

        records.sort_by_key(|(preference, _)| *preference);
        Ok(records
            .into_iter()
            .map(|(_, host)| host)
            .filter(|host| !host.is_empty() && host != ".")
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::dns::mock::MockResolver;
    use crate::common::dns::DnsError;
    use crate::spf::error::SpfParseError;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn ips(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|s| ip(s)).collect()
    }

    async fn check(resolver: MockResolver, domain: &str, client: &str) -> SpfVerdict {
        SpfEvaluator::new(resolver).check_host(ip(client), domain).await
    }

    // ---- ip4 / ip6 / all ----

    #[tokio::test]
    async fn ip4_host_match() {
        let evaluator = SpfEvaluator::new(MockResolver::new());
        let record = SpfRecord::parse("example.com", "v=spf1 ip4:192.0.2.0 -all").unwrap();

        assert_eq!(evaluator.evaluate(&record, ip("192.0.2.0")).await.result, SpfResult::Pass);
        assert_eq!(evaluator.evaluate(&record, ip("192.0.2.1")).await.result, SpfResult::Fail);
        assert_eq!(evaluator.resolver().queries(), 0);
    }

    #[tokio::test]
    async fn first_match_wins() {
        let evaluator = SpfEvaluator::new(MockResolver::new());
        let record =
            SpfRecord::parse("example.com", "v=spf1 ip4:127.0.0.0/8 -ip4:127.0.0.1 -all").unwrap();

        // the broad /8 is textually first, so the narrower fail term is unreachable
        assert_eq!(evaluator.evaluate(&record, ip("127.0.0.1")).await.result, SpfResult::Pass);
        assert_eq!(evaluator.evaluate(&record, ip("10.0.0.1")).await.result, SpfResult::Fail);
    }

    #[tokio::test]
    async fn qualifiers_map_to_results() {
        let evaluator = SpfEvaluator::new(MockResolver::new());
        for (txt, expected) in [
            ("v=spf1 +all", SpfResult::Pass),
            ("v=spf1 -all", SpfResult::Fail),
            ("v=spf1 ~all", SpfResult::SoftFail),
            ("v=spf1 ?all", SpfResult::Neutral),
        ] {
            let record = SpfRecord::parse("example.com", txt).unwrap();
            assert_eq!(evaluator.evaluate(&record, ip("192.0.2.1")).await.result, expected, "{txt}");
        }
    }

    #[tokio::test]
    async fn exhausted_record_is_neutral() {
        let evaluator = SpfEvaluator::new(MockResolver::new());
        let record = SpfRecord::parse("example.com", "v=spf1 ip4:10.0.0.0/8").unwrap();
        let verdict = evaluator.evaluate(&record, ip("192.0.2.1")).await;
        assert_eq!(verdict.result, SpfResult::Neutral);
        assert_eq!(verdict.error, None);
    }

    #[tokio::test]
    async fn ipv6_and_mapped_clients() {
        let evaluator = SpfEvaluator::new(MockResolver::new());
        let record =
            SpfRecord::parse("example.com", "v=spf1 ip6:2001:db8::/32 ip4:192.0.2.0/24 -all").unwrap();

        assert_eq!(evaluator.evaluate(&record, ip("2001:db8::1")).await.result, SpfResult::Pass);
        assert_eq!(evaluator.evaluate(&record, ip("::ffff:192.0.2.9")).await.result, SpfResult::Pass);
        assert_eq!(evaluator.evaluate(&record, ip("2001:db9::1")).await.result, SpfResult::Fail);
    }

    // ---- check_host ----

    #[tokio::test]
    async fn no_record_is_none() {
        let verdict = check(MockResolver::new(), "nonexistent.example", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::None);
        assert_eq!(verdict.lookups, 0);
    }

    #[tokio::test]
    async fn multiple_records_permerror() {
        let mut resolver = MockResolver::new();
        resolver.add_txt("example.com", vec!["v=spf1 -all".into(), "v=spf1 +all".into()]);
        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::PermError);
        assert_eq!(verdict.error, Some(SpfError::MultipleRecords("example.com".into())));
    }

    #[tokio::test]
    async fn txt_tempfail_temperror() {
        let mut resolver = MockResolver::new();
        resolver.add_txt_err("example.com", DnsError::TempFail("timeout".into()));
        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::TempError);
    }

    #[tokio::test]
    async fn check_sender_uses_mail_from_domain() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("google.com", "v=spf1 ip4:74.125.0.0/16 ~all");
        let evaluator = SpfEvaluator::new(resolver);

        let verdict = evaluator.check_sender(ip("74.125.141.26"), "info@google.com").await;
        assert_eq!(verdict.result, SpfResult::Pass);
        let verdict = evaluator.check_sender(ip("127.0.0.1"), "info@google.com").await;
        assert_eq!(verdict.result, SpfResult::SoftFail);
        let verdict = evaluator.check_sender(ip("127.0.0.1"), "").await;
        assert_eq!(verdict.result, SpfResult::None);
    }

    // ---- a ----

    #[tokio::test]
    async fn a_mechanism() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 a -all");
        resolver.add_ip("example.com", ips(&["93.184.216.34", "2001:db8::34"]));
        let evaluator = SpfEvaluator::new(resolver);

        let verdict = evaluator.check_host(ip("93.184.216.34"), "example.com").await;
        assert_eq!(verdict.result, SpfResult::Pass);
        assert_eq!(verdict.lookups, 1);
        let verdict = evaluator.check_host(ip("2001:db8::34"), "example.com").await;
        assert_eq!(verdict.result, SpfResult::Pass);
        let verdict = evaluator.check_host(ip("1.2.3.4"), "example.com").await;
        assert_eq!(verdict.result, SpfResult::Fail);
    }

    #[tokio::test]
    async fn a_mechanism_with_domain_and_prefix() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 a:relay.example.org/24 -all");
        resolver.add_ip("relay.example.org", ips(&["198.51.100.10"]));

        let verdict = check(resolver, "example.com", "198.51.100.200").await;
        assert_eq!(verdict.result, SpfResult::Pass);
    }

    #[tokio::test]
    async fn a_tempfail_aborts() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 a +all");
        resolver.add_ip_err("example.com", DnsError::TempFail("SERVFAIL".into()));

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::TempError);
        assert!(matches!(verdict.error, Some(SpfError::Transient { .. })));
    }

    #[tokio::test]
    async fn a_permanent_dns_failure() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 a +all");
        resolver.add_ip_err("example.com", DnsError::Permanent("REFUSED".into()));

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::PermError);
        assert!(matches!(verdict.error, Some(SpfError::Resolution { .. })));
    }

    // ---- mx ----

    fn mx_resolver(record: &str) -> MockResolver {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", record);
        resolver.add_mx(
            "example.com",
            vec![(20, "mx2.example.com".into()), (10, "mx1.example.com".into())],
        );
        resolver.add_ip("mx1.example.com", ips(&["192.0.2.1"]));
        resolver.add_ip("mx2.example.com", ips(&["192.0.2.2"]));
        resolver
    }

    #[tokio::test]
    async fn mx_mechanism() {
        let evaluator = SpfEvaluator::new(mx_resolver("v=spf1 mx -all"));

        let verdict = evaluator.check_host(ip("192.0.2.2"), "example.com").await;
        assert_eq!(verdict.result, SpfResult::Pass);
        // MX query plus both hosts
        assert_eq!(verdict.lookups, 3);

        let verdict = evaluator.check_host(ip("198.51.100.1"), "example.com").await;
        assert_eq!(verdict.result, SpfResult::Fail);
    }

    #[tokio::test]
    async fn mx_stops_at_first_matching_host() {
        let evaluator = SpfEvaluator::new(mx_resolver("v=spf1 mx -all"));
        let verdict = evaluator.check_host(ip("192.0.2.1"), "example.com").await;
        assert_eq!(verdict.result, SpfResult::Pass);
        assert_eq!(verdict.lookups, 2);
    }

    #[tokio::test]
    async fn mx_with_prefix() {
        let verdict = check(mx_resolver("v=spf1 mx/24 -all"), "example.com", "192.0.2.77").await;
        assert_eq!(verdict.result, SpfResult::Pass);
    }

    #[tokio::test]
    async fn mx_host_limit() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 mx -all");
        let hosts = (0..11).map(|i| (10, format!("mx{i}.example.com"))).collect();
        resolver.add_mx("example.com", hosts);

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::PermError);
        assert!(matches!(
            verdict.error,
            Some(SpfError::TooManyMxHosts { count: 11, limit: 10, .. })
        ));
    }

    #[tokio::test]
    async fn mx_without_records_is_void() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 mx ~all");

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::SoftFail);
        assert_eq!(verdict.void_lookups, 1);
    }

    // ---- ptr ----

    #[tokio::test]
    async fn ptr_label_boundary() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("google.com", "v=spf1 ptr -all");
        resolver.add_ptr(ip("192.0.2.1"), vec!["www.google.com".into()]);
        resolver.add_ptr(ip("192.0.2.2"), vec!["evilgoogle.com".into()]);
        resolver.add_ptr(ip("192.0.2.3"), vec!["Google.COM".into()]);
        let evaluator = SpfEvaluator::new(resolver);

        let verdict = evaluator.check_host(ip("192.0.2.1"), "google.com").await;
        assert_eq!(verdict.result, SpfResult::Pass);
        let verdict = evaluator.check_host(ip("192.0.2.2"), "google.com").await;
        assert_eq!(verdict.result, SpfResult::Fail);
        let verdict = evaluator.check_host(ip("192.0.2.3"), "google.com").await;
        assert_eq!(verdict.result, SpfResult::Pass);
    }

    #[tokio::test]
    async fn ptr_explicit_domain() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 ?ptr:google.com -all");
        resolver.add_ptr(ip("192.0.2.1"), vec!["mail.google.com".into()]);

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::Neutral);
    }

    #[tokio::test]
    async fn ptr_miss_is_not_void() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 a:nx1.example a:nx2.example ptr -all");

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::Fail);
        assert_eq!(verdict.void_lookups, 2);
        assert_eq!(verdict.lookups, 3);
    }

    // ---- exists ----

    #[tokio::test]
    async fn exists_mechanism() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 exists:check.example.org -all");
        resolver.add_ip("check.example.org", ips(&["127.0.0.2"]));
        assert_eq!(check(resolver, "example.com", "203.0.113.9").await.result, SpfResult::Pass);

        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 exists:check.example.org -all");
        let verdict = check(resolver, "example.com", "203.0.113.9").await;
        assert_eq!(verdict.result, SpfResult::Fail);
        assert_eq!(verdict.void_lookups, 1);
    }

    #[tokio::test]
    async fn macro_exists_is_no_match() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 include:esp.example ip4:192.0.2.1 -all");
        resolver.add_spf("esp.example", "v=spf1 exists:%{i}._spf.esp.example -all");
        let evaluator = SpfEvaluator::new(resolver);

        let verdict = evaluator.check_host(ip("192.0.2.1"), "example.com").await;
        assert_eq!(verdict.result, SpfResult::Pass);
        assert_eq!(verdict.error, None);
        assert_eq!(verdict.lookups, 2);
        assert_eq!(verdict.void_lookups, 0);
        // two TXT fetches, the macro target is never queried
        assert_eq!(evaluator.resolver().queries(), 2);
    }

    #[tokio::test]
    async fn macro_redirect_is_none() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 a:%{d}.hosts.example redirect=%{d}._spf.example");

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::None);
        assert_eq!(verdict.lookups, 2);
    }

    // ---- include ----

    #[tokio::test]
    async fn include_pass_matches() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 include:_spf.included.com -all");
        resolver.add_spf("_spf.included.com", "v=spf1 ip4:10.0.0.0/8 -all");
        let evaluator = SpfEvaluator::new(resolver);

        assert_eq!(evaluator.check_host(ip("10.1.2.3"), "example.com").await.result, SpfResult::Pass);
        // nested Fail makes the include a non-match, the outer -all decides
        assert_eq!(evaluator.check_host(ip("192.0.2.1"), "example.com").await.result, SpfResult::Fail);
    }

    #[tokio::test]
    async fn include_uses_outer_qualifier() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 ~include:_spf.included.com +all");
        resolver.add_spf("_spf.included.com", "v=spf1 ip4:10.0.0.0/8");

        let verdict = check(resolver, "example.com", "10.0.0.1").await;
        assert_eq!(verdict.result, SpfResult::SoftFail);
    }

    #[tokio::test]
    async fn include_nested_neutral_and_none_continue() {
        let mut resolver = MockResolver::new();
        resolver.add_spf(
            "example.com",
            "v=spf1 include:neutral.example include:nothing.example ?all",
        );
        resolver.add_spf("neutral.example", "v=spf1 ?all");

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::Neutral);
        assert_eq!(verdict.lookups, 2);
    }

    #[tokio::test]
    async fn include_nested_permerror_propagates() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 include:broken.example +all");
        resolver.add_spf("broken.example", "v=spf1 bogus -all");

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::PermError);
        match verdict.error {
            Some(SpfError::Syntax { domain, source }) => {
                assert_eq!(domain, "broken.example");
                assert_eq!(source, SpfParseError::UnknownMechanism("bogus".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn include_nested_temperror_propagates() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 include:flaky.example +all");
        resolver.add_txt_err("flaky.example", DnsError::TempFail("timeout".into()));

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::TempError);
    }

    #[tokio::test]
    async fn self_include_terminates() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("google.com", "v=spf1 include:google.com");

        let verdict = check(resolver, "google.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::PermError);
        assert!(matches!(verdict.error, Some(SpfError::TooManyLookups { .. })));
    }

    #[tokio::test]
    async fn include_cycle_hits_depth_limit() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("a.example", "v=spf1 include:b.example -all");
        resolver.add_spf("b.example", "v=spf1 include:a.example -all");
        let evaluator = SpfEvaluator::new(resolver).limits(EvalLimits {
            max_lookups: 1000,
            max_depth: 3,
            ..EvalLimits::default()
        });

        let verdict = evaluator.check_host(ip("192.0.2.1"), "a.example").await;
        assert_eq!(verdict.result, SpfResult::PermError);
        assert!(matches!(verdict.error, Some(SpfError::DepthExceeded { limit: 3, .. })));
    }

    // ---- redirect ----

    #[tokio::test]
    async fn redirect_replaces_evaluation() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 redirect=_spf.example.org");
        resolver.add_spf("_spf.example.org", "v=spf1 a ip4:192.0.2.0/24 ~all");
        resolver.add_ip("_spf.example.org", ips(&["203.0.113.5"]));
        let evaluator = SpfEvaluator::new(resolver);

        assert_eq!(evaluator.check_host(ip("192.0.2.5"), "example.com").await.result, SpfResult::Pass);
        // `a` in the target defaults to the target domain
        assert_eq!(evaluator.check_host(ip("203.0.113.5"), "example.com").await.result, SpfResult::Pass);
        assert_eq!(
            evaluator.check_host(ip("198.51.100.1"), "example.com").await.result,
            SpfResult::SoftFail
        );
    }

    #[tokio::test]
    async fn redirect_to_missing_record() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 redirect=_spf.sample.invalid");

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::None);
        assert_eq!(verdict.lookups, 1);
    }

    #[tokio::test]
    async fn redirect_after_all_is_unreachable() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 -all redirect=other.example");
        resolver.add_spf("other.example", "v=spf1 +all");
        let evaluator = SpfEvaluator::new(resolver);

        let verdict = evaluator.check_host(ip("192.0.2.1"), "example.com").await;
        assert_eq!(verdict.result, SpfResult::Fail);
        assert_eq!(evaluator.resolver().queries(), 1);
    }

    // ---- budgets ----

    #[tokio::test]
    async fn lookup_limit_enforced() {
        let mut resolver = MockResolver::new();
        let terms: Vec<String> = (1..=11).map(|i| format!("a:h{i}.example")).collect();
        resolver.add_spf("example.com", &format!("v=spf1 {} -all", terms.join(" ")));
        for i in 1..=11 {
            resolver.add_ip(&format!("h{i}.example"), ips(&["10.0.0.1"]));
        }

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::PermError);
        assert_eq!(
            verdict.error,
            Some(SpfError::TooManyLookups {
                limit: 10,
                term: "a:h11.example".into()
            })
        );
        assert_eq!(verdict.lookups, 10);
    }

    #[tokio::test]
    async fn lookup_budget_shared_across_includes() {
        let mut resolver = MockResolver::new();
        let inner: Vec<String> = (1..=9).map(|i| format!("a:h{i}.example")).collect();
        resolver.add_spf("example.com", "v=spf1 include:inner.example a -all");
        resolver.add_spf("inner.example", &format!("v=spf1 {} -all", inner.join(" ")));
        for i in 1..=9 {
            resolver.add_ip(&format!("h{i}.example"), ips(&["10.0.0.1"]));
        }
        resolver.add_ip("example.com", ips(&["192.0.2.1"]));

        // include + 9 inner lookups use the whole budget before the outer `a`
        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::PermError);
        assert!(matches!(
            verdict.error,
            Some(SpfError::TooManyLookups { ref term, .. }) if term == "a"
        ));
    }

    #[tokio::test]
    async fn void_lookup_limit() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 a:nx1.example a:nx2.example a:nx3.example -all");

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::PermError);
        assert!(matches!(verdict.error, Some(SpfError::TooManyVoidLookups { limit: 2, .. })));
    }

    #[tokio::test]
    async fn two_void_lookups_allowed() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 a:nx1.example exists:nx2.example -all");

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        assert_eq!(verdict.result, SpfResult::Fail);
        assert_eq!(verdict.void_lookups, 2);
    }

    #[tokio::test]
    async fn stops_resolving_after_match() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 ip4:192.0.2.1 a mx include:x.example -all");
        let evaluator = SpfEvaluator::new(resolver);

        let verdict = evaluator.check_host(ip("192.0.2.1"), "example.com").await;
        assert_eq!(verdict.result, SpfResult::Pass);
        assert_eq!(verdict.lookups, 0);
        assert_eq!(evaluator.resolver().queries(), 1);
    }

    #[tokio::test]
    async fn error_detail_names_domain() {
        let mut resolver = MockResolver::new();
        resolver.add_spf("example.com", "v=spf1 include:broken.example -all");
        resolver.add_spf("broken.example", "v=spf1 ip4:10.0.0.0/99");

        let verdict = check(resolver, "example.com", "192.0.2.1").await;
        let message = verdict.error.unwrap().to_string();
        assert!(message.contains("broken.example"), "{message}");
    }
}
