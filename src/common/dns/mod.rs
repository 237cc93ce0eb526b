use std::future::Future;
use std::net::IpAddr;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use thiserror::Error;

pub mod mock;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("NXDOMAIN: domain does not exist")]
    NxDomain,
    #[error("no records of the requested type")]
    NoRecords,
    #[error("transient DNS failure: {0}")]
    TempFail(String),
    #[error("DNS failure: {0}")]
    Permanent(String),
}

impl DnsError {
    /// NXDOMAIN and NODATA answers are read as an empty result set.
    pub fn is_empty_answer(&self) -> bool {
        matches!(self, DnsError::NxDomain | DnsError::NoRecords)
    }
}

/// DNS capability consumed by SPF evaluation.
///
/// Each method resolves a single question. Retries and caching, if any,
/// belong to the implementation.
pub trait DnsResolver: Send + Sync {
    /// TXT records for `domain`, one string per record with its
    /// character-strings concatenated.
    fn query_txt(&self, domain: &str) -> impl Future<Output = Result<Vec<String>, DnsError>> + Send;
    /// A and AAAA addresses for `host`.
    fn query_ip(&self, host: &str) -> impl Future<Output = Result<Vec<IpAddr>, DnsError>> + Send;
    /// MX records as `(preference, exchange)` pairs.
    fn query_mx(&self, domain: &str) -> impl Future<Output = Result<Vec<(u16, String)>, DnsError>> + Send;
    /// PTR names for `ip`.
    fn query_ptr(&self, ip: IpAddr) -> impl Future<Output = Result<Vec<String>, DnsError>> + Send;
}

/// Hickory DNS resolver implementation
#[derive(Clone)]
pub struct HickoryResolver {
    resolver: TokioResolver,
}

impl HickoryResolver {
    /// Resolver using the system configuration (`/etc/resolv.conf` on Unix).
    pub fn from_system_conf() -> Result<Self, DnsError> {
        let builder = TokioResolver::builder(TokioConnectionProvider::default())
            .map_err(|e| DnsError::Permanent(e.to_string()))?;
        Ok(Self {
            resolver: builder.build(),
        })
    }

    pub fn with_config(config: ResolverConfig, opts: ResolverOpts) -> Self {
        let resolver = TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();
        Self { resolver }
    }

    fn classify_error(e: &hickory_resolver::ResolveError) -> DnsError {
        let msg = e.to_string();
        let lower = msg.to_lowercase();
        if lower.contains("nxdomain") {
            DnsError::NxDomain
        } else if lower.contains("no record") {
            DnsError::NoRecords
        } else if lower.contains("label") || lower.contains("malformed") {
            DnsError::Permanent(msg)
        } else {
            DnsError::TempFail(msg)
        }
    }
}

impl Default for HickoryResolver {
    fn default() -> Self {
        Self::with_config(ResolverConfig::default(), ResolverOpts::default())
    }
}

/// Combine the A and AAAA answers for one host. A hard failure of either
/// family wins, transient before permanent. An empty answer from one family
/// is empty; when both are empty the A error is reported.
fn merge_families(
    v4: Result<Vec<IpAddr>, DnsError>,
    v6: Result<Vec<IpAddr>, DnsError>,
) -> Result<Vec<IpAddr>, DnsError> {
    match (v4, v6) {
        (Err(e @ DnsError::TempFail(_)), _) | (_, Err(e @ DnsError::TempFail(_))) => Err(e),
        (Err(e @ DnsError::Permanent(_)), _) | (_, Err(e @ DnsError::Permanent(_))) => Err(e),
        (Ok(mut addrs), Ok(more)) => {
            addrs.extend(more);
            Ok(addrs)
        }
        (Ok(addrs), Err(_)) | (Err(_), Ok(addrs)) => Ok(addrs),
        (Err(e), Err(_)) => Err(e),
    }
}

fn strip_root(name: &str) -> String {
    name.trim_end_matches('.').to_string()
}

impl DnsResolver for HickoryResolver {
    async fn query_txt(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        let lookup = self
            .resolver
            .txt_lookup(domain)
            .await
            .map_err(|e| Self::classify_error(&e))?;
        Ok(lookup
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|chunk| String::from_utf8_lossy(chunk))
                    .collect::<String>()
            })
            .collect())
    }

    async fn query_ip(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
        let v4 = match self.resolver.ipv4_lookup(host).await {
            Ok(lookup) => Ok(lookup.iter().map(|a| IpAddr::V4(a.0)).collect()),
            Err(e) => Err(Self::classify_error(&e)),
        };
        let v6 = match self.resolver.ipv6_lookup(host).await {
            Ok(lookup) => Ok(lookup.iter().map(|aaaa| IpAddr::V6(aaaa.0)).collect()),
            Err(e) => Err(Self::classify_error(&e)),
        };
        merge_families(v4, v6)
    }

    async fn query_mx(&self, domain: &str) -> Result<Vec<(u16, String)>, DnsError> {
        let lookup = self
            .resolver
            .mx_lookup(domain)
            .await
            .map_err(|e| Self::classify_error(&e))?;
        Ok(lookup
            .iter()
            .map(|mx| (mx.preference(), strip_root(&mx.exchange().to_string())))
            .collect())
    }

    async fn query_ptr(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        let lookup = self
            .resolver
            .reverse_lookup(ip)
            .await
            .map_err(|e| Self::classify_error(&e))?;
        Ok(lookup.iter().map(|name| strip_root(&name.to_string())).collect())
    }
}
