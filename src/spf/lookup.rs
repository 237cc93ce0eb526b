//! SPF record retrieval (RFC 7208 Section 4.4 and 4.5).

use tracing::{debug, warn};

use crate::common::dns::DnsResolver;

use super::error::SpfError;
use super::record::SpfRecord;

/// Query DNS TXT records for a domain, filter for SPF, enforce the
/// single-record constraint, and parse.
///
/// - No TXT record matching `v=spf1`, NXDOMAIN → `Ok(None)`
/// - Multiple TXT records matching `v=spf1` → `Err(MultipleRecords)`
/// - Transient DNS failure → `Err(Transient)`
/// - Parse failure → `Err(Syntax)`
pub async fn lookup_spf<R: DnsResolver>(
    resolver: &R,
    domain: &str,
) -> Result<Option<SpfRecord>, SpfError> {
    let txt_records = match resolver.query_txt(domain).await {
        Ok(records) => records,
        Err(e) if e.is_empty_answer() => return Ok(None),
        Err(e) => return Err(SpfError::from_dns(domain, e)),
    };

    let mut spf_records = txt_records.iter().filter(|s| is_spf_record(s));
    let Some(txt) = spf_records.next() else {
        debug!(domain, "no SPF record published");
        return Ok(None);
    };
    if spf_records.next().is_some() {
        return Err(SpfError::MultipleRecords(domain.to_string()));
    }

    debug!(domain, record = %txt, "fetched SPF record");
    SpfRecord::parse(domain, txt).map(Some).map_err(|source| {
        warn!(domain, error = %source, "malformed SPF record");
        SpfError::Syntax {
            domain: domain.to_string(),
            source,
        }
    })
}

/// Check if a TXT record is an SPF record (case-insensitive v=spf1 prefix).
fn is_spf_record(txt: &str) -> bool {
    let trimmed = txt.trim_start();
    match trimmed.get(..6) {
        Some(version) if version.eq_ignore_ascii_case("v=spf1") => {
            trimmed[6..].is_empty() || trimmed[6..].starts_with(char::is_whitespace)
        }
        _ => false,
    }
}
