//! In-memory resolver for hermetic tests.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{DnsError, DnsResolver};

/// Mock DNS resolver for testing.
///
/// Names are matched case-insensitively and without a trailing dot.
/// Unknown names answer NXDOMAIN.
#[derive(Debug, Default)]
pub struct MockResolver {
    txt: HashMap<String, Result<Vec<String>, DnsError>>,
    ip: HashMap<String, Result<Vec<IpAddr>, DnsError>>,
    mx: HashMap<String, Result<Vec<(u16, String)>, DnsError>>,
    ptr: HashMap<IpAddr, Result<Vec<String>, DnsError>>,
    queries: AtomicUsize,
}

fn key(name: &str) -> String {
    crate::common::domain::normalize(name)
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_txt(&mut self, domain: &str, records: Vec<String>) {
        self.txt.insert(key(domain), Ok(records));
    }

    pub fn add_txt_err(&mut self, domain: &str, err: DnsError) {
        self.txt.insert(key(domain), Err(err));
    }

    /// Shorthand for publishing a single SPF record.
    pub fn add_spf(&mut self, domain: &str, record: &str) {
        self.add_txt(domain, vec![record.to_string()]);
    }

    pub fn add_ip(&mut self, host: &str, addrs: Vec<IpAddr>) {
        self.ip.insert(key(host), Ok(addrs));
    }

    pub fn add_ip_err(&mut self, host: &str, err: DnsError) {
        self.ip.insert(key(host), Err(err));
    }

    pub fn add_mx(&mut self, domain: &str, records: Vec<(u16, String)>) {
        self.mx.insert(key(domain), Ok(records));
    }

    pub fn add_mx_err(&mut self, domain: &str, err: DnsError) {
        self.mx.insert(key(domain), Err(err));
    }

    pub fn add_ptr(&mut self, ip: IpAddr, names: Vec<String>) {
        self.ptr.insert(ip, Ok(names));
    }

    pub fn add_ptr_err(&mut self, ip: IpAddr, err: DnsError) {
        self.ptr.insert(ip, Err(err));
    }

    /// Number of queries answered so far, across all record types.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    fn answer<K, T>(&self, table: &HashMap<K, Result<Vec<T>, DnsError>>, k: &K) -> Result<Vec<T>, DnsError>
    where
        K: std::hash::Hash + Eq,
        T: Clone,
    {
        self.queries.fetch_add(1, Ordering::Relaxed);
        table.get(k).cloned().unwrap_or(Err(DnsError::NxDomain))
    }
}

impl DnsResolver for MockResolver {
    async fn query_txt(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        self.answer(&self.txt, &key(domain))
    }

    async fn query_ip(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
        self.answer(&self.ip, &key(host))
    }

    async fn query_mx(&self, domain: &str) -> Result<Vec<(u16, String)>, DnsError> {
        self.answer(&self.mx, &key(domain))
    }

    async fn query_ptr(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        self.answer(&self.ptr, &ip)
    }
}
