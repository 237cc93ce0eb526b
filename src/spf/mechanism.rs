//! SPF mechanism types and term-level parsing (RFC 7208 Section 5).

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::common::cidr::DualCidr;
use crate::common::domain::is_valid_domain_spec;

use super::error::SpfParseError;
use super::types::Qualifier;

/// What a mechanism tests. Domains are kept only when written explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MechanismKind {
    /// `all`
    All,
    /// `include:<domain-spec>`
    Include(String),
    /// `a[:<domain-spec>][/cidr4][//cidr6]`
    A {
        domain: Option<String>,
        cidr: DualCidr,
    },
    /// `mx[:<domain-spec>][/cidr4][//cidr6]`
    Mx {
        domain: Option<String>,
        cidr: DualCidr,
    },
    /// `ptr[:<domain-spec>]`
    Ptr(Option<String>),
    /// `ip4:<ip4-network>[/cidr]`
    Ip4 { addr: Ipv4Addr, prefix: Option<u8> },
    /// `ip6:<ip6-network>[/cidr]`
    Ip6 { addr: Ipv6Addr, prefix: Option<u8> },
    /// `exists:<domain-spec>`
    Exists(String),
}

impl MechanismKind {
    pub fn name(&self) -> &'static str {
        match self {
            MechanismKind::All => "all",
            MechanismKind::Include(_) => "include",
            MechanismKind::A { .. } => "a",
            MechanismKind::Mx { .. } => "mx",
            MechanismKind::Ptr(_) => "ptr",
            MechanismKind::Ip4 { .. } => "ip4",
            MechanismKind::Ip6 { .. } => "ip6",
            MechanismKind::Exists(_) => "exists",
        }
    }

    fn explicit_domain(&self) -> Option<&str> {
        match self {
            MechanismKind::Include(d) | MechanismKind::Exists(d) => Some(d.as_str()),
            MechanismKind::A { domain, .. }
            | MechanismKind::Mx { domain, .. }
            | MechanismKind::Ptr(domain) => domain.as_deref(),
            _ => None,
        }
    }
}

/// A parsed mechanism term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mechanism {
    pub qualifier: Qualifier,
    pub kind: MechanismKind,
    /// Domain the mechanism resolves against: the explicit domain-spec,
    /// or the owner of the record it appeared in.
    pub domain: String,
}

impl Mechanism {
    /// Parse one term, qualifier included, belonging to the record of `owner`.
    pub fn parse(term: &str, owner: &str) -> Result<Self, SpfParseError> {
        let mut chars = term.chars();
        let (qualifier, body) = match chars.next().and_then(Qualifier::from_symbol) {
            Some(q) => (q, chars.as_str()),
            None => (Qualifier::Pass, term),
        };
        let kind = parse_kind(body, term)?;
        let domain = kind.explicit_domain().unwrap_or(owner).to_string();
        Ok(Self {
            qualifier,
            kind,
            domain,
        })
    }

    /// Mechanisms that consume the DNS lookup budget when evaluated.
    pub fn requires_lookup(&self) -> bool {
        !matches!(
            self.kind,
            MechanismKind::All | MechanismKind::Ip4 { .. } | MechanismKind::Ip6 { .. }
        )
    }
}

fn parse_kind(body: &str, term: &str) -> Result<MechanismKind, SpfParseError> {
    let split = body.find(|c: char| c == ':' || c == '/').unwrap_or(body.len());
    let (name, rest) = body.split_at(split);

    match name.to_ascii_lowercase().as_str() {
        "all" => {
            if !rest.is_empty() {
                return Err(invalid(term, "all takes no argument"));
            }
            Ok(MechanismKind::All)
        }
        "include" => Ok(MechanismKind::Include(required_domain(rest, term)?)),
        "exists" => Ok(MechanismKind::Exists(required_domain(rest, term)?)),
        "a" => {
            let (domain, cidr) = domain_and_cidr(rest, term)?;
            Ok(MechanismKind::A { domain, cidr })
        }
        "mx" => {
            let (domain, cidr) = domain_and_cidr(rest, term)?;
            Ok(MechanismKind::Mx { domain, cidr })
        }
        "ptr" => {
            if rest.starts_with('/') {
                return Err(SpfParseError::InvalidCidr(term.to_string()));
            }
            let domain = match rest.strip_prefix(':') {
                Some(spec) => Some(domain_spec(spec, term)?),
                None => None,
            };
            Ok(MechanismKind::Ptr(domain))
        }
        "ip4" => {
            let (literal, prefix) = literal_and_prefix(rest, term, 32)?;
            let addr = literal
                .parse::<Ipv4Addr>()
                .map_err(|_| invalid(term, "not an IPv4 address"))?;
            Ok(MechanismKind::Ip4 { addr, prefix })
        }
        "ip6" => {
            let (literal, prefix) = literal_and_prefix(rest, term, 128)?;
            let addr = literal
                .parse::<Ipv6Addr>()
                .map_err(|_| invalid(term, "not an IPv6 address"))?;
            Ok(MechanismKind::Ip6 { addr, prefix })
        }
        _ => Err(SpfParseError::UnknownMechanism(term.to_string())),
    }
}

fn invalid(term: &str, reason: &str) -> SpfParseError {
    SpfParseError::InvalidArgument {
        term: term.to_string(),
        reason: reason.to_string(),
    }
}

fn domain_spec(spec: &str, term: &str) -> Result<String, SpfParseError> {
    if spec.is_empty() {
        return Err(SpfParseError::MissingArgument(term.to_string()));
    }
    if !is_valid_domain_spec(spec) {
        return Err(invalid(term, "malformed domain"));
    }
    Ok(spec.to_string())
}

fn required_domain(rest: &str, term: &str) -> Result<String, SpfParseError> {
    match rest.strip_prefix(':') {
        Some(spec) => domain_spec(spec, term),
        None => Err(SpfParseError::MissingArgument(term.to_string())),
    }
}

fn domain_and_cidr(rest: &str, term: &str) -> Result<(Option<String>, DualCidr), SpfParseError> {
    let (domain, cidr) = match rest.strip_prefix(':') {
        Some(spec) => {
            let (domain, cidr) = spec.split_at(cidr_start(spec));
            (Some(domain_spec(domain, term)?), cidr)
        }
        None => (None, rest),
    };
    Ok((domain, parse_dual_cidr(cidr, term)?))
}

/// Offset of the first `/` outside a `%{...}` macro, or the end of `spec`.
fn cidr_start(spec: &str) -> usize {
    let mut in_macro = false;
    for (i, c) in spec.char_indices() {
        match c {
            '{' => in_macro = true,
            '}' => in_macro = false,
            '/' if !in_macro => return i,
            _ => {}
        }
    }
    spec.len()
}

fn literal_and_prefix<'a>(
    rest: &'a str,
    term: &str,
    max: u8,
) -> Result<(&'a str, Option<u8>), SpfParseError> {
    let value = rest
        .strip_prefix(':')
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SpfParseError::MissingArgument(term.to_string()))?;
    match value.split_once('/') {
        Some((literal, digits)) => Ok((literal, Some(parse_prefix(digits, max, term)?))),
        None => Ok((value, None)),
    }
}

/// Parse `/24`, `//64` or `/24//64`. An empty string is no prefix at all.
fn parse_dual_cidr(s: &str, term: &str) -> Result<DualCidr, SpfParseError> {
    let mut cidr = DualCidr::default();
    let (v4, v6) = match s.find("//") {
        Some(pos) => (&s[..pos], Some(&s[pos + 2..])),
        None => (s, None),
    };
    if !v4.is_empty() {
        let digits = v4
            .strip_prefix('/')
            .ok_or_else(|| SpfParseError::InvalidCidr(term.to_string()))?;
        cidr.v4 = Some(parse_prefix(digits, 32, term)?);
    }
    if let Some(digits) = v6 {
        cidr.v6 = Some(parse_prefix(digits, 128, term)?);
    }
    Ok(cidr)
}

/// Decimal prefix length without sign or leading zeros, at most `max`.
fn parse_prefix(digits: &str, max: u8, term: &str) -> Result<u8, SpfParseError> {
    let err = || SpfParseError::InvalidCidr(term.to_string());
    let well_formed = !digits.is_empty()
        && digits.len() <= 3
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'));
    if !well_formed {
        return Err(err());
    }
    match digits.parse::<u8>() {
        Ok(n) if n <= max => Ok(n),
        _ => Err(err()),
    }
}

impl fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            MechanismKind::All => Ok(()),
            MechanismKind::Include(d) | MechanismKind::Exists(d) => write!(f, ":{d}"),
            MechanismKind::A { domain, cidr } | MechanismKind::Mx { domain, cidr } => {
                if let Some(d) = domain {
                    write!(f, ":{d}")?;
                }
                write!(f, "{cidr}")
            }
            MechanismKind::Ptr(domain) => match domain {
                Some(d) => write!(f, ":{d}"),
                None => Ok(()),
            },
            MechanismKind::Ip4 { addr, prefix } => {
                write!(f, ":{addr}")?;
                match prefix {
                    Some(p) => write!(f, "/{p}"),
                    None => Ok(()),
                }
            }
            MechanismKind::Ip6 { addr, prefix } => {
                write!(f, ":{addr}")?;
                match prefix {
                    Some(p) => write!(f, "/{p}"),
                    None => Ok(()),
                }
            }
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `+` is the default and is never printed
        if self.qualifier != Qualifier::Pass {
            write!(f, "{}", self.qualifier.symbol())?;
        }
        write!(f, "{}", self.kind)
    }
}
