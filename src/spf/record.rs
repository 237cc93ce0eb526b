//! SPF record parsing and canonical formatting.

use std::fmt;

use crate::common::domain::is_valid_domain_spec;

use super::error::SpfParseError;
use super::mechanism::{Mechanism, MechanismKind};

const VERSION: &str = "v=spf1";

/// `name=value` terms. Neither one matches on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    /// `redirect=<domain-spec>`
    Redirect(String),
    /// `exp=<domain-spec>`, kept for formatting only
    Explanation(String),
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::Redirect(d) => write!(f, "redirect={d}"),
            Modifier::Explanation(d) => write!(f, "exp={d}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Mechanism(Mechanism),
    Modifier(Modifier),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Mechanism(m) => write!(f, "{m}"),
            Term::Modifier(m) => write!(f, "{m}"),
        }
    }
}

/// Parsed SPF record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfRecord {
    /// Domain the record was published at; the default target of
    /// `a`, `mx` and `ptr` without an explicit domain.
    pub owner: String,
    /// Terms in source order.
    pub terms: Vec<Term>,
    pub raw: String,
}

impl SpfRecord {
    /// Parse an SPF TXT record published at `owner`.
    ///
    /// The whole record is rejected on the first malformed term. Parsing makes
    /// no DNS queries: records behind `include` and `redirect` are fetched
    /// lazily during evaluation, so a self-include parses here and is stopped
    /// by the evaluation budget.
    pub fn parse(owner: &str, txt: &str) -> Result<Self, SpfParseError> {
        let mut parts = txt.split_whitespace();
        match parts.next() {
            Some(version) if version.eq_ignore_ascii_case(VERSION) => {}
            _ => return Err(SpfParseError::InvalidVersion),
        }

        let mut terms = Vec::new();
        let mut seen_redirect = false;
        let mut seen_exp = false;

        for part in parts {
            match split_modifier(part) {
                Some((name, value)) => {
                    let modifier = parse_modifier(part, name, value)?;
                    let seen = match modifier {
                        Modifier::Redirect(_) => &mut seen_redirect,
                        Modifier::Explanation(_) => &mut seen_exp,
                    };
                    if *seen {
                        return Err(SpfParseError::DuplicateModifier(name.to_ascii_lowercase()));
                    }
                    *seen = true;
                    terms.push(Term::Modifier(modifier));
                }
                None => terms.push(Term::Mechanism(Mechanism::parse(part, owner)?)),
            }
        }

        Ok(Self {
            owner: owner.to_string(),
            terms,
            raw: txt.to_string(),
        })
    }

    pub fn mechanisms(&self) -> impl Iterator<Item = &Mechanism> {
        self.terms.iter().filter_map(|t| match t {
            Term::Mechanism(m) => Some(m),
            Term::Modifier(_) => None,
        })
    }

    pub fn redirect(&self) -> Option<&str> {
        self.terms.iter().find_map(|t| match t {
            Term::Modifier(Modifier::Redirect(d)) => Some(d.as_str()),
            _ => None,
        })
    }

    pub fn explanation(&self) -> Option<&str> {
        self.terms.iter().find_map(|t| match t {
            Term::Modifier(Modifier::Explanation(d)) => Some(d.as_str()),
            _ => None,
        })
    }

    /// True when an `all` mechanism is present, which makes any redirect unreachable.
    pub fn has_all(&self) -> bool {
        self.mechanisms().any(|m| m.kind == MechanismKind::All)
    }
}

/// `name=value` where the name is a plain identifier. Qualified terms and
/// terms carrying `:` or `/` before the `=` are mechanisms.
fn split_modifier(term: &str) -> Option<(&str, &str)> {
    let (name, value) = term.split_once('=')?;
    let is_name = name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    is_name.then_some((name, value))
}

fn parse_modifier(term: &str, name: &str, value: &str) -> Result<Modifier, SpfParseError> {
    let build: fn(String) -> Modifier = match name.to_ascii_lowercase().as_str() {
        "redirect" => Modifier::Redirect,
        "exp" => Modifier::Explanation,
        _ => return Err(SpfParseError::UnknownModifier(term.to_string())),
    };
    if value.is_empty() {
        return Err(SpfParseError::MissingArgument(term.to_string()));
    }
    if !is_valid_domain_spec(value) {
        return Err(SpfParseError::InvalidArgument {
            term: term.to_string(),
            reason: "malformed domain".to_string(),
        });
    }
    Ok(build(value.to_string()))
}

impl fmt::Display for SpfRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(VERSION)?;
        for term in &self.terms {
            write!(f, " {term}")?;
        }
        Ok(())
    }
}
