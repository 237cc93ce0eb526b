/// Normalize a domain: lowercase + strip trailing dot.
pub fn normalize(domain: &str) -> String {
    let d = domain.trim().to_ascii_lowercase();
    d.strip_suffix('.').unwrap_or(&d).to_string()
}

pub fn domains_equal(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Check if `child` is a proper subdomain of `parent`, on a label boundary.
pub fn is_subdomain_of(child: &str, parent: &str) -> bool {
    let nc = normalize(child);
    let np = normalize(parent);
    nc.len() > np.len() && nc.ends_with(&format!(".{np}"))
}

/// `name` is `domain` itself or lies beneath it.
pub fn is_within(name: &str, domain: &str) -> bool {
    domains_equal(name, domain) || is_subdomain_of(name, domain)
}

/// Domain part of `local@domain`. Input without `@` is returned as is,
/// which covers a bare HELO identity.
pub fn sender_domain(sender: &str) -> &str {
    match sender.rsplit_once('@') {
        Some((_, domain)) => domain,
        None => sender,
    }
}

/// A domain-spec accepted by the parser: non-empty, printable ASCII,
/// no empty labels. Macro strings are checked for syntax and kept opaque.
pub fn is_valid_domain_spec(spec: &str) -> bool {
    let trimmed = spec.strip_suffix('.').unwrap_or(spec);
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_graphic()) {
        return false;
    }
    if has_macro(trimmed) {
        return is_valid_macro_string(trimmed);
    }
    !trimmed.contains('/')
        && trimmed.split('.').all(|label| !label.is_empty() && label.len() <= 63)
}

/// The domain-spec carries macros (`%{i}`, `%%` and friends).
pub fn has_macro(spec: &str) -> bool {
    spec.contains('%')
}

/// RFC 7208 Section 7.1 macro-string syntax. Only letters valid outside
/// `exp=` text are accepted.
fn is_valid_macro_string(s: &str) -> bool {
    let mut rest = s;
    while let Some(pos) = rest.find('%') {
        if rest[..pos].contains('/') {
            return false;
        }
        let after = &rest[pos + 1..];
        rest = match after.as_bytes().first() {
            Some(b'%' | b'_' | b'-') => &after[1..],
            Some(b'{') => match after.find('}') {
                Some(end) if is_valid_macro_body(&after[1..end]) => &after[end + 1..],
                _ => return false,
            },
            _ => return false,
        };
    }
    !rest.contains('/')
}

/// `<letter>[<digits>][r][<delimiters>]`
fn is_valid_macro_body(body: &str) -> bool {
    let mut chars = body.chars().peekable();
    match chars.next() {
        Some(c) if "slodiphv".contains(c.to_ascii_lowercase()) => {}
        _ => return false,
    }
    while chars.next_if(|c| c.is_ascii_digit()).is_some() {}
    chars.next_if(|c| c.eq_ignore_ascii_case(&'r'));
    chars.all(|c| ".-+,/_=".contains(c))
}
