//! Infrastructure shared by the SPF modules: DNS, networks, domain names.

pub mod cidr;
pub mod dns;
pub mod domain;
