//! Fuzz target for the database bootstrap host rewrite.
//!
//! Feeds arbitrary connection strings through `resolve_connection_string`
//! with a resolver that always answers, and checks that a rewrite changes
//! nothing but the host.
//!
//! Run with: `cargo +nightly fuzz run fuzz_connection_string`

#![no_main]

use std::io;
use std::net::Ipv4Addr;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use opsdesk::bootstrap::{Ipv4Resolver, Resolution, resolve_connection_string};

#[derive(Arbitrary, Debug)]
struct Input {
    connection_string: String,
    address: [u8; 4],
    /// Build a well-formed URL around the raw string instead.
    wrap: bool,
}

struct FixedResolver(Ipv4Addr);

impl Ipv4Resolver for FixedResolver {
    fn lookup_ipv4(&self, _host: &str, _port: u16) -> io::Result<Vec<Ipv4Addr>> {
        Ok(vec![self.0])
    }
}

fuzz_target!(|input: Input| {
    let raw = if input.wrap {
        format!("postgres://user:pw@{}:5432/db?x=1", input.connection_string)
    } else {
        input.connection_string
    };
    let address = Ipv4Addr::from(input.address);

    match resolve_connection_string(&raw, &FixedResolver(address)) {
        Resolution::Rewritten {
            connection_string, ..
        } => {
            let before = url::Url::parse(raw.trim()).expect("rewritten input must have parsed");
            let after = url::Url::parse(&connection_string).expect("rewrite must stay parseable");

            // INVARIANT: host becomes the literal address
            assert_eq!(after.host_str(), Some(address.to_string().as_str()));

            // INVARIANT: everything else survives
            assert_eq!(before.scheme(), after.scheme());
            assert_eq!(before.username(), after.username());
            assert_eq!(before.password(), after.password());
            assert_eq!(before.port(), after.port());
            assert_eq!(before.path(), after.path());
            assert_eq!(before.query(), after.query());
            assert_eq!(before.fragment(), after.fragment());
        },
        Resolution::AlreadyIpv4 { host } => {
            // INVARIANT: only taken for real IPv4 literals
            assert!(host.parse::<Ipv4Addr>().is_ok(), "not an IPv4 literal: {host:?}");
        },
        Resolution::Failed(_) => {},
    }
});
