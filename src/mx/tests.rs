use std::cell::Cell;

use super::{MxError, MxRecord, resolver};
use trust_dns_resolver::error::ResolveError;

type LookupResult = Result<Vec<MxRecord>, ResolveError>;
type LookupFn = dyn Fn(&str) -> LookupResult;

/// Resolver double counting how many MX queries it answered.
pub(crate) struct StubResolver {
    pub on_lookup: Box<LookupFn>,
    pub calls: Cell<usize>,
}

impl StubResolver {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> LookupResult + 'static,
    {
        Self {
            on_lookup: Box::new(f),
            calls: Cell::new(0),
        }
    }

    pub(crate) fn with_records(records: Vec<MxRecord>) -> Self {
        Self::new(move |_| Ok(records.clone()))
    }
}

impl resolver::LookupMx for StubResolver {
    fn lookup_mx(&self, domain: &str) -> LookupResult {
        self.calls.set(self.calls.get() + 1);
        (self.on_lookup)(domain)
    }
}

#[test]
fn resolve_with_rejects_empty_domain() {
    let stub = StubResolver::with_records(Vec::new());
    let err = resolver::resolve_with(&stub, "  ", false).expect_err("empty domain should fail");
    assert!(matches!(err, MxError::EmptyDomain));
    assert_eq!(stub.calls.get(), 0);
}

#[test]
fn resolve_with_keeps_dns_answer_order() {
    let stub = StubResolver::new(|domain| {
        assert_eq!(domain, "example.com");
        Ok(vec![
            MxRecord::new(20, "mx2.example.com."),
            MxRecord::new(10, "mx1.example.com."),
            MxRecord::new(30, "mx3.example.com."),
        ])
    });

    let records = resolver::resolve_with(&stub, "example.com", false).expect("lookup succeeds");
    let hosts: Vec<_> = records.iter().map(|r| r.exchange.as_str()).collect();
    assert_eq!(hosts, ["mx2.example.com", "mx1.example.com", "mx3.example.com"]);
}

#[test]
fn resolve_with_sorts_by_preference_when_asked() {
    let stub = StubResolver::with_records(vec![
        MxRecord::new(20, "b.example.com"),
        MxRecord::new(10, "a.example.com"),
        MxRecord::new(20, "c.example.com"),
    ]);

    let records = resolver::resolve_with(&stub, "example.com", true).expect("lookup succeeds");
    let hosts: Vec<_> = records.iter().map(|r| r.exchange.as_str()).collect();
    assert_eq!(hosts, ["a.example.com", "b.example.com", "c.example.com"]);
}

#[test]
fn resolve_with_drops_duplicate_exchanges() {
    let stub = StubResolver::with_records(vec![
        MxRecord::new(10, "mx1.example.com."),
        MxRecord::new(10, "MX1.example.com"),
    ]);

    let records = resolver::resolve_with(&stub, "example.com", false).expect("lookup succeeds");
    assert_eq!(records, vec![MxRecord::new(10, "mx1.example.com")]);
}

#[test]
fn resolve_with_reports_no_records() {
    let stub = StubResolver::with_records(Vec::new());
    let err = resolver::resolve_with(&stub, "example.com", false).expect_err("no records");
    assert!(matches!(err, MxError::NoRecords { ref domain } if domain == "example.com"));
}

#[test]
fn resolve_with_surfaces_lookup_failures() {
    let stub = StubResolver::new(|_| Err(ResolveError::from("SERVFAIL")));
    let err = resolver::resolve_with(&stub, "example.com", false).expect_err("lookup fails");
    assert!(matches!(err, MxError::Lookup { .. }));
    assert!(err.to_string().starts_with("error looking up MX records"));
}

#[test]
fn normalize_exchange_trims_dot_and_lowercases() {
    assert_eq!(resolver::normalize_exchange("Mail.EXAMPLE.com."), "mail.example.com");
}
