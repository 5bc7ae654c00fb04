//! Certificates minted on the fly for tests.

use rcgen::{CertificateParams, KeyPair};
use time::{Duration, OffsetDateTime};

fn self_signed(mut params: CertificateParams, days_valid: i64) -> String {
    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::days(1);
    params.not_after = now + Duration::days(days_valid);

    let key_pair = KeyPair::generate().unwrap();
    params.self_signed(&key_pair).unwrap().pem()
}

/// A PEM certificate for `names` that expires `days_valid` days from now.
pub fn mint_certificate(names: &[&str], days_valid: i64) -> String {
    let names: Vec<String> = names.iter().map(ToString::to_string).collect();
    self_signed(CertificateParams::new(names).unwrap(), days_valid)
}

/// A PEM certificate with no subject alternative name extension.
pub fn mint_certificate_without_san(days_valid: i64) -> String {
    self_signed(CertificateParams::default(), days_valid)
}
