//! Reading installed certificates
//!
//! The [`CertificateStore`] locates the certificate for a base domain and
//! decodes the parts renewal decisions depend on: the expiry instant and the
//! DNS names in the subject alternative name extension.

use std::{
    collections::BTreeSet,
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use x509_parser::{extensions::GeneralName, pem::parse_x509_pem};

use crate::domain::{Config, config::DOMAIN_PLACEHOLDER};

/// Error decoding a certificate file.
#[derive(Debug, thiserror::Error)]
pub enum CertificateParseError {
    /// The file exists but could not be read.
    #[error("failed to read certificate: {0}")]
    Read(#[from] io::Error),
    /// The file is not PEM encoded.
    #[error("failed to parse PEM: {0}")]
    Pem(String),
    /// The PEM block does not hold a valid X.509 certificate.
    #[error("invalid X.509 certificate: {0}")]
    X509(String),
    /// The subject alternative name extension is malformed.
    #[error("invalid subjectAltName extension: {0}")]
    SubjectAltName(String),
    /// The expiry timestamp cannot be represented.
    #[error("notAfter timestamp {0} is out of range")]
    NotAfter(i64),
}

/// The renewal-relevant view of an installed certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    not_after: DateTime<Utc>,
    dns_names: BTreeSet<String>,
    has_san_extension: bool,
}

impl CertificateRecord {
    /// Construct a record from already decoded parts.
    #[must_use]
    pub const fn new(
        not_after: DateTime<Utc>,
        dns_names: BTreeSet<String>,
        has_san_extension: bool,
    ) -> Self {
        Self {
            not_after,
            dns_names,
            has_san_extension,
        }
    }

    /// Decode the first certificate in a PEM document.
    ///
    /// Subject alternative names other than DNS names are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a PEM encoded X.509 certificate,
    /// or if its subject alternative name extension cannot be decoded.
    pub fn from_pem(pem: &[u8]) -> Result<Self, CertificateParseError> {
        let (_, pem) =
            parse_x509_pem(pem).map_err(|e| CertificateParseError::Pem(e.to_string()))?;
        let cert = pem
            .parse_x509()
            .map_err(|e| CertificateParseError::X509(e.to_string()))?;

        let timestamp = cert.validity().not_after.timestamp();
        let not_after = DateTime::from_timestamp(timestamp, 0)
            .ok_or(CertificateParseError::NotAfter(timestamp))?;

        let san = cert
            .tbs_certificate
            .subject_alternative_name()
            .map_err(|e| CertificateParseError::SubjectAltName(e.to_string()))?;

        let Some(san) = san else {
            return Ok(Self::new(not_after, BTreeSet::new(), false));
        };

        let mut dns_names = BTreeSet::new();
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                dns_names.insert((*dns).to_string());
            } else {
                tracing::debug!("Skipping non-DNS subject alternative name {name:?}");
            }
        }

        Ok(Self::new(not_after, dns_names, true))
    }

    /// When the certificate stops being valid.
    #[must_use]
    pub const fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// DNS names listed in the subject alternative name extension.
    #[must_use]
    pub const fn dns_names(&self) -> &BTreeSet<String> {
        &self.dns_names
    }

    /// Whether the certificate carries a subject alternative name extension.
    #[must_use]
    pub const fn has_san_extension(&self) -> bool {
        self.has_san_extension
    }

    /// Whether the certificate expires before `deadline`.
    #[must_use]
    pub fn expires_before(&self, deadline: DateTime<Utc>) -> bool {
        self.not_after < deadline
    }

    /// The names from `required` that the certificate does not cover.
    ///
    /// A certificate without a subject alternative name extension covers
    /// nothing.
    #[must_use]
    pub fn missing_names(&self, required: &[String]) -> Vec<String> {
        if !self.has_san_extension {
            return required.to_vec();
        }
        required
            .iter()
            .filter(|name| !self.dns_names.contains(*name))
            .cloned()
            .collect()
    }
}

/// What was found at a base domain's certificate path.
#[derive(Debug)]
pub enum CertificateState {
    /// No certificate has been issued yet.
    Absent,
    /// A file exists but could not be decoded.
    Unreadable {
        /// Path of the offending file.
        path: PathBuf,
        /// Why decoding failed.
        error: CertificateParseError,
    },
    /// A decoded certificate.
    Present(CertificateRecord),
}

/// Something that can look up the current certificate of a base domain.
pub trait CertificateSource {
    /// Inspect the certificate installed for `base_domain`.
    fn inspect(&self, base_domain: &str) -> CertificateState;
}

/// Certificates stored on disk at a templated path per base domain.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    path_template: String,
}

impl CertificateStore {
    /// Create a store resolving paths from a template containing `{domain}`.
    #[must_use]
    pub const fn new(path_template: String) -> Self {
        Self { path_template }
    }

    /// Create a store using the configured certificate path template.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cert_path_template.clone())
    }

    /// The certificate path for a base domain.
    #[must_use]
    pub fn path_for(&self, base_domain: &str) -> PathBuf {
        PathBuf::from(self.path_template.replace(DOMAIN_PLACEHOLDER, base_domain))
    }
}

impl CertificateSource for CertificateStore {
    fn inspect(&self, base_domain: &str) -> CertificateState {
        let path = self.path_for(base_domain);
        tracing::debug!("Inspecting certificate {}", path.display());

        match read_certificate(&path) {
            Ok(Some(record)) => CertificateState::Present(record),
            Ok(None) => CertificateState::Absent,
            Err(error) => {
                tracing::warn!(
                    "Cannot decode certificate {} for {base_domain}: {error}",
                    path.display()
                );
                CertificateState::Unreadable { path, error }
            }
        }
    }
}

fn read_certificate(path: &Path) -> Result<Option<CertificateRecord>, CertificateParseError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    CertificateRecord::from_pem(&bytes).map(Some)
}
