//! Filesystem inputs: configured site entries and installed certificates.

pub mod certificate;
mod sites;

pub use certificate::{
    CertificateParseError, CertificateRecord, CertificateSource, CertificateState,
    CertificateStore,
};
pub use sites::{SitesError, site_names};
