//! Consolidated SAN certificate renewal
//!
//! Hosts sharing a base domain are grouped into cohorts, each served by one
//! multi-domain certificate. The planner decides which cohorts need a new
//! certificate and composes the issuance request for the next one.

pub mod domain;
pub use domain::{
    BaseDomain, Cohorts, Config, Host, InvalidHostError, Plan, RenewalPlanner, RenewalRequest,
};

/// Filesystem inputs: site entries and installed certificates.
pub mod storage;
pub use storage::{CertificateSource, CertificateStore};

/// Running a renewal: confirmation, issuance and service reloads.
pub mod renewal;
pub use renewal::{Outcome, Renewal, RenewalError, RunOptions};

#[cfg(test)]
mod test_support;
