//! Domain models for certificate renewal planning.
//!
//! This module contains host classification, base-domain cohorts, the
//! renewal planner, the request composer, and configuration.

/// Host name classification into base domains.
pub mod host;
pub use host::{Host, InvalidHostError, classify, is_bare_domain};

pub mod cohort;
pub use cohort::{BaseDomain, Cohorts, HostCertBinding, SkippedHost};

pub mod plan;
pub use plan::{BindingAssessment, CohortAssessment, Plan, RenewalPlanner, RenewalReason};

pub mod request;
pub use request::{RenewalRequest, RequestEntry};

pub(crate) mod config;
pub use config::{Config, ConfigError};
