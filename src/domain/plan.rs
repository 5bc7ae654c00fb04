//! Deciding which cohorts need a new certificate.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};

use super::{
    cohort::{BaseDomain, Cohorts, HostCertBinding, SkippedHost},
    request::RenewalRequest,
};
use crate::storage::{CertificateRecord, CertificateSource, CertificateState};

/// Why a host binding requires a new certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalReason {
    /// No certificate has been issued for the base domain.
    MissingCertificate,
    /// The certificate file exists but could not be decoded.
    Unreadable(String),
    /// The certificate expires within the renewal threshold.
    Expiring {
        /// When the certificate expires.
        not_after: DateTime<Utc>,
    },
    /// The certificate does not list every name the host needs.
    Uncovered {
        /// Names absent from the certificate.
        missing: Vec<String>,
    },
}

impl fmt::Display for RenewalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCertificate => write!(f, "no certificate"),
            Self::Unreadable(error) => write!(f, "unreadable certificate ({error})"),
            Self::Expiring { not_after } => {
                write!(f, "expires {}", not_after.format("%Y-%m-%d %H:%M UTC"))
            }
            Self::Uncovered { missing } => write!(f, "not covered: {}", missing.join(", ")),
        }
    }
}

/// The verdict for one host binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingAssessment {
    /// The host the verdict applies to.
    pub host: String,
    /// Every failed check; empty when the certificate is fine for this host.
    pub reasons: Vec<RenewalReason>,
}

impl BindingAssessment {
    /// Whether this host requires a new certificate.
    #[must_use]
    pub fn needs_renewal(&self) -> bool {
        !self.reasons.is_empty()
    }
}

/// The verdict for one cohort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortAssessment {
    /// The planned cohort.
    pub cohort: BaseDomain,
    /// When the current certificate expires, if one could be read.
    pub not_after: Option<DateTime<Utc>>,
    /// Per-host verdicts in binding order.
    pub bindings: Vec<BindingAssessment>,
}

impl CohortAssessment {
    /// Whether the cohort needs a new certificate.
    #[must_use]
    pub const fn needs_renewal(&self) -> bool {
        self.cohort.needs_renewal()
    }

    /// The request that would renew this cohort, if it has any bound host.
    #[must_use]
    pub fn request(&self) -> Option<RenewalRequest> {
        RenewalRequest::compose(&self.cohort)
    }
}

/// Decides cohort renewal from installed certificates and a threshold.
#[derive(Debug, Clone, Copy)]
pub struct RenewalPlanner {
    threshold: TimeDelta,
}

impl RenewalPlanner {
    /// A planner renewing certificates that expire within `threshold`.
    #[must_use]
    pub const fn new(threshold: TimeDelta) -> Self {
        Self { threshold }
    }

    /// Assess every cohort against its installed certificate at `now`.
    ///
    /// Each cohort's certificate is inspected once. A cohort needs renewal
    /// when any of its bindings fails a check.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn plan<C>(&self, mut cohorts: Cohorts, certificates: &C, now: DateTime<Utc>) -> Plan
    where
        C: CertificateSource + ?Sized,
    {
        let deadline = now.checked_add_signed(self.threshold).unwrap_or_else(|| {
            tracing::warn!("Renewal threshold reaches past the latest representable date");
            DateTime::<Utc>::MAX_UTC
        });
        let mut assessments = Vec::with_capacity(cohorts.len());

        for cohort in cohorts.iter_mut() {
            if cohort.bindings().is_empty() {
                tracing::debug!("{} has no bound hosts", cohort.name());
                cohort.needs_renewal = false;
                assessments.push(CohortAssessment {
                    cohort: cohort.clone(),
                    not_after: None,
                    bindings: Vec::new(),
                });
                continue;
            }

            let state = certificates.inspect(cohort.name());
            let bindings: Vec<_> = cohort
                .bindings()
                .iter()
                .map(|binding| assess(binding, &state, deadline))
                .collect();

            cohort.needs_renewal = bindings.iter().any(BindingAssessment::needs_renewal);

            let not_after = match &state {
                CertificateState::Present(record) => Some(record.not_after()),
                _ => None,
            };

            if cohort.needs_renewal {
                tracing::info!("{} needs renewal", cohort.name());
            } else {
                tracing::info!("{} is up to date", cohort.name());
            }

            assessments.push(CohortAssessment {
                cohort: cohort.clone(),
                not_after,
                bindings,
            });
        }

        Plan {
            assessments,
            skipped: cohorts.skipped().to_vec(),
        }
    }
}

/// Check one host binding against its cohort's certificate.
///
/// Expiry and coverage are checked independently, so an expiring certificate
/// that is also missing names reports both.
#[must_use]
pub fn assess(
    binding: &HostCertBinding,
    state: &CertificateState,
    deadline: DateTime<Utc>,
) -> BindingAssessment {
    let reasons = match state {
        CertificateState::Absent => vec![RenewalReason::MissingCertificate],
        CertificateState::Unreadable { error, .. } => {
            vec![RenewalReason::Unreadable(error.to_string())]
        }
        CertificateState::Present(record) => check_record(binding, record, deadline),
    };

    BindingAssessment {
        host: binding.host().name().to_string(),
        reasons,
    }
}

fn check_record(
    binding: &HostCertBinding,
    record: &CertificateRecord,
    deadline: DateTime<Utc>,
) -> Vec<RenewalReason> {
    let mut reasons = Vec::new();

    if record.expires_before(deadline) {
        reasons.push(RenewalReason::Expiring {
            not_after: record.not_after(),
        });
    }

    let missing = record.missing_names(binding.names());
    if !missing.is_empty() {
        reasons.push(RenewalReason::Uncovered { missing });
    }

    reasons
}

/// The outcome of planning a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    assessments: Vec<CohortAssessment>,
    skipped: Vec<SkippedHost>,
}

impl Plan {
    /// All cohort verdicts in ascending base-domain order.
    #[must_use]
    pub fn assessments(&self) -> &[CohortAssessment] {
        &self.assessments
    }

    /// Configured entries that were left out of every cohort.
    #[must_use]
    pub fn skipped(&self) -> &[SkippedHost] {
        &self.skipped
    }

    /// Cohorts that need renewal, in ascending base-domain order.
    pub fn needing_renewal(&self) -> impl Iterator<Item = &CohortAssessment> {
        self.assessments
            .iter()
            .filter(|assessment| assessment.needs_renewal())
    }

    /// The single request to execute this run.
    ///
    /// This is the lowest base domain that needs renewal and has at least one
    /// bound host.
    #[must_use]
    pub fn next_request(&self) -> Option<RenewalRequest> {
        self.needing_renewal().find_map(CohortAssessment::request)
    }

    /// Cohorts needing renewal that are left for a later run.
    pub fn deferred(&self) -> impl Iterator<Item = &CohortAssessment> {
        let next = self.next_request().map(|request| request.base_domain().to_string());
        self.needing_renewal()
            .filter(move |assessment| Some(assessment.cohort.name()) != next.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, path::PathBuf};

    use tempfile::TempDir;

    use super::*;
    use crate::test_support::mint_certificate;

    #[derive(Default)]
    struct FakeCertificates {
        pems: HashMap<String, String>,
        garbage: Vec<String>,
    }

    impl FakeCertificates {
        fn with(mut self, base_domain: &str, names: &[&str], days: i64) -> Self {
            self.pems
                .insert(base_domain.to_string(), mint_certificate(names, days));
            self
        }
    }

    impl CertificateSource for FakeCertificates {
        fn inspect(&self, base_domain: &str) -> CertificateState {
            if self.garbage.iter().any(|name| name == base_domain) {
                return CertificateState::Unreadable {
                    path: PathBuf::from(base_domain),
                    error: CertificateRecord::from_pem(b"garbage").unwrap_err(),
                };
            }
            self.pems
                .get(base_domain)
                .map_or(CertificateState::Absent, |pem| {
                    CertificateState::Present(CertificateRecord::from_pem(pem.as_bytes()).unwrap())
                })
        }
    }

    fn cohorts(hosts: &[&str]) -> (TempDir, Cohorts) {
        let tmp = tempfile::tempdir().unwrap();
        for host in hosts {
            std::fs::create_dir(tmp.path().join(host)).unwrap();
        }
        let cohorts = Cohorts::group(hosts.iter().copied(), |host| tmp.path().join(host.name()));
        (tmp, cohorts)
    }

    fn planner() -> RenewalPlanner {
        RenewalPlanner::new(TimeDelta::days(30))
    }

    #[test]
    fn certificate_expiring_inside_threshold_needs_renewal() {
        let (_tmp, cohorts) = cohorts(&["example.com"]);
        let certs = FakeCertificates::default().with(
            "example.com",
            &["example.com", "www.example.com"],
            10,
        );

        let plan = planner().plan(cohorts, &certs, Utc::now());

        let assessment = &plan.assessments()[0];
        assert!(assessment.needs_renewal());
        assert!(matches!(
            assessment.bindings[0].reasons.as_slice(),
            [RenewalReason::Expiring { .. }]
        ));
    }

    #[test]
    fn valid_covering_certificate_is_up_to_date() {
        let (_tmp, cohorts) = cohorts(&["example.com", "shop.example.com"]);
        let certs = FakeCertificates::default().with(
            "example.com",
            &["example.com", "www.example.com", "shop.example.com"],
            60,
        );

        let plan = planner().plan(cohorts, &certs, Utc::now());

        assert!(!plan.assessments()[0].needs_renewal());
        assert!(plan.next_request().is_none());
    }

    #[test]
    fn uncovered_host_flags_cohort_and_request_lists_bare_domain_first() {
        let (_tmp, cohorts) = cohorts(&["example.com", "shop.example.com"]);
        let certs = FakeCertificates::default().with(
            "example.com",
            &["example.com", "www.example.com"],
            60,
        );

        let plan = planner().plan(cohorts, &certs, Utc::now());

        let assessment = &plan.assessments()[0];
        assert!(assessment.needs_renewal());
        assert!(!assessment.bindings[0].needs_renewal());
        assert_eq!(
            assessment.bindings[1].reasons,
            vec![RenewalReason::Uncovered {
                missing: vec!["shop.example.com".to_string()]
            }]
        );

        let request = plan.next_request().unwrap();
        let hosts: Vec<_> = request
            .entries()
            .iter()
            .map(|entry| entry.names[0].as_str())
            .collect();
        assert_eq!(hosts, vec!["example.com", "shop.example.com"]);
    }

    #[test]
    fn missing_certificate_still_composes_request() {
        let (_tmp, cohorts) = cohorts(&["new.example.com"]);

        let plan = planner().plan(cohorts, &FakeCertificates::default(), Utc::now());

        assert_eq!(
            plan.assessments()[0].bindings[0].reasons,
            vec![RenewalReason::MissingCertificate]
        );
        let request = plan.next_request().unwrap();
        assert_eq!(request.base_domain(), "example.com");
        assert_eq!(request.entries().len(), 1);
        assert_eq!(request.entries().first().names, vec!["new.example.com".to_string()]);
    }

    #[test]
    fn unreadable_certificate_is_treated_as_needing_renewal() {
        let (_tmp, cohorts) = cohorts(&["example.com"]);
        let certs = FakeCertificates {
            garbage: vec!["example.com".to_string()],
            ..FakeCertificates::default()
        };

        let plan = planner().plan(cohorts, &certs, Utc::now());

        assert!(plan.assessments()[0].needs_renewal());
        assert!(matches!(
            plan.assessments()[0].bindings[0].reasons.as_slice(),
            [RenewalReason::Unreadable(_)]
        ));
    }

    #[test]
    fn expiry_and_coverage_are_reported_together() {
        let (_tmp, cohorts) = cohorts(&["shop.example.com"]);
        let certs = FakeCertificates::default().with("example.com", &["example.com"], 5);

        let plan = planner().plan(cohorts, &certs, Utc::now());

        assert_eq!(plan.assessments()[0].bindings[0].reasons.len(), 2);
    }

    #[test]
    fn cohort_without_bindings_produces_no_request() {
        let tmp = tempfile::tempdir().unwrap();
        let cohorts = Cohorts::group(["broken.example.com"], |host| tmp.path().join(host.name()));

        let plan = planner().plan(cohorts, &FakeCertificates::default(), Utc::now());

        assert!(!plan.assessments()[0].needs_renewal());
        assert!(plan.next_request().is_none());
    }

    #[test]
    fn adding_a_failing_host_never_clears_renewal() {
        let certs = FakeCertificates::default().with(
            "example.com",
            &["example.com", "www.example.com"],
            60,
        );

        let (_tmp, fine) = cohorts(&["example.com"]);
        assert!(!planner().plan(fine, &certs, Utc::now()).assessments()[0].needs_renewal());

        let (_tmp, with_failure) = cohorts(&["example.com", "shop.example.com"]);
        assert!(planner().plan(with_failure, &certs, Utc::now()).assessments()[0].needs_renewal());
    }

    #[test]
    fn only_the_lowest_base_domain_is_requested() {
        let (_tmp, cohorts) = cohorts(&["b.example.org", "a.example.net", "example.com"]);
        let certs = FakeCertificates::default().with(
            "example.com",
            &["example.com", "www.example.com"],
            90,
        );

        let plan = planner().plan(cohorts, &certs, Utc::now());

        assert_eq!(plan.needing_renewal().count(), 2);
        assert_eq!(plan.next_request().unwrap().base_domain(), "example.net");
        let deferred: Vec<_> = plan
            .deferred()
            .map(|assessment| assessment.cohort.name())
            .collect();
        assert_eq!(deferred, vec!["example.org"]);
    }

    #[test]
    fn threshold_is_configurable() {
        let (_tmp, cohorts) = cohorts(&["example.com"]);
        let certs = FakeCertificates::default().with(
            "example.com",
            &["example.com", "www.example.com"],
            10,
        );

        let plan = RenewalPlanner::new(TimeDelta::days(7)).plan(cohorts, &certs, Utc::now());

        assert!(!plan.assessments()[0].needs_renewal());
    }

    #[test]
    fn oversized_threshold_renews_everything() {
        let (_tmp, cohorts) = cohorts(&["example.com"]);
        let certs = FakeCertificates::default().with(
            "example.com",
            &["example.com", "www.example.com"],
            365,
        );
        let threshold = crate::Config {
            renewal_threshold_days: u32::MAX,
            ..crate::Config::default()
        }
        .renewal_threshold();

        let plan = RenewalPlanner::new(threshold).plan(cohorts, &certs, Utc::now());

        assert!(plan.assessments()[0].needs_renewal());
    }
}
