use std::io::Write;

use cohort::{
    Outcome, Plan, RenewalRequest,
    domain::{CohortAssessment, SkippedHost},
};
use serde_json::{Value, json};

use super::terminal::Colorize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Renders a plan for the operator.
pub struct Report<'a> {
    plan: &'a Plan,
    verbose: bool,
}

impl<'a> Report<'a> {
    pub const fn new(plan: &'a Plan, verbose: bool) -> Self {
        Self { plan, verbose }
    }

    pub fn print_table(&self) {
        for assessment in self.plan.assessments() {
            let name = assessment.cohort.name();

            if assessment.cohort.bindings().is_empty() {
                if self.verbose {
                    println!("{}", format!("-  {name}: no hosts with a webroot").dim());
                }
                continue;
            }

            if assessment.needs_renewal() {
                println!("{}", format!("⚠️  {name}: renewal needed").warning());
                for binding in &assessment.bindings {
                    for reason in &binding.reasons {
                        println!("    {} {reason}", format!("{}:", binding.host).dim());
                    }
                }
            } else if self.verbose {
                let until = assessment
                    .not_after
                    .map(|not_after| format!(", valid until {}", not_after.format("%Y-%m-%d")))
                    .unwrap_or_default();
                println!("{}", format!("✅ {name}: up to date{until}").success());
            }
        }
    }

    pub fn print_deferred(&self) {
        let deferred: Vec<_> = self
            .plan
            .deferred()
            .map(|assessment| assessment.cohort.name())
            .collect();

        if !deferred.is_empty() {
            println!(
                "{}",
                format!("Left for a later run: {}", deferred.join(", ")).dim()
            );
        }
    }

    pub fn write_json(
        &self,
        mut out: impl Write,
        outcome: Option<&Outcome>,
    ) -> anyhow::Result<()> {
        let cohorts: Vec<_> = self
            .plan
            .assessments()
            .iter()
            .map(cohort_json)
            .collect();
        let skipped: Vec<_> = self.plan.skipped().iter().map(skipped_json).collect();

        let output = json!({
            "cohorts": cohorts,
            "skipped": skipped,
            "request": self.plan.next_request().as_ref().map(request_json),
            "outcome": outcome.map(outcome_name),
        });

        serde_json::to_writer_pretty(&mut out, &output)?;
        writeln!(out)?;
        Ok(())
    }
}

fn cohort_json(assessment: &CohortAssessment) -> Value {
    let hosts: Vec<_> = assessment
        .bindings
        .iter()
        .map(|binding| {
            json!({
                "host": binding.host,
                "reasons": binding
                    .reasons
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "base_domain": assessment.cohort.name(),
        "needs_renewal": assessment.needs_renewal(),
        "not_after": assessment.not_after.map(|not_after| not_after.to_rfc3339()),
        "hosts": hosts,
    })
}

fn skipped_json(skipped: &SkippedHost) -> Value {
    match skipped {
        SkippedHost::Invalid(e) => json!({
            "host": e.host(),
            "reason": "invalid host name",
        }),
        SkippedHost::MissingWebroot { host, webroot } => json!({
            "host": host.name(),
            "reason": format!("webroot {} does not exist", webroot.display()),
        }),
    }
}

fn request_json(request: &RenewalRequest) -> Value {
    let entries: Vec<_> = request
        .entries()
        .iter()
        .map(|entry| {
            json!({
                "webroot": entry.webroot.display().to_string(),
                "names": entry.names,
            })
        })
        .collect();

    json!({
        "base_domain": request.base_domain(),
        "entries": entries,
    })
}

const fn outcome_name(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::UpToDate => "up_to_date",
        Outcome::DryRun(_) => "dry_run",
        Outcome::Aborted(_) => "aborted",
        Outcome::Renewed { .. } => "renewed",
    }
}

#[cfg(test)]
mod tests {
    use cohort::{
        Cohorts, RenewalPlanner,
        storage::{CertificateSource, CertificateState},
    };

    use super::*;

    struct NoCertificates;

    impl CertificateSource for NoCertificates {
        fn inspect(&self, _base_domain: &str) -> CertificateState {
            CertificateState::Absent
        }
    }

    fn plan() -> Plan {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("example.com")).unwrap();
        let cohorts = Cohorts::group(["example.com", "shop.example.com"], |host| {
            tmp.path().join(host.name())
        });
        RenewalPlanner::new(chrono::TimeDelta::days(30)).plan(
            cohorts,
            &NoCertificates,
            chrono::Utc::now(),
        )
    }

    #[test]
    fn json_lists_hosts_skips_and_request() {
        let plan = plan();
        let mut out = Vec::new();

        Report::new(&plan, false).write_json(&mut out, None).unwrap();

        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["cohorts"][0]["base_domain"], "example.com");
        assert_eq!(value["cohorts"][0]["hosts"][0]["host"], "example.com");
        assert_eq!(value["skipped"][0]["host"], "shop.example.com");
        assert_eq!(value["request"]["base_domain"], "example.com");
        assert!(value["outcome"].is_null());
    }

    #[test]
    fn aborted_run_is_a_single_json_document() {
        let plan = plan();
        let request = plan.next_request().unwrap();
        let mut out = Vec::new();

        Report::new(&plan, false)
            .write_json(&mut out, Some(&Outcome::Aborted(request)))
            .unwrap();

        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["outcome"], "aborted");
    }
}
