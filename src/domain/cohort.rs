//! Grouping configured hosts into base-domain cohorts.
//!
//! All hosts sharing a base domain are served by one consolidated
//! certificate, so the cohort is the unit of renewal.

use std::{
    collections::{BTreeMap, btree_map},
    path::{Path, PathBuf},
};

use super::host::{Host, InvalidHostError};

/// Configuration entry name that never denotes a real host.
pub const DEFAULT_SITE: &str = "default";

/// A host together with its webroot and the names its certificate must cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCertBinding {
    host: Host,
    webroot: PathBuf,
    names: Vec<String>,
}

impl HostCertBinding {
    /// Bind a host to its webroot.
    #[must_use]
    pub fn new(host: Host, webroot: PathBuf) -> Self {
        let names = host.covered_names();
        Self {
            host,
            webroot,
            names,
        }
    }

    /// The bound host.
    #[must_use]
    pub const fn host(&self) -> &Host {
        &self.host
    }

    /// Directory serving validation challenges for this host.
    #[must_use]
    pub fn webroot(&self) -> &Path {
        &self.webroot
    }

    /// The DNS names the certificate must cover for this host.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// The set of hosts sharing one base domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseDomain {
    name: String,
    bindings: Vec<HostCertBinding>,
    pub(crate) needs_renewal: bool,
}

impl BaseDomain {
    /// An empty cohort for the given base domain.
    #[must_use]
    pub const fn new(name: String) -> Self {
        Self {
            name,
            bindings: Vec::new(),
            needs_renewal: false,
        }
    }

    /// The base domain name, e.g. `example.com`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hosts with an existing webroot, in ascending name order.
    #[must_use]
    pub fn bindings(&self) -> &[HostCertBinding] {
        &self.bindings
    }

    /// Whether any bound host requires a new certificate.
    ///
    /// This is only meaningful once the cohort has been planned.
    #[must_use]
    pub const fn needs_renewal(&self) -> bool {
        self.needs_renewal
    }

    /// Add a host binding, keeping bindings sorted by host.
    pub fn bind(&mut self, binding: HostCertBinding) {
        let position = self
            .bindings
            .partition_point(|existing| existing.host < binding.host);
        self.bindings.insert(position, binding);
    }
}

/// A configured entry that was left out of every cohort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkippedHost {
    /// The entry name is not a usable host name.
    Invalid(InvalidHostError),
    /// The host has no webroot to serve validation challenges from.
    MissingWebroot {
        /// The host that was skipped.
        host: Host,
        /// The webroot that was expected.
        webroot: PathBuf,
    },
}

/// All cohorts of a run, keyed by base domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cohorts {
    cohorts: BTreeMap<String, BaseDomain>,
    skipped: Vec<SkippedHost>,
}

impl Cohorts {
    /// Group configured host entries into cohorts.
    ///
    /// Entries are processed in ascending order. Hidden entries and the
    /// `default` placeholder are ignored. Invalid host names and hosts whose
    /// webroot (as resolved by `webroot_for`) is not an existing directory are
    /// skipped with a warning and recorded in [`Self::skipped`].
    pub fn group<I, S, F>(names: I, mut webroot_for: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnMut(&Host) -> PathBuf,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();

        let mut cohorts = Self::default();

        for name in names {
            if is_ignored(&name) {
                tracing::trace!("Ignoring configuration entry {name}");
                continue;
            }

            let host = match Host::new(name) {
                Ok(host) => host,
                Err(e) => {
                    tracing::warn!("Skipping host: {e}");
                    cohorts.skipped.push(SkippedHost::Invalid(e));
                    continue;
                }
            };

            let cohort = cohorts
                .cohorts
                .entry(host.base_domain().to_string())
                .or_insert_with_key(|base| BaseDomain::new(base.clone()));

            let webroot = webroot_for(&host);
            if !webroot.is_dir() {
                tracing::warn!(
                    "Skipping {host}: webroot {} does not exist",
                    webroot.display()
                );
                cohorts
                    .skipped
                    .push(SkippedHost::MissingWebroot { host, webroot });
                continue;
            }

            cohort.bind(HostCertBinding::new(host, webroot));
        }

        cohorts
    }

    /// Look up the cohort for a base domain.
    #[must_use]
    pub fn get(&self, base_domain: &str) -> Option<&BaseDomain> {
        self.cohorts.get(base_domain)
    }

    /// Cohorts in ascending base-domain order.
    pub fn iter(&self) -> btree_map::Values<'_, String, BaseDomain> {
        self.cohorts.values()
    }

    pub(crate) fn iter_mut(&mut self) -> btree_map::ValuesMut<'_, String, BaseDomain> {
        self.cohorts.values_mut()
    }

    /// Entries that did not make it into any cohort.
    #[must_use]
    pub fn skipped(&self) -> &[SkippedHost] {
        &self.skipped
    }

    /// The number of cohorts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cohorts.len()
    }

    /// Whether there are no cohorts at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }
}

fn is_ignored(name: &str) -> bool {
    name.starts_with('.') || name == DEFAULT_SITE
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn webroots(hosts: &[&str]) -> TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for host in hosts {
            std::fs::create_dir(tmp.path().join(host)).unwrap();
        }
        tmp
    }

    #[test]
    fn groups_hosts_by_base_domain() {
        let hosts = ["shop.example.com", "example.com", "blog.example.org"];
        let tmp = webroots(&hosts);

        let cohorts = Cohorts::group(hosts, |host| tmp.path().join(host.name()));

        assert_eq!(cohorts.len(), 2);
        let names: Vec<_> = cohorts.iter().map(BaseDomain::name).collect();
        assert_eq!(names, vec!["example.com", "example.org"]);

        let example = cohorts.get("example.com").unwrap();
        let bound: Vec<_> = example
            .bindings()
            .iter()
            .map(|binding| binding.host().name())
            .collect();
        assert_eq!(bound, vec!["example.com", "shop.example.com"]);
        assert!(cohorts.skipped().is_empty());
    }

    #[test]
    fn bare_domain_binding_covers_www_alias() {
        let tmp = webroots(&["example.com"]);

        let cohorts = Cohorts::group(["example.com"], |host| tmp.path().join(host.name()));

        let binding = &cohorts.get("example.com").unwrap().bindings()[0];
        assert_eq!(binding.names(), ["example.com", "www.example.com"]);
        assert_eq!(binding.webroot(), tmp.path().join("example.com"));
    }

    #[test]
    fn ignores_hidden_entries_and_default_placeholder() {
        let tmp = webroots(&["example.com"]);

        let cohorts = Cohorts::group([".swp", "default", "example.com"], |host| {
            tmp.path().join(host.name())
        });

        assert_eq!(cohorts.len(), 1);
        assert!(cohorts.skipped().is_empty());
    }

    #[test]
    fn invalid_host_is_skipped_without_aborting() {
        let tmp = webroots(&["example.com"]);

        let cohorts = Cohorts::group(["localhost", "example.com"], |host| {
            tmp.path().join(host.name())
        });

        assert_eq!(cohorts.len(), 1);
        assert!(matches!(
            cohorts.skipped(),
            [SkippedHost::Invalid(e)] if e.host() == "localhost"
        ));
    }

    #[test]
    fn host_without_webroot_is_excluded_but_siblings_remain() {
        let tmp = webroots(&["example.com"]);

        let cohorts = Cohorts::group(["broken.example.com", "example.com"], |host| {
            tmp.path().join(host.name())
        });

        let example = cohorts.get("example.com").unwrap();
        assert_eq!(example.bindings().len(), 1);
        assert_eq!(example.bindings()[0].host().name(), "example.com");
        assert!(matches!(
            cohorts.skipped(),
            [SkippedHost::MissingWebroot { host, .. }] if host.name() == "broken.example.com"
        ));
    }

    #[test]
    fn cohort_of_only_missing_webroots_has_no_bindings() {
        let tmp = webroots(&[]);

        let cohorts = Cohorts::group(["broken.example.com"], |host| tmp.path().join(host.name()));

        assert!(cohorts.get("example.com").unwrap().bindings().is_empty());
    }
}
