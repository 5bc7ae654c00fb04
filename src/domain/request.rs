//! Composing the issuance request for a cohort.

use std::{
    collections::BTreeSet,
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
};

use nonempty::NonEmpty;

use super::cohort::BaseDomain;

/// One webroot and the names validated through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEntry {
    /// Directory serving validation challenges.
    pub webroot: PathBuf,
    /// Names to include in the certificate, primary name first.
    pub names: Vec<String>,
}

/// A request for one consolidated certificate covering a whole cohort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalRequest {
    base_domain: String,
    entries: NonEmpty<RequestEntry>,
}

impl RenewalRequest {
    /// Compose the request renewing every bound host of a cohort.
    ///
    /// Entries follow host order, except that the bare base domain, when
    /// bound, comes first so it becomes the certificate's primary name.
    /// Returns `None` for a cohort without bound hosts.
    #[must_use]
    pub fn compose(cohort: &BaseDomain) -> Option<Self> {
        let mut bindings: Vec<_> = cohort.bindings().iter().collect();
        if let Some(bare) = bindings
            .iter()
            .position(|binding| binding.host().name() == cohort.name())
        {
            let primary = bindings.remove(bare);
            bindings.insert(0, primary);
        }

        let entries = bindings.into_iter().map(|binding| RequestEntry {
            webroot: binding.webroot().to_path_buf(),
            names: binding.names().to_vec(),
        });

        Some(Self {
            base_domain: cohort.name().to_string(),
            entries: NonEmpty::collect(entries)?,
        })
    }

    /// The base domain this request renews.
    #[must_use]
    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// The ordered `(webroot, names)` entries.
    #[must_use]
    pub const fn entries(&self) -> &NonEmpty<RequestEntry> {
        &self.entries
    }

    /// Every name the certificate will cover, in request order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .flat_map(|entry| entry.names.iter().map(String::as_str))
    }

    /// Arguments for the issuance client.
    ///
    /// This is `certonly --webroot --expand` followed by one
    /// `-w <webroot> -d <name>...` group per entry.
    #[must_use]
    pub fn issuance_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["certonly", "--webroot", "--expand"]
            .into_iter()
            .map(OsString::from)
            .collect();

        for (webroot, names) in self.distinct_entries() {
            args.push("-w".into());
            args.push(webroot.as_os_str().to_os_string());
            for name in names {
                args.push("-d".into());
                args.push(name.into());
            }
        }

        args
    }

    /// Entries with every name appearing only once, at its first mention.
    ///
    /// A bare domain claims its `www.` alias, so configuring the alias as a
    /// site of its own would otherwise repeat it. Entries left without names
    /// are dropped.
    fn distinct_entries(&self) -> Vec<(&Path, Vec<&str>)> {
        let mut seen = BTreeSet::new();
        self.entries
            .iter()
            .filter_map(|entry| {
                let names: Vec<_> = entry
                    .names
                    .iter()
                    .map(String::as_str)
                    .filter(|name| seen.insert(*name))
                    .collect();
                (!names.is_empty()).then_some((entry.webroot.as_path(), names))
            })
            .collect()
    }
}

impl fmt::Display for RenewalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "certonly --webroot --expand")?;
        for (webroot, names) in self.distinct_entries() {
            write!(f, " -w {}", webroot.display())?;
            for name in names {
                write!(f, " -d {name}")?;
            }
        }
        Ok(())
    }
}
