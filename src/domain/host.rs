use std::{fmt, str::FromStr};

/// Error returned when a host name cannot be split into a base domain.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Invalid host '{0}': a host needs at least two dot-separated labels")]
pub struct InvalidHostError(String);

impl InvalidHostError {
    /// The rejected host name.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.0
    }
}

/// Split a host name into its subdomain prefix and base domain.
///
/// The base domain is the last two labels. The prefix is whatever leading
/// labels remain, or `None` when the host is itself a base domain.
///
/// This deliberately does not consult the public suffix list, so hosts under
/// multi-label suffixes such as `co.uk` resolve to `co.uk`.
///
/// # Errors
///
/// Returns [`InvalidHostError`] if the name has fewer than two labels.
pub fn classify(name: &str) -> Result<(Option<String>, String), InvalidHostError> {
    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return Err(InvalidHostError(name.to_string()));
    }

    let (prefix, base) = labels.split_at(labels.len() - 2);
    let prefix = if prefix.is_empty() {
        None
    } else {
        Some(prefix.join("."))
    };

    Ok((prefix, base.join(".")))
}

/// Whether `name` is its own base domain (`example.com`, not
/// `shop.example.com`).
///
/// Names that cannot be classified are never bare.
#[must_use]
pub fn is_bare_domain(name: &str) -> bool {
    classify(name).is_ok_and(|(_, base)| base == name)
}

/// A configured host, classified into its base domain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Host {
    name: String,
    prefix: Option<String>,
    base_domain: String,
}

impl Host {
    /// Classify a host name.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidHostError`] if the name has fewer than two labels.
    pub fn new(name: String) -> Result<Self, InvalidHostError> {
        let (prefix, base_domain) = classify(&name)?;
        Ok(Self {
            name,
            prefix,
            base_domain,
        })
    }

    /// The host name as configured.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The leading labels in front of the base domain, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// The two-label base domain this host belongs to.
    #[must_use]
    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Whether this host is its own base domain.
    #[must_use]
    pub fn is_bare(&self) -> bool {
        self.prefix.is_none()
    }

    /// The DNS names a certificate must cover to serve this host.
    ///
    /// A bare domain implies its `www.` alias.
    #[must_use]
    pub fn covered_names(&self) -> Vec<String> {
        if self.is_bare() {
            vec![self.name.clone(), format!("www.{}", self.name)]
        } else {
            vec![self.name.clone()]
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl FromStr for Host {
    type Err = InvalidHostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<&str> for Host {
    type Error = InvalidHostError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl TryFrom<String> for Host {
    type Error = InvalidHostError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
