use std::{
    io,
    path::PathBuf,
    process::{Command, ExitStatus},
};

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::{
    domain::{Cohorts, Config, Plan, RenewalPlanner, RenewalRequest},
    storage::{CertificateStore, SitesError, site_names},
};

/// The issuance client failed.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The client could not be started.
    #[error("failed to start {}: {source}", binary.display())]
    Spawn {
        /// The client binary.
        binary: PathBuf,
        /// Why it could not be started.
        source: io::Error,
    },
    /// The client ran and reported failure.
    #[error("{} exited with {status}", binary.display())]
    Failed {
        /// The client binary.
        binary: PathBuf,
        /// Its exit status.
        status: ExitStatus,
    },
}

/// A service could not be reloaded.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// The service manager could not be started.
    #[error("failed to start reload of {service}: {source}")]
    Spawn {
        /// The service being reloaded.
        service: String,
        /// Why the service manager could not be started.
        source: io::Error,
    },
    /// The service manager reported failure.
    #[error("reloading {service} exited with {status}")]
    Failed {
        /// The service being reloaded.
        service: String,
        /// The service manager's exit status.
        status: ExitStatus,
    },
}

/// The confirmation prompt failed before an answer was given.
#[derive(Debug, thiserror::Error)]
#[error("confirmation prompt failed: {0}")]
pub struct ConfirmationError(#[from] dialoguer::Error);

/// Runs the certificate issuance client for a request.
pub trait IssuanceExecutor {
    /// Issue one certificate covering every name in `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if issuance did not succeed.
    fn run(&mut self, request: &RenewalRequest) -> Result<(), ExecutionError>;
}

/// Tells services to pick up renewed certificates.
pub trait ServiceReloader {
    /// Reload each of `services`.
    ///
    /// # Errors
    ///
    /// Returns the first reload that failed.
    fn reload(&mut self, services: &[String]) -> Result<(), ReloadError>;
}

/// Asks the operator whether to go ahead with a request.
pub trait Confirmation {
    /// `Ok(true)` to proceed, `Ok(false)` to abort without side effects.
    ///
    /// # Errors
    ///
    /// Returns an error if no answer could be obtained.
    fn confirm(&mut self, request: &RenewalRequest) -> Result<bool, ConfirmationError>;
}

/// Issues certificates by running an external ACME client.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    binary: PathBuf,
    extra_args: Vec<String>,
}

impl CommandExecutor {
    /// Run `binary` with the request's arguments followed by `extra_args`.
    #[must_use]
    pub const fn new(binary: PathBuf, extra_args: Vec<String>) -> Self {
        Self { binary, extra_args }
    }

    /// An executor using the configured issuance client.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.issuance_binary.clone(),
            config.extra_issuance_args.clone(),
        )
    }
}

impl IssuanceExecutor for CommandExecutor {
    fn run(&mut self, request: &RenewalRequest) -> Result<(), ExecutionError> {
        tracing::info!("Running {} {request}", self.binary.display());

        let status = Command::new(&self.binary)
            .args(request.issuance_args())
            .args(&self.extra_args)
            .status()
            .map_err(|source| ExecutionError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ExecutionError::Failed {
                binary: self.binary.clone(),
                status,
            })
        }
    }
}

/// Reloads services through a service manager such as `systemctl`.
#[derive(Debug, Clone)]
pub struct CommandReloader {
    binary: PathBuf,
}

impl CommandReloader {
    /// Reload services by running `<binary> reload <service>`.
    #[must_use]
    pub const fn new(binary: PathBuf) -> Self {
        Self { binary }
    }
}

impl ServiceReloader for CommandReloader {
    fn reload(&mut self, services: &[String]) -> Result<(), ReloadError> {
        for service in services {
            tracing::info!("Reloading {service}");
            let status = Command::new(&self.binary)
                .arg("reload")
                .arg(service)
                .status()
                .map_err(|source| ReloadError::Spawn {
                    service: service.clone(),
                    source,
                })?;

            if !status.success() {
                return Err(ReloadError::Failed {
                    service: service.clone(),
                    status,
                });
            }
        }
        Ok(())
    }
}

/// Asks on the terminal, defaulting to "no".
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptConfirmation;

impl Confirmation for PromptConfirmation {
    fn confirm(&mut self, request: &RenewalRequest) -> Result<bool, ConfirmationError> {
        let names = request.names().count();
        let answer = dialoguer::Confirm::new()
            .with_prompt(format!("Renew {} ({names} names)?", request.base_domain()))
            .default(false)
            .interact_opt()?;

        // Esc or q leaves no answer
        Ok(answer.unwrap_or(false))
    }
}

/// How a run should treat the composed request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Report the request without executing it.
    pub dry_run: bool,
    /// Proceed without asking for confirmation.
    pub cron: bool,
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No cohort needs renewal.
    UpToDate,
    /// The request that would have been executed.
    DryRun(RenewalRequest),
    /// The operator declined the request; nothing was changed.
    Aborted(RenewalRequest),
    /// The certificate was issued.
    Renewed {
        /// The executed request.
        request: RenewalRequest,
        /// Services that were reloaded.
        reloaded: Vec<String>,
    },
}

/// A run that could not complete.
#[derive(Debug, thiserror::Error)]
pub enum RenewalError {
    /// Issuance failed, so no service was reloaded.
    #[error("renewal of {base_domain} failed: {source}")]
    Execution {
        /// The cohort that failed to renew.
        base_domain: String,
        /// Why issuance failed.
        source: ExecutionError,
    },
    /// The certificate was issued but a service did not reload.
    #[error("renewed {base_domain} but reload failed: {source}")]
    Reload {
        /// The cohort that was renewed.
        base_domain: String,
        /// Which reload failed.
        source: ReloadError,
    },
    /// The operator could not be asked.
    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
}

/// Plan a run from the configured sites and installed certificates.
///
/// # Errors
///
/// Returns an error if the sites directory cannot be listed.
#[instrument(level = "debug", skip(config))]
pub fn survey(config: &Config, now: DateTime<Utc>) -> Result<Plan, SitesError> {
    let names = site_names(&config.sites_directory)?;
    let cohorts = Cohorts::group(names, |host| config.webroot_for(host.name()));
    let certificates = CertificateStore::from_config(config);
    Ok(RenewalPlanner::new(config.renewal_threshold()).plan(cohorts, &certificates, now))
}

/// Executes at most one renewal request per run.
#[derive(Debug)]
pub struct Renewal<E, R, C> {
    executor: E,
    reloader: R,
    confirmation: C,
    services: Vec<String>,
}

impl Renewal<CommandExecutor, CommandReloader, PromptConfirmation> {
    /// A renewal running the configured issuance client and service manager.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            CommandExecutor::from_config(config),
            CommandReloader::new(config.reload_binary.clone()),
            PromptConfirmation,
            config.reload_services.clone(),
        )
    }
}

impl<E, R, C> Renewal<E, R, C>
where
    E: IssuanceExecutor,
    R: ServiceReloader,
    C: Confirmation,
{
    /// Assemble a renewal from its collaborators and the services to reload.
    #[must_use]
    pub const fn new(executor: E, reloader: R, confirmation: C, services: Vec<String>) -> Self {
        Self {
            executor,
            reloader,
            confirmation,
            services,
        }
    }

    /// Execute the plan's next request.
    ///
    /// Nothing is executed for a dry run or when the operator declines. After
    /// a successful issuance the configured services are reloaded; after a
    /// failed one they are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if confirmation, issuance or a reload fails.
    #[instrument(level = "debug", skip_all)]
    pub fn run(&mut self, plan: &Plan, options: RunOptions) -> Result<Outcome, RenewalError> {
        let Some(request) = plan.next_request() else {
            return Ok(Outcome::UpToDate);
        };

        if options.dry_run {
            return Ok(Outcome::DryRun(request));
        }

        if !options.cron && !self.confirmation.confirm(&request)? {
            tracing::info!("Renewal of {} declined", request.base_domain());
            return Ok(Outcome::Aborted(request));
        }

        self.executor
            .run(&request)
            .map_err(|source| RenewalError::Execution {
                base_domain: request.base_domain().to_string(),
                source,
            })?;

        if !self.services.is_empty() {
            self.reloader
                .reload(&self.services)
                .map_err(|source| RenewalError::Reload {
                    base_domain: request.base_domain().to_string(),
                    source,
                })?;
        }

        Ok(Outcome::Renewed {
            request,
            reloaded: self.services.clone(),
        })
    }
}
