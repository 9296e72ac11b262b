//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Each variant is a stable sentinel whose display form is the error code
/// callers branch on. Infrastructure failures (storage, providers) never end up
/// here.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainError {
    #[error("not_found")]
    NotFound,

    // Value objects.
    #[error("invalid_url")]
    InvalidUrl,
    #[error("invalid_app_name")]
    InvalidAppName,
    #[error("invalid_environment_name")]
    InvalidEnvironmentName,
    #[error("invalid_source_payload")]
    InvalidSourcePayload,
    #[error("invalid_provider_payload")]
    InvalidProviderPayload,

    // Naming collisions.
    #[error("app_name_already_taken")]
    AppNameAlreadyTaken,
    #[error("url_already_taken")]
    UrlAlreadyTaken,
    #[error("config_already_taken")]
    ConfigAlreadyTaken,

    // Lifecycle guards.
    #[error("app_cleanup_needed")]
    AppCleanupNeeded,
    #[error("app_cleanup_requested")]
    AppCleanupRequested,
    #[error("app_target_changed")]
    AppTargetChanged,
    #[error("app_has_running_or_pending_deployments")]
    AppHasRunningOrPendingDeployments,
    #[error("target_cleanup_needed")]
    TargetCleanupNeeded,
    #[error("target_cleanup_requested")]
    TargetCleanupRequested,
    #[error("target_in_use")]
    TargetInUse,
    #[error("target_configuration_in_progress")]
    TargetConfigurationInProgress,
    #[error("target_configuration_failed")]
    TargetConfigurationFailed,
    #[error("target_configuration_outdated")]
    TargetConfigurationOutdated,
    #[error("target_provider_update_not_permitted")]
    TargetProviderUpdateNotPermitted,
    #[error("running_or_pending_deployments")]
    RunningOrPendingDeployments,

    // Deployment state machine.
    #[error("not_in_pending_state")]
    NotInPendingState,
    #[error("not_in_running_state")]
    NotInRunningState,

    // Cross-aggregate consistency.
    #[error("invalid_source_deployment")]
    InvalidSourceDeployment,
    #[error("could_not_promote_production_deployment")]
    CouldNotPromoteProductionDeployment,
    #[error("vcs_not_configured")]
    VcsNotConfigured,
}

impl DomainError {
    /// Stable, machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound => "not_found",
            DomainError::InvalidUrl => "invalid_url",
            DomainError::InvalidAppName => "invalid_app_name",
            DomainError::InvalidEnvironmentName => "invalid_environment_name",
            DomainError::InvalidSourcePayload => "invalid_source_payload",
            DomainError::InvalidProviderPayload => "invalid_provider_payload",
            DomainError::AppNameAlreadyTaken => "app_name_already_taken",
            DomainError::UrlAlreadyTaken => "url_already_taken",
            DomainError::ConfigAlreadyTaken => "config_already_taken",
            DomainError::AppCleanupNeeded => "app_cleanup_needed",
            DomainError::AppCleanupRequested => "app_cleanup_requested",
            DomainError::AppTargetChanged => "app_target_changed",
            DomainError::AppHasRunningOrPendingDeployments => {
                "app_has_running_or_pending_deployments"
            }
            DomainError::TargetCleanupNeeded => "target_cleanup_needed",
            DomainError::TargetCleanupRequested => "target_cleanup_requested",
            DomainError::TargetInUse => "target_in_use",
            DomainError::TargetConfigurationInProgress => "target_configuration_in_progress",
            DomainError::TargetConfigurationFailed => "target_configuration_failed",
            DomainError::TargetConfigurationOutdated => "target_configuration_outdated",
            DomainError::TargetProviderUpdateNotPermitted => {
                "target_provider_update_not_permitted"
            }
            DomainError::RunningOrPendingDeployments => "running_or_pending_deployments",
            DomainError::NotInPendingState => "not_in_pending_state",
            DomainError::NotInRunningState => "not_in_running_state",
            DomainError::InvalidSourceDeployment => "invalid_source_deployment",
            DomainError::CouldNotPromoteProductionDeployment => {
                "could_not_promote_production_deployment"
            }
            DomainError::VcsNotConfigured => "vcs_not_configured",
        }
    }

    /// True for errors raised because a name, url or config is already used.
    pub fn is_naming_collision(&self) -> bool {
        matches!(
            self,
            DomainError::AppNameAlreadyTaken
                | DomainError::UrlAlreadyTaken
                | DomainError::ConfigAlreadyTaken
        )
    }
}
