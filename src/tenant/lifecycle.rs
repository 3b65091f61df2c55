use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of one provisioning attempt.
///
/// The discriminants are the stable numeric codes; the forward path is
/// `Requested..=Running` and is strictly increasing. `RollingBack` and
/// `Failed` sit outside it and are reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum LifecycleState {
    Requested = 0,
    Validating = 1,
    AllocatingResources = 2,
    CreatingEnvironment = 3,
    InstallingBlueprint = 4,
    ConfiguringDomain = 5,
    HealthChecking = 6,
    Finalizing = 7,
    Running = 8,
    RollingBack = 50,
    Failed = 99,
}

impl LifecycleState {
    pub const FORWARD: [LifecycleState; 9] = [
        LifecycleState::Requested,
        LifecycleState::Validating,
        LifecycleState::AllocatingResources,
        LifecycleState::CreatingEnvironment,
        LifecycleState::InstallingBlueprint,
        LifecycleState::ConfiguringDomain,
        LifecycleState::HealthChecking,
        LifecycleState::Finalizing,
        LifecycleState::Running,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Requested => "Requested",
            LifecycleState::Validating => "Validating",
            LifecycleState::AllocatingResources => "AllocatingResources",
            LifecycleState::CreatingEnvironment => "CreatingEnvironment",
            LifecycleState::InstallingBlueprint => "InstallingBlueprint",
            LifecycleState::ConfiguringDomain => "ConfiguringDomain",
            LifecycleState::HealthChecking => "HealthChecking",
            LifecycleState::Finalizing => "Finalizing",
            LifecycleState::Running => "Running",
            LifecycleState::RollingBack => "RollingBack",
            LifecycleState::Failed => "Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Running | LifecycleState::Failed)
    }

    /// The stage that follows `self` on the forward path, if any.
    pub fn next_forward(self) -> Option<LifecycleState> {
        let idx = Self::FORWARD.iter().position(|s| *s == self)?;
        Self::FORWARD.get(idx + 1).copied()
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            LifecycleState::RollingBack => self != LifecycleState::RollingBack,
            LifecycleState::Failed => true,
            _ => self.next_forward() == Some(next),
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown lifecycle state '{0}'")]
pub struct UnknownState(pub String);

impl FromStr for LifecycleState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::FORWARD
            .iter()
            .chain([LifecycleState::RollingBack, LifecycleState::Failed].iter())
            .find(|state| state.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal lifecycle transition {from} -> {to}")]
pub struct LifecycleError {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// One tenant provisioning attempt.
///
/// Identity, domain, app type and creation time are fixed at construction.
/// Only the pipeline (and the worker, when forcing `Failed`) moves the state.
#[derive(Debug, Clone)]
pub struct Instance {
    id: Uuid,
    domain: String,
    app_type: String,
    state: LifecycleState,
    history: Vec<LifecycleState>,
    created_at: DateTime<Utc>,
}

impl Instance {
    pub fn new(domain: impl Into<String>, app_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            domain: domain.into(),
            app_type: app_type.into(),
            state: LifecycleState::Requested,
            history: vec![LifecycleState::Requested],
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn app_type(&self) -> &str {
        &self.app_type
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Every state this instance has entered, oldest first.
    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Process and directory name for this tenant.
    pub fn short_name(&self) -> String {
        short_name(self.id)
    }

    pub(crate) fn transition_to(&mut self, next: LifecycleState) -> Result<(), LifecycleError> {
        if !self.state.can_transition_to(next) {
            return Err(LifecycleError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}

/// First 8 hex characters of the simple-formatted id.
pub fn short_name(id: Uuid) -> String {
    let mut simple = id.simple().to_string();
    simple.truncate(8);
    simple
}

/// Durable projection of an [`Instance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: Uuid,
    pub domain: String,
    pub state: String,
    pub port: Option<u16>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TenantRecord {
    pub fn for_instance(instance: &Instance) -> Self {
        Self {
            id: instance.id(),
            domain: instance.domain().to_string(),
            state: instance.state().to_string(),
            port: None,
            created_at: instance.created_at(),
            updated_at: None,
        }
    }
}
