// src/policy/operation.rs

use std::fmt;
use std::time::Duration;

use tracing::info;

use crate::policy::spec::{ActionKind, ActionSpec};
use crate::types::Direction;

/// Per-user override for one direction.
///
/// - `action`: empty means "inherit the default spec verbatim".
/// - `delay`: `None` keeps the delay of whichever spec ends up applying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectionOverride {
    pub action: String,
    pub delay: Option<Duration>,
}

/// The pair of action specs (store + retrieve) applying to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationPolicy {
    store: ActionSpec,
    retrieve: ActionSpec,
    is_override: bool,
}

impl OperationPolicy {
    /// Build the process-wide default policy from the two configuration
    /// lines. Blank lines fall back to [`ActionSpec::none`].
    pub fn from_config(
        retrieve: &str,
        retrieve_delay: Duration,
        store: &str,
        store_delay: Duration,
    ) -> Self {
        let policy = Self {
            retrieve: ActionSpec::parse(
                retrieve,
                retrieve_delay,
                &ActionSpec::none().with_delay(retrieve_delay),
            ),
            store: ActionSpec::parse(
                store,
                store_delay,
                &ActionSpec::none().with_delay(store_delay),
            ),
            is_override: false,
        };
        info!(
            retrieve = %policy.retrieve,
            store = %policy.store,
            "action policy configured"
        );
        policy
    }

    pub fn new(store: ActionSpec, retrieve: ActionSpec) -> Self {
        Self {
            store,
            retrieve,
            is_override: false,
        }
    }

    /// Derive a per-user policy from this (default) policy.
    ///
    /// For each direction an empty override action inherits this policy's
    /// spec, refusal flag included; anything else is parsed afresh. An
    /// explicit override delay always wins.
    pub fn derive(&self, store: &DirectionOverride, retrieve: &DirectionOverride) -> Self {
        Self {
            store: derive_spec(&self.store, store),
            retrieve: derive_spec(&self.retrieve, retrieve),
            is_override: true,
        }
    }

    pub fn spec(&self, direction: Direction) -> &ActionSpec {
        match direction {
            Direction::Store => &self.store,
            Direction::Retrieve => &self.retrieve,
        }
    }

    /// Pick the policy that applies to a session: its own override if it has
    /// one, this default otherwise.
    pub fn resolve<'a>(&'a self, session: Option<&'a OperationPolicy>) -> &'a OperationPolicy {
        session.unwrap_or(self)
    }

    /// True when this policy was derived from a per-user override.
    pub fn is_override(&self) -> bool {
        self.is_override
    }

    /// Whether `direction` is allowed at all under this policy.
    pub fn is_valid_operation(&self, direction: Direction) -> bool {
        !self.spec(direction).refused
    }

    /// Whether either direction enqueues follow-up transfers, in which case a
    /// transfer store has to be available.
    pub fn requires_transfer_store(&self) -> bool {
        self.store.kind == ActionKind::TransferSubmission
            || self.retrieve.kind == ActionKind::TransferSubmission
    }

    pub fn specs(&self) -> impl Iterator<Item = (Direction, &ActionSpec)> {
        [
            (Direction::Retrieve, &self.retrieve),
            (Direction::Store, &self.store),
        ]
        .into_iter()
    }
}

impl fmt::Display for OperationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[RETR: {}] [STOR: {}]", self.retrieve, self.store)
    }
}

fn derive_spec(default: &ActionSpec, ov: &DirectionOverride) -> ActionSpec {
    let delay = ov.delay.unwrap_or(default.delay);
    let spec = ActionSpec::parse(&ov.action, delay, default);
    match ov.delay {
        Some(d) => spec.with_delay(d),
        None => spec,
    }
}
