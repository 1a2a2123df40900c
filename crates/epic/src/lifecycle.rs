//! Lifecycle phases and transition guards.

use std::fmt;

/// Where an [`Epic`](crate::Epic) instance is in its startup sequence.
///
/// Phases only move forward:
/// `Constructed → Initialized → ViewEngineReady → RoutesLoaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Constructed,
    Initialized,
    ViewEngineReady,
    RoutesLoaded,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Constructed => "constructed",
            Phase::Initialized => "initialized",
            Phase::ViewEngineReady => "view-engine-ready",
            Phase::RoutesLoaded => "routes-loaded",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Engine Already Started!")]
    EngineAlreadyStarted,

    #[error("Routes Already Loaded!")]
    RoutesAlreadyLoaded,

    #[error("Cannot call {operation} while {phase}")]
    OutOfOrder {
        operation: &'static str,
        phase: Phase,
    },
}

/// Guard for `init`.
pub(crate) fn check_init(phase: Phase) -> Result<(), LifecycleError> {
    match phase {
        Phase::Constructed => Ok(()),
        phase => Err(LifecycleError::OutOfOrder {
            operation: "init",
            phase,
        }),
    }
}

/// Guard for `start_view_engine`.
pub(crate) fn check_start_view_engine(phase: Phase) -> Result<(), LifecycleError> {
    match phase {
        Phase::Initialized => Ok(()),
        Phase::ViewEngineReady | Phase::RoutesLoaded => Err(LifecycleError::EngineAlreadyStarted),
        Phase::Constructed => Err(LifecycleError::OutOfOrder {
            operation: "start_view_engine",
            phase,
        }),
    }
}

/// Guard for `load_routes`.
pub(crate) fn check_load_routes(phase: Phase) -> Result<(), LifecycleError> {
    match phase {
        Phase::ViewEngineReady => Ok(()),
        Phase::RoutesLoaded => Err(LifecycleError::RoutesAlreadyLoaded),
        phase => Err(LifecycleError::OutOfOrder {
            operation: "load_routes",
            phase,
        }),
    }
}

/// Guard for `app`.
pub(crate) fn check_app(phase: Phase) -> Result<(), LifecycleError> {
    match phase {
        Phase::RoutesLoaded => Ok(()),
        phase => Err(LifecycleError::OutOfOrder {
            operation: "app",
            phase,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_are_ordered() {
        assert!(Phase::Constructed < Phase::Initialized);
        assert!(Phase::Initialized < Phase::ViewEngineReady);
        assert!(Phase::ViewEngineReady < Phase::RoutesLoaded);
    }

    #[test]
    fn test_view_engine_guard() {
        assert!(check_start_view_engine(Phase::Initialized).is_ok());
        assert_eq!(
            check_start_view_engine(Phase::ViewEngineReady),
            Err(LifecycleError::EngineAlreadyStarted)
        );
        assert_eq!(
            check_start_view_engine(Phase::RoutesLoaded),
            Err(LifecycleError::EngineAlreadyStarted)
        );
        assert!(matches!(
            check_start_view_engine(Phase::Constructed),
            Err(LifecycleError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_load_routes_guard() {
        assert!(check_load_routes(Phase::ViewEngineReady).is_ok());
        assert_eq!(
            check_load_routes(Phase::RoutesLoaded),
            Err(LifecycleError::RoutesAlreadyLoaded)
        );
        assert_eq!(
            check_load_routes(Phase::Initialized),
            Err(LifecycleError::OutOfOrder {
                operation: "load_routes",
                phase: Phase::Initialized,
            })
        );
    }

    #[test]
    fn test_out_of_order_message() {
        let err = check_init(Phase::RoutesLoaded).unwrap_err();
        assert_eq!(err.to_string(), "Cannot call init while routes-loaded");
        assert_eq!(
            LifecycleError::EngineAlreadyStarted.to_string(),
            "Engine Already Started!"
        );
    }
}
