use heatwatch_core::StoreError;
use thiserror::Error;

/// Step of the evaluation cycle a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    LoadRules,
    LoadDevices,
    LoadActiveAlerts,
    LoadTelemetry,
    LoadWindows,
    LoadSchedule,
    CountAlerts,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::LoadRules => "load_rules",
            CyclePhase::LoadDevices => "load_devices",
            CyclePhase::LoadActiveAlerts => "load_active_alerts",
            CyclePhase::LoadTelemetry => "load_telemetry",
            CyclePhase::LoadWindows => "load_windows",
            CyclePhase::LoadSchedule => "load_schedule",
            CyclePhase::CountAlerts => "count_alerts",
        }
    }
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures that abort a whole evaluation cycle.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{phase} failed: {source}")]
    Store {
        phase: CyclePhase,
        #[source]
        source: StoreError,
    },

    #[error("evaluation cycle panicked: {0}")]
    Panicked(String),
}

impl EngineError {
    pub fn phase(&self) -> Option<CyclePhase> {
        match self {
            EngineError::Store { phase, .. } => Some(*phase),
            EngineError::Panicked(_) => None,
        }
    }
}

/// Attach the failing phase to a store result.
pub(crate) trait PhaseExt<T> {
    fn phase(self, phase: CyclePhase) -> Result<T, EngineError>;
}

impl<T> PhaseExt<T> for Result<T, StoreError> {
    fn phase(self, phase: CyclePhase) -> Result<T, EngineError> {
        self.map_err(|source| EngineError::Store { phase, source })
    }
}
