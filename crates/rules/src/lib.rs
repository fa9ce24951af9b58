//! Alert rule evaluation and alert lifecycle for the heat-pump fleet.
//!
//! This crate provides:
//! - [`AlertEngine`], the single-flight evaluation cycle
//! - Per-(rule, device) evaluation of threshold, rate-of-change and offline rules
//! - A metric resolver over structured telemetry and the legacy device payload
//! - Per-cycle site schedule caching (load shedding, TOU peak)
//! - [`memory::MemoryStore`], an in-process implementation of every store contract

pub mod engine;
pub mod error;
pub mod evaluator;
pub mod memory;
pub mod resolver;
pub mod schedule_cache;

pub use heatwatch_core::store;

pub use engine::{AlertEngine, Collaborators, CycleOutcome, CycleReport, EvaluationCycleState};
pub use error::{CyclePhase, EngineError};
pub use memory::MemoryStore;
