//! Incident commander engine.
//!
//! Free text goes through the [`IntentResolver`], the chosen catalog
//! operations run against the event store (with enrichment where the
//! operation asks for it), and the [`Orchestrator`] reduces everything into
//! an [`IncidentReport`].

pub mod enrichment;
pub mod orchestrator;
pub mod report;
pub mod resolver;

pub use enrichment::{Enrichment, EnrichmentJoiner};
pub use orchestrator::Orchestrator;
pub use report::{IncidentReport, OperationResult};
pub use resolver::{DecisionError, IntentResolver, ModelSettings, ToolDecision};
