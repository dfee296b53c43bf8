use std::fmt::Write as _;

use commander_core::config::IndexConfig;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::operation::AnalyticalOperation;
use crate::plan::{compile, OperationPlan, Params};

/// Index names the catalog compiles against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub logs_index: String,
    pub metrics_index: String,
    pub runbooks_index: String,
    pub inventory_index: String,
    /// Sources compared by ingestion-trend, in report order.
    pub tracked_sources: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::from(&IndexConfig::default())
    }
}

impl From<&IndexConfig> for CatalogConfig {
    fn from(indices: &IndexConfig) -> Self {
        Self {
            logs_index: indices.logs.clone(),
            metrics_index: indices.metrics.clone(),
            runbooks_index: indices.runbooks.clone(),
            inventory_index: indices.inventory.clone(),
            tracked_sources: indices.tracked_sources.clone(),
        }
    }
}

/// The fixed operation catalog, bound to a set of index names.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    config: CatalogConfig,
}

impl Catalog {
    pub fn new(config: CatalogConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn operations(&self) -> &'static [AnalyticalOperation] {
        &AnalyticalOperation::ALL
    }

    pub fn compile(
        &self,
        operation: AnalyticalOperation,
        params: &Params,
    ) -> Result<OperationPlan, CatalogError> {
        compile(&self.config, operation, params)
    }

    /// Human- and model-readable listing of every operation with its
    /// parameters and defaults.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for op in self.operations() {
            let _ = writeln!(out, "- {}: {}", op.name(), op.description());
            if op.params().is_empty() {
                let _ = writeln!(out, "    (no parameters)");
            }
            for p in op.params() {
                let default = match p.default {
                    Some(d) => format!("default {d}"),
                    None => "required".to_string(),
                };
                let _ = writeln!(
                    out,
                    "    {} ({}, {}): {}",
                    p.name,
                    p.kind.as_str(),
                    default,
                    p.description
                );
            }
        }
        if !self.config.tracked_sources.is_empty() {
            let _ = writeln!(
                out,
                "ingestion-trend tracks: {}",
                self.config.tracked_sources.join(", ")
            );
        }
        out
    }
}
