//! Query catalog: the fixed set of analytical operations and their
//! compilation into store queries.

pub mod catalog;
pub mod error;
pub mod operation;
pub mod plan;
pub mod window;

pub use catalog::{Catalog, CatalogConfig};
pub use error::CatalogError;
pub use operation::{AnalyticalOperation, ParamKind, ParamSpec, ToolChoice};
pub use plan::{compile, LabelledQuery, OperationPlan, Params};
pub use window::TimeWindow;
