#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("{operation} requires parameter '{parameter}'")]
    MissingParameter {
        operation: &'static str,
        parameter: &'static str,
    },
}
