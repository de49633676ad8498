/// Structural problems that abort the run before any output is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("Missing required sheet '{sheet}'")]
    MissingSheet { sheet: String },

    #[error("Sheet '{sheet}' is missing required column '{column}'")]
    MissingColumn { sheet: String, column: String },

    #[error("Sheet '{sheet}' row {row}: {entity} '{reference}' does not exist")]
    DanglingReference {
        sheet: String,
        row: usize,
        entity: &'static str,
        reference: String,
    },

    #[error("Sheet '{sheet}' row {row}: duplicate id '{id}'")]
    DuplicateId { sheet: String, row: usize, id: String },

    #[error("Sheet '{sheet}' row {row}, column '{column}': ambiguous level '{value}' (expected 1-5)")]
    InvalidLevel {
        sheet: String,
        row: usize,
        column: String,
        value: String,
    },
}
