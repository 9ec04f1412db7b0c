use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Plan file could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plan YAML is malformed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Unsupported sqlType '{sql_type}' on column {type_name}.{column}")]
    UnsupportedSqlType {
        type_name: String,
        column: String,
        sql_type: String,
    },

    #[error("Invalid JSON schema on column {type_name}.{column}: {message}")]
    InvalidSchema {
        type_name: String,
        column: String,
        message: String,
    },

    #[error("Expression on column {type_name}.{column} must contain {placeholder}")]
    InvalidExpression {
        type_name: String,
        column: String,
        placeholder: &'static str,
    },

    #[error("Context '{context}' of type {type_name} names undeclared column '{column}'")]
    UnknownContextColumn {
        type_name: String,
        context: &'static str,
        column: String,
    },

    #[error("Required column {type_name}.{column} has no default and is missing from the create context")]
    UnreachableRequiredColumn { type_name: String, column: String },

    #[error("Variant type {type_name} is misconfigured: {message}")]
    InvalidVariant { type_name: String, message: String },

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Unknown type '{type_name}' in group '{group}'")]
    UnknownType { group: String, type_name: String },
}
