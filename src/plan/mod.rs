pub mod column;
pub mod error;
pub mod registry;
pub mod values;

pub use column::{quote_ident, ColumnDescriptor, ColumnKind, DefaultValue, SqlType};
pub use error::PlanError;
pub use registry::{Contexts, GroupPlan, PlanRegistry, TypePlan, VariantPlan, VariantTable};
pub use values::{collect_values, ColumnValue, FieldErrors};
