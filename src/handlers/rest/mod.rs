pub mod filtered;
pub mod plan;
pub mod records;

pub use filtered::filtered_post;
pub use plan::plan_get;
pub use records::{create, delete, update};
