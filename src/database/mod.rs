pub mod manager;
pub mod record;
pub mod repository;
pub mod statement;
pub mod variant;

pub use manager::{DatabaseError, DatabaseManager};
pub use record::{parse_batch, parse_request, Batch, Record, RecordError, RecordInput};
pub use repository::TypeRepository;
pub use statement::{SqlParam, Statement};
pub use variant::{SideWrite, VariantStore};
