pub mod format;

pub use format::{ListResult, RecordView, TypedRecords};
