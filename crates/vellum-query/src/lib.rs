mod error;
mod granularity;
mod sort;
mod stage;

pub use error::StageError;
pub use granularity::Granularity;
pub use sort::{SortDirection, SortKey};
pub use stage::{BucketAutoSpec, bson_type_name};
