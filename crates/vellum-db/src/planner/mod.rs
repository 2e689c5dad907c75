pub mod cost;
pub mod orderby;
pub mod plan;
