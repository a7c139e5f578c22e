mod sqlite;
mod tables;

pub use sqlite::Database;
pub(crate) use sqlite::{from_db_time, to_db_time};
