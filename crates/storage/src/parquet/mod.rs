//! Parquet persistence for granularity tables.
//!
//! Key columns are written first with fixed types (Int64 or Utf8);
//! metric columns take the narrowest type that holds every value.

mod builders;
mod reader;
mod schema;
mod writer;


pub use reader::read_table;
pub use writer::{table_to_batch, write_table};

pub(crate) const META_GRANULARITY: &str = "nightqa.granularity";
pub(crate) const META_NIGHT: &str = "nightqa.night";
pub(crate) const META_EXPID: &str = "nightqa.expid";
