//! Report field catalog
//!
//! Static, versioned mapping from (ad product, report type) to the ordered
//! list of field identifiers requested from the platform. The order of each
//! list is the order of the columns in the downloaded CSV, so the tables
//! must never be reordered at runtime.

mod fields;

pub use fields::{FieldCatalog, FieldEntry, ReportTable, CATALOG_VERSION};

#[cfg(test)]
mod tests;
