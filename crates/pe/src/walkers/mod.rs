//! Structure walkers, one per PE substructure. Each writes its part of the
//! report into the scan context and raises anomalies there. An `Err` means
//! the image could not be walked at all.

pub mod bound_imports;
pub mod exports;
pub mod headers;
pub mod imports;
pub mod overlay;
pub mod relocations;
pub mod sections;
pub mod strings;
pub mod tls;
