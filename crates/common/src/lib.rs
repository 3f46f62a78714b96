// folio-common: pure domain logic shared by the folio engine and its callers.

pub mod anchor;
pub mod hash;
pub mod path;
pub mod section;
pub mod types;
