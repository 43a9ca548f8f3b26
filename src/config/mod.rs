pub mod load;
pub mod types;

pub use load::{MANIFEST_SEARCH, load_manifest, normalize_name};
pub use types::*;
