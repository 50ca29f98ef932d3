pub mod catalog;
pub mod loader;
pub mod schema;

pub use catalog::Catalog;
pub use loader::{catalog_path, load_catalog, load_catalog_dir, parse_catalog, DataLoadError, Format};
