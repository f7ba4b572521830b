pub mod catalog;
pub mod episodes;
pub mod metadata;
pub mod numbering;
pub mod thumbnails;
pub mod tools;

pub use catalog::{CatalogDelta, CatalogEngine};
pub use episodes::{EpisodeService, EpisodeWindow};
pub use metadata::{CatalogFileProvider, MetadataProvider, NoMetadata, ShowMetadata};
pub use thumbnails::ThumbnailCache;
pub use tools::{MediaTools, ToolError};
