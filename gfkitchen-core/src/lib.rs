pub mod batch;
pub mod catalog;
pub mod error;
pub mod generate;
pub mod http;
pub mod image;
pub mod persist;
pub mod prompt;
pub mod types;

pub use batch::{
    BatchConfig, BatchCounts, BatchError, BatchEvent, BatchPaths, BatchReport, BatchRunner,
    CheckpointWriter, FailedItem, ItemStatus, StateStore,
};
pub use catalog::{builtin_recipes, filter_by_category, load_recipes, validate_recipes};
pub use error::{CatalogError, FetchError};
pub use generate::{
    create_generator, create_generator_from_env, is_rate_limited, ErrorKind, GenerationError,
    GeneratorConfig, ImageGenerator,
};
pub use http::{DownloadClient, HttpClient, MockClient, MockResponse};
pub use image::{fetch_and_validate_image, validate_image, FetchedImage, MAX_FILE_SIZE};
pub use prompt::compose_prompt;
pub use types::{CompletionSet, GeneratedImage, RecipeDescriptor};
