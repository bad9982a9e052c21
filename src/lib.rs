pub mod compare;
pub mod config;
pub mod db;
pub mod error;
pub mod gather;
pub mod gc;
pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod registry;
pub mod service;
mod store;
pub mod utils;

pub use compare::CrossTypeComparator;
pub use config::TaggingConfig;
pub use db::Database;
pub use error::TagError;
pub use gather::{GatherRequest, RelatedSelection, TagFilter};
pub use models::{EntityRef, Record, RelatedRecord, SortDirection, Tag};
pub use reconcile::{ReconcileOutcome, TagLifecycle};
pub use registry::{RelatedOrdering, TagRegistry, TagTypeSpec};
pub use service::TagService;
