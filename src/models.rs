mod entity;
mod record;
mod tag;

pub use entity::{EntityRef, SortDirection};
pub use record::{Record, RelatedRecord};
pub use tag::Tag;
