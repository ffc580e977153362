//! `crawlnet-catalog`: product catalog domain.
//!
//! Pure types and rules: items to resolve, title matching, description parsing
//! and the success/failure records a job produces. No IO.

pub mod description;
pub mod item;
pub mod matching;
pub mod record;

pub use description::{DescriptionField, ProductDetails, is_catalog_image};
pub use item::{Item, normalize_items};
pub use matching::{is_product_title, slugify, title_contains_all_tokens, titles_equal};
pub use record::{FailureRecord, MatchOrigin, ProductRecord};
