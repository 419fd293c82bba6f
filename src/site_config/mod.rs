//! Site configuration: cached accessors and typed known keys.

pub mod cache;
pub mod known;

pub use cache::{ConfigCache, ConfigKeyView, ConfigView, ExamCategoriesView};
pub use known::{ConfigValue, DEFAULT_EXAM_CATEGORIES, EXAM_CATEGORIES_KEY, KnownKey, default_exam_categories};
