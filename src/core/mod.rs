pub mod error;
pub mod value;

pub use error::{MirrorError, Result};
pub use value::{is_empty_value, merge_values, nest_at_path, strip_nulls, value_at_path};
