//! Run artifacts built from the category bag.
//!
//! # Submodules
//!
//! - [`json`]: the bag as a JSON document for downstream consumers
//! - [`markdown`]: the human-readable report
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! ├── 2025-05-06/
//! │   ├── morning.json
//! │   └── evening.json
//!
//! markdown_output_dir/
//! ├── 2025-05-06_morning.md
//! └── 2025-05-06_evening.md
//! ```

pub mod json;
pub mod markdown;
