//! Output generation.
//!
//! - [`json`]: writes each day bucket as a newline-delimited JSON file
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── 20220714.json   # articles whose UTC created_at falls on 2022-07-14
//! └── 20220715.json
//! ```

pub mod json;
