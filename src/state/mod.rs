//! State module for tracking crawl and download progress
//!
//! # Components
//!
//! - `PageState`: lifecycle of one crawl unit (product, version or download page)
//! - `TaskState`: lifecycle of one (file, mirror) transfer

mod page_state;
mod task_state;

pub use page_state::PageState;
pub use task_state::TaskState;
