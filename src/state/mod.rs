//! State module for tracking run progress
//!
//! # Components
//!
//! - `PipelineState`: Lifecycle of one orchestrated run (idle, resuming, running, draining, ...)
//! - `CompletionTracker`: Contiguous high-water mark over out-of-order completions

mod pipeline_state;
mod progress;

// Re-export main types
pub use pipeline_state::PipelineState;
pub use progress::CompletionTracker;
