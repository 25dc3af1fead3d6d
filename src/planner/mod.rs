//! Render-target planner (§4.6): merges consecutive draw passes into
//! multi-subpass render passes, resolves load/store ops and clear values,
//! and synthesizes subpass dependencies.

mod dependencies;
mod finalize;
mod merge;

pub use dependencies::compute_subpass_dependencies;
pub use finalize::{finalize_attachment, FinalizedAttachment};
pub use merge::{group_passes, try_merge, MergeResult, PlannedAttachment, RenderPassGroup};
