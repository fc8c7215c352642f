//! Commit confirmation seam.
//!
//! The executor asks before step 8 whenever the run is neither a dry run nor
//! in auto-commit mode. The CLI supplies a terminal prompt; tests and
//! unattended callers use the fixed answers below.

use async_trait::async_trait;

#[async_trait]
pub trait CommitApproval: Send + Sync {
    /// Whether the changes for `repo` may be committed.
    async fn approve(&self, repo: &str) -> bool;
}

/// Approves every commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl CommitApproval for AutoApprove {
    async fn approve(&self, _repo: &str) -> bool {
        true
    }
}

/// Declines every commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl CommitApproval for DenyAll {
    async fn approve(&self, _repo: &str) -> bool {
        false
    }
}
