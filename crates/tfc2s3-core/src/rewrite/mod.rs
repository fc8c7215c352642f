//! Pure text transformations over Terraform configuration and workflow files.
//!
//! Nothing in this module touches the filesystem; callers hand in file
//! content and get new content back. The [`crate::mutator`] module applies
//! these passes across a working copy.

pub mod backend;
pub mod modules;
pub mod scanner;
pub mod workflow;

use std::path::PathBuf;

pub use backend::{rewrite_backend_block, state_key, BackendRewrite, BackendTarget};
pub use modules::{
    module_declarations, rewrite_module_sources, rewrite_module_sources_with, ModuleDeclaration,
    ModuleRewrite, ModuleSourceMatch, SourceRewriteOptions,
};
pub use workflow::{inject_workflow_secret, WorkflowSecret};

/// A configuration file loaded from a working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// Path relative to the repository root.
    pub path: PathBuf,
    pub content: String,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}
