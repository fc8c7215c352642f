//! Replace `terraform { cloud { ... } }` with an S3 backend declaration.

use super::scanner::{self, Edit};
use crate::config::DEFAULT_LOCK_TABLE;

/// Destination backend parameters for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub bucket: String,
    pub region: String,

    /// Object key of the state file, see [`state_key`].
    pub key: String,

    /// DynamoDB table used for state locking.
    pub lock_table: Option<String>,

    pub encrypt: bool,
}

impl BackendTarget {
    /// Target with the default lock table and encryption enabled.
    pub fn new(bucket: impl Into<String>, region: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            key: key.into(),
            lock_table: Some(DEFAULT_LOCK_TABLE.to_string()),
            encrypt: true,
        }
    }

    pub fn with_lock_table(mut self, table: Option<String>) -> Self {
        self.lock_table = table;
        self
    }

    fn render(&self, indent: &str) -> String {
        let mut fields: Vec<(&str, String)> = vec![
            ("bucket", quoted(&self.bucket)),
            ("key", quoted(&self.key)),
            ("region", quoted(&self.region)),
        ];
        if let Some(table) = &self.lock_table {
            fields.push(("dynamodb_table", quoted(table)));
        }
        fields.push(("encrypt", self.encrypt.to_string()));

        let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        let mut out = String::from("backend \"s3\" {\n");
        for (key, value) in fields {
            out.push_str(&format!("{indent}  {key:<width$} = {value}\n"));
        }
        out.push_str(indent);
        out.push('}');
        out
    }
}

/// Storage key for a repository's state file.
pub fn state_key(repo: &str) -> String {
    format!("{repo}/terraform.tfstate")
}

/// Outcome of [`rewrite_backend_block`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRewrite {
    pub content: String,
    pub changed: bool,
}

/// Replace every `cloud` block nested directly inside a top-level
/// `terraform` block with an `s3` backend block.
///
/// Other blocks, including other `terraform` blocks without a `cloud`
/// child, are untouched, and every byte outside the replaced spans is
/// preserved. Rewriting already-rewritten content is a no-op.
pub fn rewrite_backend_block(content: &str, target: &BackendTarget) -> BackendRewrite {
    let edits: Vec<Edit> = scanner::child_blocks(content, 0..content.len(), "terraform")
        .iter()
        .flat_map(|tf| scanner::child_blocks(content, tf.body(), "cloud"))
        .map(|cloud| {
            let indent = scanner::indentation_at(content, cloud.start);
            Edit {
                range: cloud.span(),
                replacement: target.render(indent),
            }
        })
        .collect();

    if edits.is_empty() {
        return BackendRewrite {
            content: content.to_string(),
            changed: false,
        };
    }

    BackendRewrite {
        content: scanner::apply_edits(content, &edits),
        changed: true,
    }
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
