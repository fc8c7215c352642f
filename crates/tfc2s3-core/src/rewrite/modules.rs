//! Rewrite private-registry module sources to git sources.
//!
//! `app.terraform.io/<org>/<name>/<provider>` becomes
//! `git::https://github.com/<org>/terraform-<provider>-<name>?ref=<ref>`.
//! Only `source` attributes directly inside top-level `module` blocks are
//! considered.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::scanner::{self, Attribute, Edit};
use crate::config::{DEFAULT_GIT_HOST, DEFAULT_REGISTRY_HOST, DEFAULT_REPO_PREFIX};

/// Characters after a source literal searched for a `version` attribute.
pub const VERSION_LOOKAHEAD: usize = 200;

const DEFAULT_REF: &str = "main";

fn version_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"version\s*=\s*"([^"]+)""#).expect("valid regex"))
}

/// Hosts and naming used when building git sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRewriteOptions {
    pub registry_host: String,
    pub git_host: String,

    /// Repository name prefix, `terraform` in `terraform-aws-vpc`.
    pub repo_prefix: String,
}

impl Default for SourceRewriteOptions {
    fn default() -> Self {
        Self {
            registry_host: DEFAULT_REGISTRY_HOST.to_string(),
            git_host: DEFAULT_GIT_HOST.to_string(),
            repo_prefix: DEFAULT_REPO_PREFIX.to_string(),
        }
    }
}

/// A registry source parsed out of a module block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSourceMatch {
    pub organization: String,
    pub name: String,
    pub provider: String,

    /// `//sub/dir` suffix, kept verbatim.
    pub subdir: Option<String>,

    /// Version found in the lookahead window.
    pub version: Option<String>,
}

impl ModuleSourceMatch {
    /// Parse `host/org/name/provider[//subdir]`.
    pub fn parse(source: &str, registry_host: &str) -> Option<Self> {
        let rest = source.strip_prefix(registry_host)?.strip_prefix('/')?;
        let (path, subdir) = match rest.split_once("//") {
            Some((path, sub)) if !sub.is_empty() => (path, Some(format!("//{sub}"))),
            Some(_) => return None,
            None => (rest, None),
        };

        let parts: Vec<&str> = path.split('/').collect();
        let [org, name, provider] = parts.as_slice() else {
            return None;
        };
        if [org, name, provider].iter().any(|p| p.is_empty() || p.contains('?')) {
            return None;
        }

        Some(Self {
            organization: org.to_string(),
            name: name.to_string(),
            provider: provider.to_string(),
            subdir,
            version: None,
        })
    }

    /// `v`-prefixed version, the version itself when already prefixed or
    /// `main`, and `main` when no version was found.
    pub fn git_ref(&self) -> String {
        match self.version.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_REF.to_string(),
            Some(v) if v.starts_with('v') || v == DEFAULT_REF => v.to_string(),
            Some(v) => format!("v{v}"),
        }
    }

    pub fn git_source(&self, org: &str, options: &SourceRewriteOptions) -> String {
        format!(
            "git::https://{}/{}/{}-{}-{}{}?ref={}",
            options.git_host,
            org,
            options.repo_prefix,
            self.provider,
            self.name,
            self.subdir.as_deref().unwrap_or(""),
            self.git_ref()
        )
    }
}

/// Outcome of [`rewrite_module_sources`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRewrite {
    pub content: String,

    /// Number of sources replaced.
    pub replaced: usize,

    /// Number of redundant `version` attributes removed.
    pub versions_removed: usize,
}

impl ModuleRewrite {
    pub fn changed(&self) -> bool {
        self.replaced > 0 || self.versions_removed > 0
    }
}

/// Rewrite registry sources using the default hosts.
pub fn rewrite_module_sources(content: &str, org: &str) -> ModuleRewrite {
    rewrite_module_sources_with(content, org, &SourceRewriteOptions::default())
}

pub fn rewrite_module_sources_with(
    content: &str,
    org: &str,
    options: &SourceRewriteOptions,
) -> ModuleRewrite {
    let mut edits = Vec::new();
    let mut replaced = 0;
    let mut versions_removed = 0;

    for block in scanner::child_blocks(content, 0..content.len(), "module") {
        let attrs = scanner::attributes(content, block.body());
        let Some(source) = attrs.iter().find(|a| a.name == "source") else {
            continue;
        };
        let Some(literal) = source.literal.as_deref() else {
            continue;
        };

        let is_git = if let Some(mut m) = ModuleSourceMatch::parse(literal, &options.registry_host) {
            m.version = lookahead_version(content, source.value.end, block.close);
            tracing::debug!(module = %m.name, git_ref = %m.git_ref(), "converting module source");
            edits.push(Edit {
                range: source.value.clone(),
                replacement: format!("\"{}\"", m.git_source(org, options)),
            });
            replaced += 1;
            true
        } else {
            literal.starts_with("git::")
        };

        if !is_git {
            continue;
        }

        for version in attrs
            .iter()
            .filter(|a| a.name == "version" && a.start > source.start && a.literal.is_some())
        {
            edits.push(removal(content, version));
            versions_removed += 1;
        }
    }

    ModuleRewrite {
        content: scanner::apply_edits(content, &edits),
        replaced,
        versions_removed,
    }
}

/// A `module` block's source and declared version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDeclaration {
    /// Block label, `vpc` in `module "vpc"`.
    pub instance: String,
    pub source: String,

    /// Value of the block's `version` attribute.
    pub version: Option<String>,
}

/// Every top-level `module` block that has a string `source`.
pub fn module_declarations(content: &str) -> Vec<ModuleDeclaration> {
    scanner::child_blocks(content, 0..content.len(), "module")
        .into_iter()
        .filter_map(|block| {
            let source = scanner::string_attribute(content, block.body(), "source")?.literal?;
            let version = scanner::string_attribute(content, block.body(), "version")
                .and_then(|a| a.literal);
            Some(ModuleDeclaration {
                instance: block.label().unwrap_or_default().to_string(),
                source,
                version,
            })
        })
        .collect()
}

fn lookahead_version(content: &str, from: usize, limit: usize) -> Option<String> {
    let mut end = (from + VERSION_LOOKAHEAD).min(limit);
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    version_pattern()
        .captures(&content[from..end])
        .map(|c| c[1].to_string())
}

/// Remove an attribute, taking its whole line when it stands alone.
fn removal(content: &str, attr: &Attribute) -> Edit {
    let line_start = scanner::line_start(content, attr.start);
    let line_end = scanner::line_end_inclusive(content, attr.value.end);
    let before = &content[line_start..attr.start];
    let after = &content[attr.value.end..line_end];

    let range = if before.trim().is_empty() && after.trim().is_empty() {
        line_start..line_end
    } else {
        let lead = before.len() - before.trim_end().len();
        attr.start - lead..attr.value.end
    };

    Edit {
        range,
        replacement: String::new(),
    }
}
