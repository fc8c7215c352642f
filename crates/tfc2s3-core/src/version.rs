//! Dotted version parsing, ordering and module version checks.
//!
//! Versions compare component by component. When one version is a prefix of
//! the other the shorter one is lower, so `1.2 < 1.2.0 < 1.2.1`. This is the
//! derived ordering of the component vector.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_REPO_PREFIX;
use crate::rewrite::{module_declarations, ConfigFile};

/// Errors from [`parse_version`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("empty version string")]
    Empty,

    #[error("invalid version {input:?}: component {component:?} is not a non-negative integer")]
    InvalidComponent { input: String, component: String },
}

/// A parsed dotted version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(Vec<u64>);

impl Version {
    pub fn new(components: Vec<u64>) -> Self {
        Self(components)
    }

    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_version(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_version(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

/// Parse `1.2.3` or `v1.2.3`. Only a single leading `v` is stripped.
pub fn parse_version(s: &str) -> Result<Version, VersionParseError> {
    let trimmed = s.trim();
    let body = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if body.is_empty() {
        return Err(VersionParseError::Empty);
    }

    body.split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionParseError::InvalidComponent {
                    input: s.to_string(),
                    component: part.to_string(),
                });
            }
            part.parse::<u64>()
                .map_err(|_| VersionParseError::InvalidComponent {
                    input: s.to_string(),
                    component: part.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Version)
}

pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

/// Inclusive bounds for one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRequirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Version>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Version>,
}

impl VersionRequirement {
    pub fn at_least(min: Version) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn between(min: Version, max: Version) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn allows(&self, version: &Version) -> bool {
        self.min.as_ref().map_or(true, |min| version >= min)
            && self.max.as_ref().map_or(true, |max| version <= max)
    }

    fn describe(&self) -> String {
        let show = |v: &Option<Version>| v.as_ref().map_or("none".to_string(), Version::to_string);
        format!("min {}, max {}", show(&self.min), show(&self.max))
    }
}

/// Module name → bounds.
pub type VersionRequirements = BTreeMap<String, VersionRequirement>;

/// Check every `module` block in `files` against `requirements`.
///
/// Modules are identified by registry module name, or for git sources by
/// repository name with or without its `terraform-<provider>-` prefix.
/// Returns one message per violation, empty when everything satisfies its
/// bounds.
pub fn validate_module_versions(files: &[ConfigFile], requirements: &VersionRequirements) -> Vec<String> {
    validate_module_versions_with(files, requirements, DEFAULT_REPO_PREFIX)
}

/// [`validate_module_versions`] for git repositories named
/// `<repo_prefix>-<provider>-<name>`.
pub fn validate_module_versions_with(
    files: &[ConfigFile],
    requirements: &VersionRequirements,
    repo_prefix: &str,
) -> Vec<String> {
    let mut violations = Vec::new();
    if requirements.is_empty() {
        return violations;
    }

    for file in files {
        for decl in module_declarations(&file.content) {
            let resolved = resolve_source(&decl.source, repo_prefix);
            let Some((name, req)) = resolved
                .names
                .iter()
                .find_map(|n| requirements.get_key_value(n.as_str()))
            else {
                continue;
            };

            let raw = if decl.source.starts_with("git::") {
                // A branch name such as `main` is an unpinned ref.
                resolved.git_ref.filter(|r| parse_version(r).is_ok())
            } else {
                decl.version.clone()
            };

            let location = format!("Module '{}' ({}) in {}", decl.instance, name, file.path.display());

            let Some(raw) = raw else {
                if let Some(min) = &req.min {
                    violations.push(format!(
                        "{location} has no version specified, but requires minimum version {min}"
                    ));
                }
                continue;
            };

            match parse_version(&raw) {
                Ok(version) if req.allows(&version) => {}
                Ok(version) => violations.push(format!(
                    "{location} version {version} is outside the required range ({})",
                    req.describe()
                )),
                Err(e) => violations.push(format!("{location} has an invalid version: {e}")),
            }
        }
    }

    violations
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ResolvedSource {
    names: Vec<String>,
    git_ref: Option<String>,
}

fn resolve_source(source: &str, repo_prefix: &str) -> ResolvedSource {
    if let Some(url) = source.strip_prefix("git::") {
        let (location, query) = url.split_once('?').unwrap_or((url, ""));
        let path = location
            .split_once("://")
            .map_or(location, |(_, rest)| rest);
        let path = path.split_once("//").map_or(path, |(p, _)| p);
        let repo = path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git");

        let mut names = vec![repo.to_string()];
        if let Some(rest) = repo.strip_prefix(&format!("{repo_prefix}-")) {
            if let Some((_provider, name)) = rest.split_once('-') {
                names.push(name.to_string());
            }
        }

        let git_ref = query
            .split('&')
            .find_map(|kv| kv.strip_prefix("ref="))
            .map(str::to_string);
        return ResolvedSource { names, git_ref };
    }

    if source.starts_with('.') || source.starts_with('/') {
        return ResolvedSource::default();
    }
    let path = source.split_once("//").map_or(source, |(p, _)| p);
    let segments: Vec<&str> = path.split('/').collect();
    let name = match segments.as_slice() {
        [_host, _org, name, _provider] => Some(name),
        [_org, name, _provider] => Some(name),
        _ => None,
    };

    ResolvedSource {
        names: name.map(|n| vec![n.to_string()]).unwrap_or_default(),
        git_ref: None,
    }
}
