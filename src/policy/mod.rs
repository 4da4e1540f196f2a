pub mod semver;

pub use self::semver::{SemverScope, collapse, parse_tag};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    None,
    Semver,
    Force,
    Glob,
    Regexp,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("no major.minor.patch elements found")]
    NoMajorMinorPatchElements,
    #[error("failed to parse version: {0}")]
    InvalidVersion(String),
}

/// Additional options when parsing a policy declaration
#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub match_tag: bool,
    pub match_pre_release: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            match_tag: false,
            // default to true for backward compatibility
            match_pre_release: true,
        }
    }
}

/// Pure decision function over two tag strings. Immutable once constructed;
/// `should_update` has no side effects.
#[derive(Debug, Clone)]
pub enum Policy {
    /// Never update
    None,
    /// Always update, optionally restricted to same-tag redeploys
    /// (digest-only changes under a moving tag like `latest`)
    Force { match_tag: bool },
    /// Any candidate tag matching the pattern is an update, as long as it
    /// sorts above the current tag
    Glob { raw: String, pattern: glob::Pattern },
    /// Any candidate tag matching the expression is an update
    Regexp { raw: String, pattern: regex::Regex },
    Semver {
        scope: SemverScope,
        match_pre_release: bool,
    },
}

impl Policy {
    /// Parse a policy declaration from a resource label/annotation value:
    /// `all | major | minor | patch | force | never | "" | glob:<pattern> |
    /// regexp:<pattern>`.
    ///
    /// A configuration error is never fatal: unknown or malformed values are
    /// logged and fall back to the never-update policy.
    pub fn parse(name: &str, options: &Options) -> Policy {
        if let Some(pattern) = name.strip_prefix("glob:") {
            return match glob::Pattern::new(pattern) {
                Ok(compiled) => Policy::Glob {
                    raw: name.to_string(),
                    pattern: compiled,
                },
                Err(error) => {
                    warn!(
                        policy = name,
                        %error,
                        "failed to parse glob policy, check your configuration"
                    );
                    Policy::None
                }
            };
        }
        if let Some(pattern) = name.strip_prefix("regexp:") {
            return match regex::Regex::new(pattern) {
                Ok(compiled) => Policy::Regexp {
                    raw: name.to_string(),
                    pattern: compiled,
                },
                Err(error) => {
                    warn!(
                        policy = name,
                        %error,
                        "failed to parse regexp policy, check your configuration"
                    );
                    Policy::None
                }
            };
        }

        match name {
            "all" => Policy::Semver {
                scope: SemverScope::All,
                match_pre_release: options.match_pre_release,
            },
            "major" => Policy::Semver {
                scope: SemverScope::Major,
                match_pre_release: options.match_pre_release,
            },
            "minor" => Policy::Semver {
                scope: SemverScope::Minor,
                match_pre_release: options.match_pre_release,
            },
            "patch" => Policy::Semver {
                scope: SemverScope::Patch,
                match_pre_release: options.match_pre_release,
            },
            "force" => Policy::Force {
                match_tag: options.match_tag,
            },
            "" | "never" => Policy::None,
            unknown => {
                warn!(
                    policy = unknown,
                    "unknown policy, please check your configuration"
                );
                Policy::None
            }
        }
    }

    /// Decides whether `candidate` is a legitimate update over `current`
    pub fn should_update(&self, current: &str, candidate: &str) -> Result<bool, PolicyError> {
        match self {
            Policy::None => Ok(false),
            Policy::Force { match_tag } => {
                if *match_tag && current != candidate {
                    return Ok(false);
                }
                Ok(true)
            }
            Policy::Glob { pattern, .. } => Ok(pattern.matches(candidate) && candidate > current),
            Policy::Regexp { pattern, .. } => Ok(pattern.is_match(candidate)),
            Policy::Semver {
                scope,
                match_pre_release,
            } => self::semver::should_update(*scope, *match_pre_release, current, candidate),
        }
    }

    /// Ranks candidate tags: keeps only the tags this policy could ever
    /// accept, sorted best-first
    pub fn filter(&self, tags: &[String]) -> Vec<String> {
        match self {
            Policy::None => Vec::new(),
            Policy::Force { .. } => tags.to_vec(),
            Policy::Glob { pattern, .. } => {
                let mut filtered: Vec<String> =
                    tags.iter().filter(|t| pattern.matches(t)).cloned().collect();
                filtered.sort_by(|a, b| b.cmp(a));
                filtered
            }
            Policy::Regexp { pattern, .. } => {
                let mut filtered: Vec<String> =
                    tags.iter().filter(|t| pattern.is_match(t)).cloned().collect();
                // a named `compare` group overrides plain lexical ordering
                let has_compare = pattern.capture_names().flatten().any(|n| n == "compare");
                if has_compare {
                    let key = |t: &String| -> String {
                        pattern
                            .captures(t)
                            .and_then(|c| c.name("compare"))
                            .map(|m| m.as_str().to_string())
                            .unwrap_or_default()
                    };
                    filtered.sort_by(|a, b| key(b).cmp(&key(a)));
                } else {
                    filtered.sort_by(|a, b| b.cmp(a));
                }
                filtered
            }
            Policy::Semver { .. } => self::semver::filter(tags),
        }
    }

    /// Force policies follow a moving tag, so the watcher must diff digests
    /// instead of listing tags
    pub fn keep_tag(&self) -> bool {
        matches!(self, Policy::Force { .. })
    }

    pub fn name(&self) -> String {
        match self {
            Policy::None => "never".to_string(),
            Policy::Force { .. } => "force".to_string(),
            Policy::Glob { raw, .. } | Policy::Regexp { raw, .. } => raw.clone(),
            Policy::Semver { scope, .. } => scope.to_string(),
        }
    }

    pub fn policy_type(&self) -> PolicyType {
        match self {
            Policy::None => PolicyType::None,
            Policy::Force { .. } => PolicyType::Force,
            Policy::Glob { .. } => PolicyType::Glob,
            Policy::Regexp { .. } => PolicyType::Regexp,
            Policy::Semver { .. } => PolicyType::Semver,
        }
    }
}
