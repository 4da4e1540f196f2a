use super::PolicyError;
use semver::Version;
use std::collections::HashMap;

/// How far a semver policy is allowed to advance a version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemverScope {
    All,
    Major,
    Minor,
    Patch,
}

impl std::fmt::Display for SemverScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SemverScope::All => "all",
            SemverScope::Major => "major",
            SemverScope::Minor => "minor",
            SemverScope::Patch => "patch",
        };
        write!(f, "{}", s)
    }
}

/// Parse an image tag as a semantic version.
///
/// Tags are slightly more permissive than strict semver: a leading `v` is
/// stripped and a two-part `1.3` is padded to `1.3.0`.
pub fn parse_tag(tag: &str) -> Result<Version, PolicyError> {
    let clean = tag.trim().trim_start_matches('v');

    if let Ok(v) = Version::parse(clean) {
        return Ok(v);
    }

    // pad MAJOR.MINOR to MAJOR.MINOR.0, keeping any pre-release suffix
    let (core, suffix) = match clean.find(['-', '+']) {
        Some(idx) => clean.split_at(idx),
        None => (clean, ""),
    };
    if core.split('.').count() == 2 {
        let padded = format!("{}.0{}", core, suffix);
        if let Ok(v) = Version::parse(&padded) {
            return Ok(v);
        }
    }

    Err(PolicyError::InvalidVersion(tag.to_string()))
}

pub(crate) fn should_update(
    scope: SemverScope,
    match_pre_release: bool,
    current: &str,
    candidate: &str,
) -> Result<bool, PolicyError> {
    // no baseline to compare against
    if current == "latest" {
        return Ok(true);
    }

    let parts = candidate.splitn(3, '.').count();
    if parts != 2 && parts != 3 {
        return Err(PolicyError::NoMajorMinorPatchElements);
    }

    let current_version = parse_tag(current)?;
    let candidate_version = parse_tag(candidate)?;

    // Do not enforce pre-release match when either:
    // - All scope
    // - match_pre_release set to false
    if current_version.pre != candidate_version.pre
        && scope != SemverScope::All
        && match_pre_release
    {
        return Ok(false);
    }

    // candidate is not higher than current - do nothing
    if candidate_version <= current_version {
        return Ok(false);
    }

    match scope {
        SemverScope::All | SemverScope::Major => Ok(true),
        SemverScope::Minor => Ok(candidate_version.major == current_version.major),
        SemverScope::Patch => Ok(candidate_version.major == current_version.major
            && candidate_version.minor == current_version.minor),
    }
}

/// Drops non-semver tags and returns the rest sorted descending,
/// preserving the original tag strings.
pub fn filter(tags: &[String]) -> Vec<String> {
    let mut versions: Vec<(Version, String)> = tags
        .iter()
        .filter_map(|t| parse_tag(t).ok().map(|v| (v, t.clone())))
        .collect();

    versions.sort_by(|a, b| b.0.cmp(&a.0));
    versions.into_iter().map(|(_, t)| t).collect()
}

/// Reduces a tag list to the single highest semver tag per pre-release
/// channel. Non-semver tags are dropped; the result is sorted descending
/// for determinism.
pub fn collapse(tags: &[String]) -> Vec<String> {
    let mut best: HashMap<String, (Version, String)> = HashMap::new();

    for tag in tags {
        let Ok(version) = parse_tag(tag) else {
            continue;
        };
        let channel = version.pre.as_str().to_string();
        match best.get(&channel) {
            Some((held, _)) if *held >= version => {}
            _ => {
                best.insert(channel, (version, tag.clone()));
            }
        }
    }

    let mut out: Vec<(Version, String)> = best.into_values().collect();
    out.sort_by(|a, b| b.0.cmp(&a.0));
    out.into_iter().map(|(_, t)| t).collect()
}
