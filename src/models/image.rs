use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Registry used when an image reference carries no explicit host
pub const DEFAULT_REGISTRY_HOSTNAME: &str = "index.docker.io";
/// Tag used when an image reference carries no explicit tag
pub const DEFAULT_TAG: &str = "latest";
/// Registry scheme used when the reference carries no explicit scheme
pub const DEFAULT_SCHEME: &str = "https";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid image reference: {0}")]
    InvalidReference(String),
}

/// Parsed image reference: registry host, short name, tag and scheme.
///
/// Bare names are normalized the way Docker does it: `foo/bar:1.1` resolves
/// to `index.docker.io/foo/bar:1.1` and `debian` to
/// `index.docker.io/library/debian:latest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    registry: String,
    short_name: String,
    tag: String,
    scheme: String,
}

impl Reference {
    /// Parse a remote identifier, e.g. `gcr.io/project/app:1.2.0` or
    /// `https://registry.example.com/repo/app`
    pub fn parse(remote: &str) -> Result<Self, ImageError> {
        let (cleaned, scheme) = strip_scheme(remote);

        if cleaned.is_empty() || cleaned.contains(char::is_whitespace) {
            return Err(ImageError::InvalidReference(remote.to_string()));
        }

        let (registry, rest) = split_registry(cleaned);

        let (name, tag) = match rest.rsplit_once(':') {
            // a colon inside a path segment belongs to a port, not a tag
            Some((name, tag)) if !tag.contains('/') => (name, tag),
            _ => (rest, DEFAULT_TAG),
        };

        if name.is_empty() || tag.is_empty() {
            return Err(ImageError::InvalidReference(remote.to_string()));
        }

        // official images live under library/ on Docker Hub
        let short_name = if registry == DEFAULT_REGISTRY_HOSTNAME && !name.contains('/') {
            format!("library/{}", name)
        } else {
            name.to_string()
        };

        Ok(Self {
            registry: registry.to_string(),
            short_name,
            tag: tag.to_string(),
            scheme: scheme.to_string(),
        })
    }

    /// Registry host, e.g. `index.docker.io` or `localhost:5000`
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Image name without registry or tag, e.g. `foo/bar`
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Registry-qualified repository, e.g. `index.docker.io/foo/bar`
    pub fn repository(&self) -> String {
        format!("{}/{}", self.registry, self.short_name)
    }

    /// Short name with tag, e.g. `foo/bar:1.1`
    pub fn name(&self) -> String {
        format!("{}:{}", self.short_name, self.tag)
    }

    /// Fully qualified identifier, e.g. `index.docker.io/foo/bar:1.1`
    pub fn remote(&self) -> String {
        format!("{}:{}", self.repository(), self.tag)
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn strip_scheme(remote: &str) -> (&str, &str) {
    if let Some(rest) = remote.strip_prefix("https://") {
        (rest, "https")
    } else if let Some(rest) = remote.strip_prefix("http://") {
        (rest, "http")
    } else {
        (remote, DEFAULT_SCHEME)
    }
}

/// The first path segment is a registry host if it looks like one:
/// contains a dot or a port, or is `localhost`
fn split_registry(cleaned: &str) -> (&str, &str) {
    if let Some((first, rest)) = cleaned.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            return (first, rest);
        }
    }
    (DEFAULT_REGISTRY_HOSTNAME, cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_parse_with_tag() {
        let reference = Reference::parse("foo/bar:1.1").unwrap();

        assert_eq!(reference.remote(), "index.docker.io/foo/bar:1.1");
        assert_eq!(reference.tag(), "1.1");
        assert_eq!(reference.registry(), DEFAULT_REGISTRY_HOSTNAME);
        assert_eq!(reference.short_name(), "foo/bar");
        assert_eq!(reference.name(), "foo/bar:1.1");
        assert_eq!(reference.scheme(), "https");
    }

    #[test]
    fn test_parse_with_registry() {
        let reference = Reference::parse("localhost.localdomain/foo/bar:1.1").unwrap();

        assert_eq!(reference.registry(), "localhost.localdomain");
        assert_eq!(reference.repository(), "localhost.localdomain/foo/bar");
        assert_eq!(reference.tag(), "1.1");
    }

    #[test]
    fn test_parse_with_scheme() {
        let reference = Reference::parse("https://httphost.sh/foo/bar:1.1").unwrap();

        assert_eq!(reference.registry(), "httphost.sh");
        assert_eq!(reference.remote(), "httphost.sh/foo/bar:1.1");
        assert_eq!(reference.scheme(), "https");
    }

    #[test]
    fn test_parse_no_tag_defaults_to_latest() {
        let reference = Reference::parse("localhost.localdomain/foo/bar").unwrap();

        assert_eq!(reference.tag(), "latest");
        assert_eq!(reference.remote(), "localhost.localdomain/foo/bar:latest");
    }

    #[test]
    fn test_parse_official_image() {
        let reference = Reference::parse("debian:8.2").unwrap();

        assert_eq!(reference.short_name(), "library/debian");
        assert_eq!(reference.repository(), "index.docker.io/library/debian");
    }

    #[test]
    fn test_parse_registry_with_port() {
        let reference = Reference::parse("localhost:5000/foo/bar:1.1").unwrap();

        assert_eq!(reference.registry(), "localhost:5000");
        assert_eq!(reference.short_name(), "foo/bar");
        assert_eq!(reference.tag(), "1.1");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Reference::parse("").is_err());
        assert!(Reference::parse("foo bar:1.1").is_err());
        assert!(Reference::parse("foo/bar:").is_err());
    }
}
