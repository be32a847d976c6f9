use regex::Regex;
use serde::{Serialize, Serializer};
use std::{fmt, str::FromStr, sync::OnceLock};
use thiserror::Error;

const NAME_TOTAL_LENGTH_MAX: usize = 255;

const DEFAULT_TAG: &str = "latest";

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("repository name must have at least one component")]
    Empty,

    #[error("invalid reference format: {0:?}")]
    InvalidFormat(String),

    #[error("invalid reference format: repository name must be lowercase: {0:?}")]
    NameContainsUppercase(String),

    #[error("repository name must not be more than 255 characters: {0:?}")]
    NameTooLong(String),
}

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub enum Qualifier {
    Tag(String),
    Digest(String),
}

/// A parsed image reference such as `registry.io/team/app:v2` or
/// `alpine@sha256:...`.
///
/// Always carries exactly one qualifier: a reference without one gets the
/// `latest` tag, and one with both a tag and a digest keeps the digest.
#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct Reference {
    name: String,
    qualifier: Qualifier,
}

impl Reference {
    pub fn parse(s: &str) -> Result<Reference, ReferenceError> {
        if s.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let captures = match reference_regex().captures(s) {
            Some(captures) => captures,
            None if reference_regex().is_match(&s.to_lowercase()) => {
                return Err(ReferenceError::NameContainsUppercase(s.into()))
            }
            None => return Err(ReferenceError::InvalidFormat(s.into())),
        };

        let name = captures
            .name("name")
            .map(|name| name.as_str())
            .ok_or_else(|| ReferenceError::InvalidFormat(s.into()))?;

        if name.len() > NAME_TOTAL_LENGTH_MAX {
            return Err(ReferenceError::NameTooLong(name.into()));
        }

        let qualifier = match (captures.name("tag"), captures.name("digest")) {
            (_, Some(digest)) => Qualifier::Digest(digest.as_str().into()),
            (Some(tag), None) => Qualifier::Tag(tag.as_str().into()),
            (None, None) => Qualifier::Tag(DEFAULT_TAG.into()),
        };

        Ok(Reference {
            name: name.into(),
            qualifier,
        })
    }

    /// Registry host and repository path, without tag or digest.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualifier(&self) -> &Qualifier {
        &self.qualifier
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.qualifier {
            Qualifier::Tag(tag) => Some(tag),
            Qualifier::Digest(_) => None,
        }
    }

    pub fn digest(&self) -> Option<&str> {
        match &self.qualifier {
            Qualifier::Tag(_) => None,
            Qualifier::Digest(digest) => Some(digest),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Qualifier::Tag(tag) => write!(f, "{}:{}", self.name, tag),
            Qualifier::Digest(digest) => write!(f, "{}@{}", self.name, digest),
        }
    }
}

impl FromStr for Reference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Reference::parse(s)
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The distribution reference grammar:
///
/// ```text
/// reference := name [ ":" tag ] [ "@" digest ]
/// name      := [domain "/"] path-component ["/" path-component]*
/// ```
fn reference_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();

    REGEX.get_or_init(|| {
        let alphanumeric = r"[a-z0-9]+";
        let separator = r"(?:[._]|__|[-]+)";
        let path_component = format!("{0}(?:{1}{0})*", alphanumeric, separator);

        let domain_component = r"(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])";
        let domain_name = format!("{0}(?:\\.{0})*", domain_component);
        let ipv6 = r"\[(?:[a-fA-F0-9:]+)\]";
        let domain = format!("(?:{}|{})(?::[0-9]+)?", domain_name, ipv6);

        let name = format!(
            "(?:{}/)?{}(?:/{})*",
            domain, path_component, path_component
        );
        let tag = r"[\w][\w.-]{0,127}";
        let digest = r"[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,}";

        let pattern = format!(
            "^(?P<name>{})(?::(?P<tag>{}))?(?:@(?P<digest>{}))?$",
            name, tag, digest
        );

        Regex::new(&pattern).expect("reference grammar is a valid regex")
    })
}
