use crate::catalog::{ImageDefinition, ImageVersion};
use crate::constants::{DEFAULT_VERSION_PREFIX, DEFAULT_VERSION_WIDTH};
use crate::error::{ChainBuildError, Result};
use crate::oci::TagSource;
use regex::Regex;
use std::num::ParseIntError;

/// How version numbers are rendered into tags and substitution values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFormat {
    pub prefix: String,
    pub width: usize,
}

impl Default for VersionFormat {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_VERSION_PREFIX.to_string(),
            width: DEFAULT_VERSION_WIDTH,
        }
    }
}

impl VersionFormat {
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
        }
    }

    pub fn format(&self, version: u32) -> String {
        format!("{}{:0width$}", self.prefix, version, width = self.width)
    }
}

/// Recognises tags written in a [`VersionFormat`]: the prefix followed by
/// digits and nothing else. Padding is not checked, so `v7` and `v007` both
/// read as 7.
#[derive(Debug, Clone)]
pub struct TagPattern {
    regex: Regex,
}

impl TagPattern {
    pub fn new(format: &VersionFormat) -> Result<Self> {
        let regex = Regex::new(&format!(r"^{}(\d+)$", regex::escape(&format.prefix)))
            .map_err(anyhow::Error::from)?;
        Ok(Self { regex })
    }

    /// `None` for tags in another format. A tag in this format whose number
    /// does not fit in a `u32` yields the parse error.
    pub fn parse(&self, tag: &str) -> Option<std::result::Result<u32, ParseIntError>> {
        self.regex.captures(tag).map(|caps| caps[1].parse())
    }
}

/// Decides which version number each image is built as.
pub struct VersionResolver<'a> {
    tags: &'a dyn TagSource,
    pattern: TagPattern,
}

impl<'a> VersionResolver<'a> {
    /// Resolve against published tags written in `format`.
    pub fn new(tags: &'a dyn TagSource, format: &VersionFormat) -> Result<Self> {
        Ok(Self {
            tags,
            pattern: TagPattern::new(format)?,
        })
    }

    /// Version to build `image` as: the declared version, or one past the
    /// highest published tag.
    pub fn resolve(&self, image: &ImageDefinition) -> Result<u32> {
        match image.version {
            ImageVersion::Resolved(v) => Ok(v),
            ImageVersion::Pending => {
                let max = self.max_published(&image.repo)?;
                let next = max.checked_add(1).ok_or_else(|| ChainBuildError::Resolution {
                    repo: image.repo.clone(),
                    reason: format!("published version {} cannot be incremented", max),
                })?;
                tracing::info!(repo = %image.repo, version = next, "Resolved next version");
                Ok(next)
            }
        }
    }

    /// Version an already published image is available as, if any.
    pub fn published(&self, image: &ImageDefinition) -> Result<Option<u32>> {
        match image.version {
            ImageVersion::Resolved(v) => Ok(Some(v)),
            ImageVersion::Pending => {
                let max = self.max_published(&image.repo)?;
                Ok((max > 0).then_some(max))
            }
        }
    }

    /// Highest version tag across every page of the repo's tags, 0 if none.
    pub fn max_published(&self, repo: &str) -> Result<u32> {
        let mut names = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .tags
                .list_tags(repo, cursor.as_deref())
                .map_err(|e| ChainBuildError::Resolution {
                    repo: repo.to_string(),
                    reason: format!("{:#}", e),
                })?;
            names.extend(page.tags);
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let mut max = 0;
        for name in &names {
            match self.pattern.parse(name) {
                Some(Ok(v)) => max = max.max(v),
                Some(Err(e)) => {
                    return Err(ChainBuildError::Resolution {
                        repo: repo.to_string(),
                        reason: format!("tag {} is out of range: {}", name, e),
                    })
                }
                None => tracing::debug!(repo, tag = %name, "Ignoring tag in another format"),
            }
        }
        Ok(max)
    }
}
