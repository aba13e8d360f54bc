pub mod registry;

pub use registry::HubTagSource;

use anyhow::Result;

/// One page of tag names returned by a tag source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPage {
    pub tags: Vec<String>,
    /// Cursor for the following page; `None` when this was the last page
    pub next: Option<String>,
}

impl TagPage {
    pub fn last<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            next: None,
        }
    }
}

/// Lists the published tags of a repo, one page at a time.
///
/// The first call passes `cursor = None`; later calls pass back the `next`
/// value of the previous page.
pub trait TagSource: Send + Sync {
    fn list_tags(&self, repo: &str, cursor: Option<&str>) -> Result<TagPage>;
}
