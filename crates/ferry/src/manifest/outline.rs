//! Structural view of a playlist used by segmented downloads.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;
use url::Url;

use super::rewriter::{PlaylistLine, resolve_reference, split_lines};

static URI_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"URI="([^"]*)""#).expect("valid URI attribute regex"));
static METHOD_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"METHOD=([A-Za-z0-9-]+)").expect("valid METHOD attribute regex"));

/// What a download needs to know about a playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistOutline {
    /// Variant playlists listed after `#EXT-X-STREAM-INF`, in source order
    pub variants: Vec<Url>,
    /// `#EXT-X-MAP` initialization segment
    pub init_segment: Option<Url>,
    /// Media segments in playback order
    pub segments: Vec<Url>,
    /// Encryption method from `#EXT-X-KEY`, unless it is `NONE`
    pub encryption: Option<String>,
}

impl PlaylistOutline {
    pub fn parse(content: &str, base: &Url) -> Self {
        let mut outline = Self::default();
        let mut expect_variant = false;

        for (line, _) in split_lines(content) {
            match PlaylistLine::classify(line) {
                PlaylistLine::Blank => {}
                PlaylistLine::Directive(tag) => {
                    if tag.starts_with("#EXT-X-STREAM-INF") {
                        expect_variant = true;
                    } else if tag.starts_with("#EXT-X-MAP") {
                        if outline.init_segment.is_none() {
                            outline.init_segment = attribute_uri(tag, base);
                        }
                    } else if tag.starts_with("#EXT-X-KEY")
                        && let Some(method) = METHOD_ATTR.captures(tag).map(|c| c[1].to_string())
                        && !method.eq_ignore_ascii_case("NONE")
                    {
                        outline.encryption = Some(method);
                    }
                }
                PlaylistLine::Uri(reference) => {
                    let Some(url) = absolute(base, reference) else {
                        continue;
                    };
                    if std::mem::take(&mut expect_variant) {
                        outline.variants.push(url);
                    } else {
                        outline.segments.push(url);
                    }
                }
            }
        }

        outline
    }

    pub fn is_master(&self) -> bool {
        !self.variants.is_empty()
    }
}

fn absolute(base: &Url, reference: &str) -> Option<Url> {
    match resolve_reference(base, reference) {
        Ok(Some(url)) => Some(url),
        Ok(None) => Url::parse(reference).ok(),
        Err(e) => {
            warn!(error = %e, "Skipping unusable playlist entry");
            None
        }
    }
}

fn attribute_uri(tag: &str, base: &Url) -> Option<Url> {
    let captures = URI_ATTR.captures(tag)?;
    absolute(base, &captures[1])
}
