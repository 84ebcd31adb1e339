// Playlist rewriting: relative URI lines become absolute URLs on the playlist's origin.
//
// Only URI lines are touched. Directive lines (`#...`), blank lines and line terminators
// come out exactly as they went in.

use tracing::{debug, trace};
use url::{ParseError, Url};

use crate::error::{Error, Result};

/// One line of a playlist as seen by the rewriter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistLine<'a> {
    /// Empty or whitespace-only line
    Blank,
    /// Tag or comment line starting with `#`
    Directive(&'a str),
    /// Anything else: a segment or variant playlist reference
    Uri(&'a str),
}

impl<'a> PlaylistLine<'a> {
    pub fn classify(line: &'a str) -> Self {
        let trimmed = line.trim_start_matches('\u{FEFF}').trim();
        if trimmed.is_empty() {
            Self::Blank
        } else if trimmed.starts_with('#') {
            Self::Directive(trimmed)
        } else {
            Self::Uri(trimmed)
        }
    }
}

/// Split `content` into `(line, terminator)` pairs, keeping `\n` / `\r\n` terminators.
pub(crate) fn split_lines(content: &str) -> impl Iterator<Item = (&str, &str)> {
    content.split_inclusive('\n').map(|piece| {
        if let Some(line) = piece.strip_suffix("\r\n") {
            (line, "\r\n")
        } else if let Some(line) = piece.strip_suffix('\n') {
            (line, "\n")
        } else {
            (piece, "")
        }
    })
}

/// Resolve a playlist reference against the playlist URL.
///
/// Returns `Ok(None)` when the reference is already absolute (any scheme) and must be left
/// alone, `Ok(Some(url))` for a relative reference resolved against the playlist's
/// directory, and `Err(Parse)` when the text cannot be understood as a URI at all.
pub fn resolve_reference(base: &Url, reference: &str) -> Result<Option<Url>> {
    match Url::parse(reference) {
        Ok(_) => Ok(None),
        Err(ParseError::RelativeUrlWithoutBase) => base
            .join(reference)
            .map(Some)
            .map_err(|e| Error::parse(reference, e.to_string())),
        Err(e) => Err(Error::parse(reference, e.to_string())),
    }
}

/// Rewrite every relative URI line of `content` into an absolute URL based on `base`.
pub fn rewrite_playlist(content: &str, base: &Url) -> String {
    let mut out = String::with_capacity(content.len() + content.len() / 2);
    let mut rewritten = 0usize;
    let mut passed_through = 0usize;

    for (line, terminator) in split_lines(content) {
        match PlaylistLine::classify(line) {
            PlaylistLine::Blank | PlaylistLine::Directive(_) => out.push_str(line),
            PlaylistLine::Uri(reference) => match resolve_reference(base, reference) {
                Ok(Some(resolved)) => {
                    trace!(from = reference, to = %resolved, "Resolved playlist reference");
                    out.push_str(resolved.as_str());
                    rewritten += 1;
                }
                Ok(None) => out.push_str(line),
                Err(e) => {
                    debug!(error = %e, "Passing through unparseable playlist line");
                    out.push_str(line);
                    passed_through += 1;
                }
            },
        }
        out.push_str(terminator);
    }

    debug!(
        base = %base,
        rewritten,
        passed_through,
        "Rewrote playlist references"
    );
    out
}
