// Manifest layer: fetching, classifying and rewriting HLS playlists.

mod fetcher;
mod outline;
mod rewriter;

pub use fetcher::{ManifestBody, ManifestFetcher, ManifestResponse, classify};
pub use outline::PlaylistOutline;
pub use rewriter::{PlaylistLine, resolve_reference, rewrite_playlist};
