//! Rewrite `cid:` references in an HTML body to the saved inline images.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Content-ID (without angle brackets) → saved filename, for one message.
pub type InlineImageMap = HashMap<String, String>;

/// `cid:` references inside double- or single-quoted attribute values.
static CID_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""cid:([^"]*)"|'cid:([^']*)'"#).expect("cid pattern is valid")
});

/// How many `cid:` references to rewrite per body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InlineMode {
    /// Only the first reference in the body.
    #[default]
    First,
    /// Every reference that resolves to a saved image.
    All,
}

/// Replace `cid:` references with `output_dir` + the mapped filename.
///
/// References whose content-id is not in `images` are left as they are.
/// With an empty map the body is returned unchanged.
pub fn rewrite(html: &str, images: &InlineImageMap, output_dir: &Path, mode: InlineMode) -> String {
    if images.is_empty() {
        return html.to_string();
    }

    let limit = match mode {
        InlineMode::First => 1,
        InlineMode::All => 0,
    };

    CID_REFERENCE
        .replacen(html, limit, |caps: &Captures| {
            let (cid, quote) = match (caps.get(1), caps.get(2)) {
                (Some(m), _) => (m.as_str(), '"'),
                (None, Some(m)) => (m.as_str(), '\''),
                (None, None) => return caps[0].to_string(),
            };
            match images.get(cid) {
                Some(filename) => {
                    format!("{quote}{}{quote}", output_dir.join(filename).display())
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> InlineImageMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_rewrite_single_reference() {
        let html = r#"<img src="cid:img1">"#;
        let out = rewrite(html, &map(&[("img1", "photo.png")]), Path::new("/out/"), InlineMode::First);
        assert_eq!(out, r#"<img src="/out/photo.png">"#);
    }

    #[test]
    fn test_no_reference_is_unchanged() {
        let html = "<p>No images here</p>";
        let out = rewrite(html, &map(&[("img1", "photo.png")]), Path::new("/out"), InlineMode::All);
        assert_eq!(out, html);
    }

    #[test]
    fn test_empty_map_is_unchanged() {
        let html = r#"<img src="cid:img1">"#;
        assert_eq!(rewrite(html, &map(&[]), Path::new("/out"), InlineMode::All), html);
    }

    #[test]
    fn test_first_mode_rewrites_only_first() {
        let html = r#"<img src="cid:a"><img src="cid:b">"#;
        let images = map(&[("a", "a.png"), ("b", "b.png")]);
        let out = rewrite(html, &images, Path::new("/out"), InlineMode::First);
        assert_eq!(out, r#"<img src="/out/a.png"><img src="cid:b">"#);
    }

    #[test]
    fn test_all_mode_rewrites_every_reference() {
        let html = r#"<img src="cid:a"><img src='cid:b'><img src="cid:missing">"#;
        let images = map(&[("a", "a.png"), ("b", "b.png")]);
        let out = rewrite(html, &images, Path::new("/out"), InlineMode::All);
        assert_eq!(
            out,
            r#"<img src="/out/a.png"><img src='/out/b.png'><img src="cid:missing">"#
        );
    }

    #[test]
    fn test_unmapped_first_reference_is_kept() {
        let html = r#"<img src="cid:unknown">"#;
        let out = rewrite(html, &map(&[("a", "a.png")]), Path::new("/out"), InlineMode::First);
        assert_eq!(out, html);
    }
}
