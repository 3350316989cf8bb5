//! Shared constants used across the application.

/// User agent string used for rendering requests.
///
/// This is a realistic desktop browser user agent so that sites serve the same
/// markup a visitor would see.
pub const ARCHIVAL_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Content type stored alongside every rendered document.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Object name used when a URL has no usable path segment.
pub const FALLBACK_KEY_NAME: &str = "index";

/// Extension appended to every derived object key.
pub const KEY_EXTENSION: &str = ".html";

/// URL patterns blocked when heavy sub-resource suppression is enabled.
///
/// DevTools matches these against the whole URL, so each pattern ends in `*`
/// to also cover query strings and fragments.
pub const HEAVY_RESOURCE_PATTERNS: &[&str] = &[
    "*.png*", "*.jpg*", "*.jpeg*", "*.gif*", "*.webp*", "*.avif*", "*.svg*", "*.ico*", "*.bmp*",
    "*.mp4*", "*.webm*", "*.mp3*", "*.ogg*", "*.wav*", "*.m4a*", "*.woff*", "*.ttf*", "*.otf*",
    "*.eot*",
];

#[cfg(test)]
mod tests {
    use super::*;

    /// Whole-string wildcard match where `*` spans any run of characters.
    fn wildcard_match(pattern: &str, text: &str) -> bool {
        let parts: Vec<&str> = pattern.split('*').collect();
        let (first, rest) = parts.split_first().unwrap();
        let Some(mut remaining) = text.strip_prefix(first) else {
            return false;
        };
        let (last, middle) = rest.split_last().unwrap();
        for part in middle {
            match remaining.find(part) {
                Some(i) => remaining = &remaining[i + part.len()..],
                None => return false,
            }
        }
        remaining.ends_with(last)
    }

    fn blocked(url: &str) -> bool {
        HEAVY_RESOURCE_PATTERNS
            .iter()
            .any(|p| wildcard_match(p, url))
    }

    #[test]
    fn test_blocks_assets_with_query_strings() {
        assert!(blocked("https://cdn.test/x.png"));
        assert!(blocked("https://cdn.test/x.png?v=3"));
        assert!(blocked("https://cdn.test/img/hero.webp#frag"));
        assert!(blocked("https://fonts.test/f/inter.woff2?display=swap"));
        assert!(blocked("https://media.test/clip.mp4?token=abc"));
    }

    #[test]
    fn test_documents_and_scripts_pass() {
        assert!(!blocked("https://a.test/page1"));
        assert!(!blocked("https://a.test/app.js?v=3"));
        assert!(!blocked("https://a.test/styles.css"));
    }
}
