// Fixed pattern set for markup and URL parsing.

use std::sync::LazyLock;

use regex::Regex;

/// `href` pointing at a post permalink: `/explore/<user>/posts/<id>`.
/// Captures: 1 = full href, 2 = username, 3 = post id.
pub(crate) static POST_PERMALINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"href\s*=\s*["']((?:https?://[^"'/]+)?/explore/([^"'/?#]+)/posts/([^"'/?#]+)[^"']*)["']"#,
    )
    .expect("valid regex")
});

/// `href` pointing at a creator profile: `/explore/<user>` with nothing after
/// the username but an optional slash, query or fragment.
/// Captures: 1 = profile URL, 2 = username.
pub(crate) static PROFILE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href\s*=\s*["']((?:https?://[^"'/]+)?/explore/([^"'/?#]+))/?(?:[?#][^"']*)?["']"#)
        .expect("valid regex")
});

pub(crate) static AVATAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://avatar-cdn\.liketoknow\.it/[^"'\s,)<>]+"#).expect("valid regex")
});

pub(crate) static CONTENT_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://product-images-cdn\.liketoknow\.it/[^"'\s,)<>]+"#).expect("valid regex")
});

pub(crate) static VIDEO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^"'\s<>]+?\.(?:mp4|m3u8)(?:\?[^"'\s<>]*)?"#).expect("valid regex")
});

/// Affiliate product link. Captures: 1 = URL, 2 = product id.
pub(crate) static AFFILIATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href\s*=\s*["'](https?://rstyle\.me/\+([^"'?/#]+)[^"']*)["']"#)
        .expect("valid regex")
});

/// Flat JSON object assigned to a `"product"` key inside inline scripts.
pub(crate) static INLINE_PRODUCT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""product"\s*:\s*(\{[^{}]*\})"#).expect("valid regex")
});

pub(crate) static OG_DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta\s+property\s*=\s*["']og:description["']\s+content\s*=\s*"([^"]*)""#)
        .expect("valid regex")
});

pub(crate) static NEXT_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*\bid\s*=\s*["']__NEXT_DATA__["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});

static POST_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/posts/([^/?#]+)").expect("valid regex"));

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/explore/([^/?#]+)").expect("valid regex"));

static WIDTH_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bw=\d+").expect("valid regex"));

/// Post id from a permalink: the segment after `/posts/`.
pub fn post_id_from_url(url: &str) -> Option<String> {
    POST_ID_RE
        .captures(url)
        .map(|c| c[1].to_string())
        .filter(|id| !id.is_empty())
}

/// Creator username from a profile or post URL: the segment after `/explore/`.
pub fn username_from_url(url: &str) -> Option<String> {
    USERNAME_RE
        .captures(url)
        .map(|c| c[1].to_string())
        .filter(|name| !name.is_empty())
}

/// Permalink convention: `{base}/explore/{username}/posts/{post_id}`.
pub fn permalink(base_url: &str, username: &str, post_id: &str) -> String {
    format!(
        "{}/explore/{}/posts/{}",
        base_url.trim_end_matches('/'),
        username,
        post_id
    )
}

pub fn profile_url(base_url: &str, username: &str) -> String {
    format!("{}/explore/{}", base_url.trim_end_matches('/'), username)
}

/// Swap the `w=<n>` width parameter for `w=<width>`. URLs without one come
/// back unchanged.
pub fn replace_width_param(url: &str, width: u32) -> String {
    WIDTH_PARAM_RE
        .replace(url, format!("w={width}").as_str())
        .into_owned()
}

/// Decode the handful of entities that show up inside attribute values.
pub(crate) fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
