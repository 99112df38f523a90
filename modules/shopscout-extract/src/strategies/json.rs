// Field readers for loosely-shaped upstream JSON. Every reader takes a list
// of candidate keys and returns the first usable value, so each strategy can
// state its fallback chain inline.

use serde_json::Value;
use shopscout_common::{non_empty, LooseRef, PostFields, ProductFields, ProfileFields};

use crate::patterns::username_from_url;
use crate::text::normalize_tag;

/// First non-blank string (or number, rendered as a string) among `keys`.
/// A key starting with `/` is read as a JSON pointer into `value`.
pub(crate) fn str_at(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| scalar_string(lookup(value, key)?))
}

pub(crate) fn num_at(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match lookup(value, key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_price(s),
        _ => None,
    })
}

/// First array among `keys`, empty arrays included.
pub(crate) fn array_at<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter().find_map(|key| lookup(value, key)?.as_array())
}

fn lookup<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    if key.starts_with('/') {
        value.pointer(key)
    } else {
        value.get(key)
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(Some(s.as_str())),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Prices arrive as numbers or as display strings like `"$1,299.00"`.
fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().ok()
}

/// Strings in an array, or the `url` of each object in it.
fn url_list(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => non_empty(Some(s.as_str())),
            Value::Object(_) => str_at(item, &["url", "src"]),
            _ => None,
        })
        .collect()
}

/// URLs of `media[]` entries whose `type` matches.
fn media_of_type(item: &Value, kind: &str) -> Vec<String> {
    array_at(item, &["media"])
        .map(|media| {
            media
                .iter()
                .filter(|m| {
                    m.get("type")
                        .and_then(Value::as_str)
                        .is_some_and(|t| t.eq_ignore_ascii_case(kind))
                })
                .filter_map(|m| str_at(m, &["url", "src"]))
                .collect()
        })
        .unwrap_or_default()
}

// --- Record readers ---

pub(crate) fn post_from_json(item: &Value) -> PostFields {
    let image_urls = match array_at(item, &["images"]) {
        Some(images) => url_list(images),
        None => media_of_type(item, "image"),
    };

    let hero_image_url = str_at(item, &["hero_image", "image_url", "/media/0/url"])
        .or_else(|| image_urls.first().cloned());

    let video_url = str_at(item, &["video_url", "video_media_url"])
        .or_else(|| media_of_type(item, "video").into_iter().next());

    let products = array_at(item, &["products", "product_links"])
        .map(|items| {
            items
                .iter()
                .filter(|p| p.is_object())
                .map(product_from_json)
                .collect()
        })
        .unwrap_or_default();

    let hashtags = array_at(item, &["hashtags"])
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .filter_map(normalize_tag)
                .collect()
        })
        .unwrap_or_default();

    PostFields {
        post_id: str_at(item, &["id", "post_id"]),
        post_url: str_at(item, &["url", "ltk_url", "share_url"]),
        caption: str_at(item, &["caption", "description"]),
        hashtags,
        creator_username: str_at(item, &["/creator/username", "username"]),
        creator_avatar_url: str_at(item, &["/creator/avatar_url", "avatar_url"]),
        hero_image_url,
        image_urls,
        video_url,
        products,
        published_at: str_at(item, &["published_at", "created_at", "date_created"]),
    }
}

/// Loose references a structured post object carries: the creator's profile
/// id, the creator's username (stated or read off the permalink) and the
/// ids of the products it lists.
pub(crate) fn post_refs(item: &Value, fields: &PostFields) -> Vec<LooseRef> {
    let mut refs = Vec::new();
    if let Some(id) = str_at(item, &["/creator/id", "profile_id"]) {
        refs.push(LooseRef::ProfileId(id));
    }
    let username = fields
        .creator_username
        .clone()
        .or_else(|| fields.post_url.as_deref().and_then(username_from_url));
    if let Some(name) = username {
        refs.push(LooseRef::Username(name));
    }
    if let Some(ids) = array_at(item, &["product_ids"]) {
        refs.extend(ids.iter().filter_map(scalar_string).map(LooseRef::ProductId));
    }
    refs
}

pub(crate) fn profile_from_json(item: &Value) -> ProfileFields {
    ProfileFields {
        id: str_at(item, &["id"]),
        username: str_at(item, &["username"]),
        display_name: str_at(item, &["display_name", "full_name"]),
        avatar_url: str_at(item, &["avatar_url"]),
        profile_url: str_at(item, &["profile_url", "url"]),
    }
}

pub(crate) fn product_from_json(item: &Value) -> ProductFields {
    ProductFields {
        id: str_at(item, &["id"]),
        title: str_at(item, &["title", "name"]),
        brand: str_at(item, &["brand", "retailer_display_name"]),
        price: num_at(item, &["price", "sale_price"]),
        url: str_at(item, &["url", "hyperlink", "link"]),
        image_url: str_at(item, &["image_url", "image"]),
    }
}
