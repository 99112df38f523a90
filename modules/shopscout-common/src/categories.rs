/// Category slugs and their display names, in the order the site lists them.
pub const CATEGORIES: &[(&str, &str)] = &[
    ("ltkfindsunder50", "Finds Under $50"),
    ("ltkfindsunder100", "Finds Under $100"),
    ("ltksalealert", "Sale Alert"),
    ("ltkholiday", "Holiday"),
    ("ltkfamily", "Family"),
    ("ltkhome", "Home"),
    ("ltkbeauty", "Beauty"),
    ("ltkfit", "Fitness"),
    ("ltkworkwear", "Workwear"),
    ("ltktravel", "Travel"),
    ("ltkwedding", "Wedding"),
    ("ltkmens", "Mens"),
    ("ltkkids", "Kids"),
    ("ltkbaby", "Baby"),
    ("ltkeurope", "Europe"),
    ("ltkbrasil", "Brasil"),
];

pub const DEFAULT_CATEGORY: &str = "ltkfindsunder50";

/// Display name for a category slug. Slugs are matched case-insensitively.
pub fn category_name(slug: &str) -> Option<&'static str> {
    CATEGORIES
        .iter()
        .find(|(s, _)| s.eq_ignore_ascii_case(slug))
        .map(|(_, name)| *name)
}

/// Category listing page URL: `{base}/categories/{slug}`.
pub fn category_url(base_url: &str, slug: &str) -> String {
    format!("{}/categories/{}", base_url.trim_end_matches('/'), slug)
}
