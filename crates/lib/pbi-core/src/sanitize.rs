//! Query cleanup applied before anything reaches the driver.

use std::sync::LazyLock;

use regex::Regex;

/// Matches an opening, closing, or self-closing markup tag. A tag name must
/// follow the `<` directly and attributes must be `name=value` pairs, so
/// comparisons such as `[Amount]<Limit && [Qty]>0` never match.
static MARKUP_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"</?[A-Za-z][A-Za-z0-9_:.-]*(?:\s+[A-Za-z_:][A-Za-z0-9_:.-]*\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'<>=]+))*\s*/?>"#,
    )
    .expect("valid markup pattern")
});

/// Strips markup tags from `query` and collapses whitespace runs.
#[must_use]
pub fn sanitize(query: &str) -> String {
    let stripped = MARKUP_TAG.replace_all(query, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
