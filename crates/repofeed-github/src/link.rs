//! `Link` header parsing.
//!
//! GitHub paginates with an RFC-5988 `Link` header, e.g.
//! `<https://api.github.com/user/69631/repos?page=2>; rel="next",
//! <https://api.github.com/user/69631/repos?page=34>; rel="last"`.
//! The total page count is the `page` query parameter of the
//! `rel="last"` URL.

use once_cell::sync::Lazy;
use regex::Regex;

/// Extract the `rel="last"` page number from a `Link` header value.
///
/// Returns `None` when the header carries no `last` relation or its URL
/// has no parseable `page` parameter; the caller falls back to its prior
/// total-page estimate.
pub fn parse_last_page(header: &str) -> Option<u32> {
    static LAST_SEGMENT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"<([^>]+)>\s*;[^,]*rel="last""#).unwrap());
    static PAGE_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]page=(\d+)").unwrap());

    let url = LAST_SEGMENT.captures(header)?.get(1)?.as_str();
    let page = PAGE_PARAM.captures(url)?.get(1)?.as_str();
    page.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_github_style_header() {
        let header = r#"<https://api.github.com/user/69631/repos?page=2&per_page=30>; rel="next", <https://api.github.com/user/69631/repos?page=34&per_page=30>; rel="last""#;
        assert_eq!(parse_last_page(header), Some(34));
    }

    #[test]
    fn parses_when_last_comes_first() {
        let header = r#"<https://api.github.com/repos?page=7>; rel="last", <https://api.github.com/repos?page=2>; rel="next""#;
        assert_eq!(parse_last_page(header), Some(7));
    }

    #[test]
    fn full_relation_set() {
        let header = r#"<https://x/repos?page=1>; rel="prev", <https://x/repos?page=3>; rel="next", <https://x/repos?page=9>; rel="last", <https://x/repos?page=1>; rel="first""#;
        assert_eq!(parse_last_page(header), Some(9));
    }

    #[test]
    fn no_last_relation() {
        let header = r#"<https://api.github.com/repos?page=2>; rel="next""#;
        assert_eq!(parse_last_page(header), None);
    }

    #[test]
    fn page_parameter_missing_from_last_url() {
        let header = r#"<https://api.github.com/repos?per_page=30>; rel="last""#;
        assert_eq!(parse_last_page(header), None);
    }

    #[test]
    fn garbage_header() {
        assert_eq!(parse_last_page("not a link header"), None);
        assert_eq!(parse_last_page(""), None);
    }

    #[test]
    fn page_value_out_of_range() {
        let header = r#"<https://x/repos?page=99999999999999999999>; rel="last""#;
        assert_eq!(parse_last_page(header), None);
    }
}
