// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// Resolve a potentially relative URL against a base URL.
///
/// # Examples
/// ```
/// use quake_crawler::utils::url::resolve;
///
/// assert_eq!(
///     resolve("https://www.weather.go.kr", "/repositary/image/eqk/img/a.png"),
///     "https://www.weather.go.kr/repositary/image/eqk/img/a.png"
/// );
/// ```
pub fn resolve(base: &str, href: &str) -> String {
    Url::parse(base)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Drop `;jsessionid=...` style path parameters from a link.
pub fn strip_path_params(href: &str) -> &str {
    href.split(';').next().unwrap_or(href)
}

/// Last path segment of a URL, ignoring any query string.
pub fn file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    path.rsplit('/').next().filter(|name| !name.is_empty())
}
