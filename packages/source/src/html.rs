//! Small helpers shared by the HTML listers.

use reqwest::Url;
use scraper::{ElementRef, Selector};

use crate::ListingError;

/// Parses a CSS selector.
///
/// # Errors
///
/// Returns [`ListingError::Pattern`] if `css` is not a valid selector.
pub fn selector(css: &str) -> Result<Selector, ListingError> {
    Selector::parse(css).map_err(|e| ListingError::Pattern {
        pattern: css.to_string(),
        message: e.to_string(),
    })
}

/// Resolves `href` against `base`, like a browser would.
///
/// # Errors
///
/// Returns [`ListingError::Pattern`] if either URL is malformed.
pub fn join(base: &str, href: &str) -> Result<String, ListingError> {
    let base_url = Url::parse(base).map_err(|e| ListingError::Pattern {
        pattern: base.to_string(),
        message: e.to_string(),
    })?;
    base_url
        .join(href.trim())
        .map(|u| u.to_string())
        .map_err(|e| ListingError::Pattern {
            pattern: href.to_string(),
            message: e.to_string(),
        })
}

/// Whitespace-collapsed text content of an element.
#[must_use]
pub fn text_of(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
