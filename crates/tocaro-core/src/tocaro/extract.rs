//! Token scraping from Tocaro HTML pages.
//!
//! Sign-in needs two values that only exist inside HTML:
//! 1. The CSRF `authenticity_token` input of the sign-in form
//! 2. The API bearer token, embedded in the `bootData` script assignment of
//!    the page served after a successful sign-in
//!
//! Both are plain functions over text so they can be tested without a server.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};

use crate::CoreError;

/// Selector for the inputs of the sign-in form.
pub const SIGN_IN_FORM_INPUTS: &str = ".submitOnce input";

/// Name of the CSRF input.
pub const CSRF_FIELD: &str = "authenticity_token";

/// JSON pointer to the bearer token inside `bootData`.
pub const BEARER_TOKEN_POINTER: &str = "/currentUser/credentials/tocaro/token";

#[expect(clippy::expect_used, reason = "constant pattern always compiles")]
static BOOT_DATA_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"var\s+bootData\s*=\s*(.*)$").expect("valid bootData pattern"));

/// Extract the CSRF token from the sign-in page.
///
/// The first `authenticity_token` input inside the `.submitOnce` form wins.
///
/// # Errors
///
/// Returns [`CoreError::CsrfTokenNotFound`] if no such input exists or it
/// carries no `value` attribute.
pub fn extract_csrf_token(html: &str) -> Result<String, CoreError> {
    let selector = Selector::parse(SIGN_IN_FORM_INPUTS)
        .map_err(|e| CoreError::CsrfTokenNotFound(format!("invalid selector: {e:?}")))?;
    let document = Html::parse_document(html);

    let input = document
        .select(&selector)
        .find(|el| el.value().attr("name") == Some(CSRF_FIELD))
        .ok_or_else(|| {
            CoreError::CsrfTokenNotFound(format!("no {CSRF_FIELD} input in sign-in form"))
        })?;

    input
        .value()
        .attr("value")
        .map(ToString::to_string)
        .ok_or_else(|| CoreError::CsrfTokenNotFound(format!("{CSRF_FIELD} input has no value")))
}

/// Extract the bearer token from the `var bootData = {...}` line of a page.
///
/// Returns `Ok(None)` when no line assigns `bootData`; the caller decides
/// whether that is fatal.
///
/// # Errors
///
/// Returns [`CoreError::Serialization`] if the assigned literal is not valid
/// JSON, and [`CoreError::AuthTokenNotFound`] if it lacks
/// `currentUser.credentials.tocaro.token`.
pub fn extract_bearer_token(body: &str) -> Result<Option<String>, CoreError> {
    for line in body.lines() {
        let Some(caps) = BOOT_DATA_LINE.captures(line) else {
            continue;
        };
        let literal = caps.get(1).map_or("", |m| m.as_str()).trim();
        let literal = literal.strip_suffix(';').unwrap_or(literal).trim_end();

        let boot_data: Value = serde_json::from_str(literal)
            .map_err(|e| CoreError::Serialization(format!("parsing bootData: {e}")))?;
        log::debug!(
            "found bootData with {} top-level keys",
            boot_data.as_object().map_or(0, Map::len)
        );

        return boot_data
            .pointer(BEARER_TOKEN_POINTER)
            .and_then(Value::as_str)
            .map(|token| Some(token.to_string()))
            .ok_or_else(|| {
                CoreError::AuthTokenNotFound(
                    "bootData has no currentUser.credentials.tocaro.token".to_string(),
                )
            });
    }

    Ok(None)
}
