//! Parsing of session cookies given on the command line or in API queries.

use ferry_engine::Cookies;

use crate::error::{AppError, Result};

/// Parse `name=value` pairs. Each item may itself hold a `; `-separated list, the way a
/// browser's `Cookie` header reads.
pub fn parse_cookies<I, S>(items: I) -> Result<Cookies>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut cookies = Cookies::new();
    for item in items {
        for pair in item.as_ref().split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (name, value) = pair
                .split_once('=')
                .map(|(name, value)| (name.trim(), value.trim()))
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| AppError::InvalidCookie(pair.to_owned()))?;
            cookies.insert(name.to_owned(), value.to_owned());
        }
    }
    Ok(cookies)
}

/// Parse a `cookies` query parameter: either a JSON object or a `Cookie` header string.
pub fn parse_cookie_param(raw: &str) -> Result<Cookies> {
    let raw = raw.trim();
    if raw.starts_with('{') {
        serde_json::from_str(raw)
            .map_err(|e| AppError::InvalidArgument(format!("invalid cookies JSON: {e}")))
    } else {
        parse_cookies([raw])
    }
}
