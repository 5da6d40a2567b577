// src/utils/serialization.rs
//! Encoding helpers for the passport pipeline.
//!
//! Provides:
//! - `application/x-www-form-urlencoded` encoding of identifiers
//! - `{placeholder}` URL template expansion
//! - base64url decoding of JWK key material

use url::form_urlencoded;

/// Form-URL-encodes a string (spaces become `+`).
///
/// # Example
/// ```
/// use ga4gh_passport::utils::serialization::form_urlencode;
/// assert_eq!(form_urlencode("a b@c"), "a+b%40c");
/// ```
pub fn form_urlencode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Expands `{name}` placeholders in a URL template.
///
/// Values are form-URL-encoded. Unknown placeholders are left untouched.
///
/// # Arguments
/// * `template` - URL containing `{name}` placeholders
/// * `variables` - Placeholder name and raw value pairs
pub fn expand_template(template: &str, variables: &[(&str, &str)]) -> String {
    variables.iter().fold(template.to_string(), |url, (name, value)| {
        url.replace(&format!("{{{}}}", name), &form_urlencode(value))
    })
}

/// Decodes base64url (with or without padding) into raw bytes.
///
/// # Returns
/// - `Ok(bytes)` on success
/// - `Err(base64::DecodeError)` if the input is not valid base64url
pub fn decode_base64url(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::decode_config(data.trim_end_matches('='), base64::URL_SAFE_NO_PAD)
}
