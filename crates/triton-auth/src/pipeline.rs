// ABOUTME: Applies date and Authorization headers to outbound HTTP requests.
// ABOUTME: Signs exactly the date value that is transmitted with the request.

use crate::error::{AuthError, Result};
use crate::signer::Signer;
use chrono::{DateTime, Utc};
use http::header::{HeaderName, HeaderValue, AUTHORIZATION, DATE};
use http::HeaderMap;

/// Format a timestamp as an RFC 1123 `date` header value in GMT.
pub fn rfc1123_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Set `date` to `at` and `Authorization` to its signature.
///
/// Call after every other header is final. Only the `date` value is
/// covered by the signature, and it is inserted byte-for-byte as signed.
/// On error `headers` is left unchanged.
///
/// # Errors
/// Returns the signer's error, or `AuthError::InvalidHeader` if a value
/// cannot be carried in an HTTP header.
pub fn authorize_headers<S>(signer: &S, headers: &mut HeaderMap, at: DateTime<Utc>) -> Result<()>
where
    S: Signer + ?Sized,
{
    let date = rfc1123_date(at);
    let authorization = signer.sign(&date)?;

    let date = header_value(&DATE, &date)?;
    let authorization = header_value(&AUTHORIZATION, &authorization)?;
    headers.insert(DATE, date);
    headers.insert(AUTHORIZATION, authorization);
    Ok(())
}

/// Sign an outbound request with the current time.
///
/// # Errors
/// As [`authorize_headers`].
pub fn sign_request<S, B>(signer: &S, request: &mut http::Request<B>) -> Result<()>
where
    S: Signer + ?Sized,
{
    authorize_headers(signer, request.headers_mut(), Utc::now())
}

fn header_value(name: &HeaderName, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| AuthError::InvalidHeader {
        header: name.to_string(),
        message: e.to_string(),
    })
}
