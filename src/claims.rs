use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::Value as JsonValue;

use crate::error::Error;
use crate::types::UserClaims;

/// base64url that tolerates trailing `=` padding.
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes the claims payload of an identity token without verifying it.
///
/// Never fails: malformed input yields [`UserClaims::unknown`], so a bad
/// identity token can't block storing the access token it came with.
/// No signature, issuer or expiry checks are performed.
#[must_use]
pub fn decode_claims(identity_token: &str) -> UserClaims {
    match try_decode_claims(identity_token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to decode identity token, using placeholder claims");
            UserClaims::unknown()
        }
    }
}

pub(crate) fn try_decode_claims(identity_token: &str) -> Result<UserClaims, Error> {
    let parts: Vec<&str> = identity_token.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::MalformedToken(format!(
            "expected 3 segments, got {}",
            parts.len()
        )));
    }

    // Some issuers emit the standard alphabet; map it onto url-safe.
    let payload_b64 = parts[1].replace('+', "-").replace('/', "_");
    let payload = LENIENT_URL_SAFE
        .decode(payload_b64)
        .map_err(|e| Error::MalformedToken(format!("invalid base64: {e}")))?;

    let json: JsonValue = serde_json::from_slice(&payload)
        .map_err(|e| Error::MalformedToken(format!("invalid payload: {e}")))?;
    let object = json
        .as_object()
        .ok_or_else(|| Error::MalformedToken("payload is not an object".into()))?;

    let text = |key: &str| {
        object
            .get(key)
            .and_then(JsonValue::as_str)
            .map(str::to_owned)
    };

    let mut claims = UserClaims::new(text("sub").unwrap_or_default());
    claims.email = text("email");
    claims.name = text("name");
    claims.given_name = text("given_name");
    claims.family_name = text("family_name");
    claims.picture_url = text("picture");
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

    use super::*;

    fn token_with(payload: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload);
        format!("{header}.{body}.signature")
    }

    #[test]
    fn decodes_standard_claims() {
        let token = token_with(
            r#"{"sub":"u1","email":"a@b.com","name":"Ada Lovelace","given_name":"Ada","family_name":"Lovelace","picture":"https://img/u1.png"}"#,
        );
        let claims = decode_claims(&token);

        assert_eq!(claims.subject.as_str(), "u1");
        assert_eq!(claims.email.as_deref(), Some("a@b.com"));
        assert_eq!(claims.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(claims.given_name.as_deref(), Some("Ada"));
        assert_eq!(claims.family_name.as_deref(), Some("Lovelace"));
        assert_eq!(claims.picture_url.as_deref(), Some("https://img/u1.png"));
    }

    #[test]
    fn absent_claims_stay_absent() {
        let claims = decode_claims(&token_with(r#"{"sub":"u1"}"#));
        assert_eq!(claims, UserClaims::new("u1"));
    }

    #[test]
    fn missing_sub_yields_empty_subject() {
        let claims = decode_claims(&token_with(r#"{"email":"a@b.com"}"#));
        assert!(claims.subject.is_empty());
        assert_eq!(claims.email.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn non_string_claims_are_ignored() {
        let claims = decode_claims(&token_with(r#"{"sub":"u1","email":42,"name":null}"#));
        assert_eq!(claims, UserClaims::new("u1"));
    }

    #[test]
    fn accepts_padded_and_standard_alphabet_payloads() {
        let header = URL_SAFE_NO_PAD.encode("{}");
        // 'sub' chosen so the standard encoding contains '+' or '/' and padding.
        let body = STANDARD.encode(r#"{"sub":"??>>"}"#);
        let claims = decode_claims(&format!("{header}.{body}.sig"));
        assert_eq!(claims.subject.as_str(), "??>>");
    }

    #[test]
    fn wrong_segment_count_is_unknown() {
        for token in ["", "onlyone", "two.parts", "a.b.c.d"] {
            assert_eq!(decode_claims(token), UserClaims::unknown(), "token {token:?}");
        }
    }

    #[test]
    fn invalid_base64_is_unknown() {
        assert_eq!(decode_claims("aGVhZGVy.!!!not-base64!!!.sig"), UserClaims::unknown());
    }

    #[test]
    fn non_json_payload_is_unknown() {
        let header = URL_SAFE_NO_PAD.encode("{}");
        let body = URL_SAFE_NO_PAD.encode("definitely not json");
        assert_eq!(decode_claims(&format!("{header}.{body}.sig")), UserClaims::unknown());
    }

    #[test]
    fn non_object_payload_is_unknown() {
        assert_eq!(decode_claims(&token_with("[1,2,3]")), UserClaims::unknown());
    }

    #[test]
    fn fallible_decode_reports_reason() {
        let err = try_decode_claims("a.b").unwrap_err();
        assert!(matches!(err, Error::MalformedToken(ref m) if m.contains("3 segments")));
    }
}
