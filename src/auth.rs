use crate::schemas::UserId;
use actix_web::{http::header::HeaderValue, HttpRequest};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

// The dashboard sends `Authorization: <userId>:<hex signature>` where the
// signature is an HMAC-SHA256 of the user id keyed by SHA-256(secret).
pub fn authenticate(request: &HttpRequest, secret: &str) -> Option<UserId> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?;
    let (user_id, signature) = authorization.trim().rsplit_once(':')?;
    if user_id.is_empty() {
        return None;
    }
    let signature = hex::decode(signature).ok()?;
    hasher(secret, user_id).verify_slice(&signature).ok()?;
    Some(user_id.to_string())
}

/// Token a client presents for `user_id`.
pub fn token(user_id: &str, secret: &str) -> String {
    let signature = hasher(secret, user_id).finalize().into_bytes();
    format!("{}:{}", user_id, hex::encode(signature))
}

fn hasher(secret: &str, user_id: &str) -> HmacSha256 {
    let mut sha256_hasher = Sha256::new();
    sha256_hasher.update(secret.as_bytes());
    let secret_hash = sha256_hasher.finalize();

    let mut hmac_hasher = HmacSha256::new_from_slice(&secret_hash).unwrap();
    hmac_hasher.update(user_id.as_bytes());
    hmac_hasher
}
