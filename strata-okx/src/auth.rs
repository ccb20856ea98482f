use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

type HmacSha256 = Hmac<Sha256>;

/// ISO-8601 timestamp with millisecond precision, the form OKX REST wants
/// in `OK-ACCESS-TIMESTAMP`.
pub fn rest_timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    // Truncate to milliseconds before formatting.
    let truncated = now
        .replace_nanosecond((now.nanosecond() / 1_000_000) * 1_000_000)
        .expect("valid nanosecond");
    truncated.format(&Rfc3339).expect("timestamp formats")
}

/// Epoch seconds as a string, the form the WS login op wants.
pub fn ws_timestamp() -> String {
    OffsetDateTime::now_utc().unix_timestamp().to_string()
}

/// base64(HMAC-SHA256(secret, timestamp + method + path + body)).
pub fn sign(secret: &str, timestamp: &str, method: &str, path: &str, body: &str) -> String {
    let prehash = format!("{}{}{}{}", timestamp, method, path, body);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(prehash.as_bytes());
    general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// WS login signature: the path is fixed at `/users/self/verify`.
pub fn sign_ws_login(secret: &str, timestamp: &str) -> String {
    sign(secret, timestamp, "GET", "/users/self/verify", "")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "mysecret";
    const TS: &str = "2024-01-02T03:04:05.678Z";

    #[test]
    fn test_sign_is_deterministic() {
        let a = sign(SECRET, TS, "GET", "/api/v5/account/balance", "");
        let b = sign(SECRET, TS, "GET", "/api/v5/account/balance", "");
        assert_eq!(a, b);
    }

    #[test]
    fn test_sign_is_valid_base64_of_32_bytes() {
        let sig = sign(SECRET, TS, "POST", "/api/v5/trade/order", r#"{"instId":"BTC-USDT-SWAP"}"#);
        let raw = general_purpose::STANDARD.decode(&sig).unwrap();
        assert_eq!(raw.len(), 32);
    }

    #[test]
    fn test_sign_varies_with_inputs() {
        let base = sign(SECRET, TS, "GET", "/api/v5/account/balance", "");
        assert_ne!(base, sign(SECRET, TS, "POST", "/api/v5/account/balance", ""));
        assert_ne!(base, sign(SECRET, TS, "GET", "/api/v5/account/positions", ""));
        assert_ne!(base, sign("other", TS, "GET", "/api/v5/account/balance", ""));
    }

    #[test]
    fn test_ws_login_uses_verify_path() {
        let direct = sign(SECRET, "1690000000", "GET", "/users/self/verify", "");
        assert_eq!(sign_ws_login(SECRET, "1690000000"), direct);
    }

    #[test]
    fn test_rest_timestamp_shape() {
        let ts = rest_timestamp();
        // 2024-01-02T03:04:05.678Z
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
    }
}
