use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// hex(HMAC-SHA256(secret, query_string)) appended as `signature`.
pub fn sign_query(secret: &str, query: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference vector from the venue's API documentation.
    const SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
    const QUERY: &str = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
    const EXPECTED: &str = "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71";

    #[test]
    fn test_documented_vector() {
        assert_eq!(sign_query(SECRET, QUERY), EXPECTED);
    }

    #[test]
    fn test_sign_varies_with_query() {
        let a = sign_query("secret", "timestamp=1");
        let b = sign_query("secret", "timestamp=2");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
