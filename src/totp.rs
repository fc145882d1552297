//! # TOTP
//!
//! Time-based one-time codes for unattended check-in verification.
//!
//! A member enrolls an authenticator app once (see the `/qr` provisioning
//! route), then proves physical presence by submitting the 6-digit code the
//! app currently shows. Codes are derived from a shared Base32 secret and
//! the current 30-second time step, so the server can recompute and compare
//! without any per-attempt state.
//!
//! ## Scheme
//!
//! - Counter = `unix_seconds / period`, HMAC-SHA1 over the counter as an
//!   8-byte big-endian integer, keyed with the decoded secret
//! - Dynamic truncation: the low nibble of the last digest byte picks a
//!   4-byte window, the high bit is masked, the value is reduced modulo
//!   `10^digits` and zero-padded
//! - Verification tolerates `window` steps of clock drift in either
//!   direction and compares candidate codes in constant time
//!
//! Secrets are generated from the OS CSPRNG and never from a seeded or
//! thread-local generator.

use hmac::{Hmac, Mac};
use rand::{Rng, rngs::OsRng};
use sha1::Sha1;
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;

pub const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

#[derive(Debug, Clone)]
pub struct TotpConfig {
    /// Seconds per time step.
    pub period: u64,
    /// Code length.
    pub digits: u32,
    /// Accepted clock drift, in steps either side of the current one.
    pub window: u64,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            period: 30,
            digits: 6,
            window: 1,
        }
    }
}

/// Decodes an RFC 4648 Base32 secret. Characters outside the uppercase
/// alphabet are skipped, decoding stops at the first `=`.
pub fn decode_base32(encoded: &str) -> Vec<u8> {
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;
    let mut decoded = Vec::with_capacity(encoded.len() * 5 / 8);

    for byte in encoded.bytes() {
        if byte == b'=' {
            break;
        }
        let Some(value) = BASE32_ALPHABET.iter().position(|&symbol| symbol == byte) else {
            continue;
        };

        buffer = (buffer << 5) | value as u32;
        bits += 5;

        if bits >= 8 {
            bits -= 8;
            decoded.push((buffer >> bits) as u8);
        }
    }

    decoded
}

/// Draws `length` symbols uniformly from the Base32 alphabet using the OS
/// random source.
pub fn generate_secret(length: usize) -> String {
    let mut rng = OsRng;

    (0..length)
        .map(|_| BASE32_ALPHABET[rng.gen_range(0..BASE32_ALPHABET.len())] as char)
        .collect()
}

pub fn generate(secret: &str, timestamp: u64, config: &TotpConfig) -> String {
    hotp(&decode_base32(secret), timestamp / config.period, config.digits)
}

/// Accepts `submitted` if it matches the code for any counter within
/// `window` steps of `timestamp`. An empty or undecodable secret and a
/// wrong-length or non-digit code are non-matches, never errors.
pub fn verify(secret: &str, submitted: &str, timestamp: u64, config: &TotpConfig) -> bool {
    let key = decode_base32(secret);
    if key.is_empty() {
        return false;
    }
    if submitted.len() != config.digits as usize
        || !submitted.bytes().all(|byte| byte.is_ascii_digit())
    {
        return false;
    }

    let counter = timestamp / config.period;
    let first = counter.saturating_sub(config.window);
    let last = counter.saturating_add(config.window);

    let mut matched = false;
    for candidate in first..=last {
        let code = hotp(&key, candidate, config.digits);
        matched |= bool::from(code.as_bytes().ct_eq(submitted.as_bytes()));
    }

    matched
}

/// `otpauth://` payload consumed by authenticator apps when scanning the
/// provisioning QR.
pub fn provisioning_uri(secret: &str, account: &str, issuer: &str, config: &TotpConfig) -> String {
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={}&period={}",
        config.digits, config.period
    )
}

fn hotp(key: &[u8], counter: u64, digits: u32) -> String {
    // HMAC accepts keys of any length, including empty ones.
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    let code = binary % 10u32.pow(digits);
    format!("{code:0width$}", width = digits as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    // "12345678901234567890", the RFC 4226 appendix secret.
    const REFERENCE_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_hotp_reference_values() {
        let key = b"12345678901234567890";
        let expected = [
            "755224", "287082", "359152", "969429", "338314", "254676", "287922", "162583",
            "399871", "520489",
        ];

        for (counter, want) in expected.iter().enumerate() {
            assert_eq!(hotp(key, counter as u64, 6), *want);
        }
    }

    #[test]
    fn test_totp_reference_value() {
        // Time 59 falls in the second 30s step, counter 1.
        let config = TotpConfig::default();
        assert_eq!(generate(REFERENCE_SECRET, 59, &config), "287082");
    }

    #[test]
    fn test_base32_decode() {
        assert_eq!(decode_base32(REFERENCE_SECRET), b"12345678901234567890");
        assert_eq!(decode_base32(""), b"");
    }

    #[test]
    fn test_base32_skips_foreign_symbols() {
        assert_eq!(decode_base32("GE ZD-GN!bV"), decode_base32("GEZDGNV"));
        assert_eq!(decode_base32("GEZD=GNBV"), decode_base32("GEZD"));
    }

    #[test]
    fn test_decoded_and_encoded_secrets_agree() {
        let config = TotpConfig::default();
        let secret = generate_secret(16);
        let key = decode_base32(&secret);

        for timestamp in [0, 29, 30, 1_700_000_000] {
            assert_eq!(
                generate(&secret, timestamp, &config),
                hotp(&key, timestamp / config.period, config.digits)
            );
        }
    }

    #[test]
    fn test_generate_is_deterministic() {
        let config = TotpConfig::default();
        let secret = generate_secret(32);
        assert_eq!(
            generate(&secret, 1_700_000_000, &config),
            generate(&secret, 1_700_000_000, &config)
        );
    }

    #[test]
    fn test_round_trip() {
        let config = TotpConfig::default();
        let secret = generate_secret(32);

        for timestamp in [0, 29, 30, 59, 1_700_000_000] {
            let code = generate(&secret, timestamp, &config);
            assert!(verify(&secret, &code, timestamp, &config));
        }
    }

    #[test]
    fn test_verify_window_boundaries() {
        let config = TotpConfig::default();
        // Code for counter 3.
        let code = generate(REFERENCE_SECRET, 90, &config);

        assert!(verify(REFERENCE_SECRET, &code, 60, &config)); // counter 2
        assert!(verify(REFERENCE_SECRET, &code, 149, &config)); // counter 4
        assert!(!verify(REFERENCE_SECRET, &code, 59, &config)); // counter 1, two steps out
        assert!(!verify(REFERENCE_SECRET, &code, 150, &config)); // counter 5, two steps out
    }

    #[test]
    fn test_enrollment_scenario() {
        let config = TotpConfig::default();
        let secret = "JBSWY3DPEHPK3PXP";

        let code = generate(secret, 0, &config);
        assert!(verify(secret, &code, 0, &config));
        assert!(!verify(secret, &code, 61, &config));
    }

    #[test]
    fn test_malformed_inputs_never_verify() {
        let config = TotpConfig::default();
        let secret = generate_secret(32);
        let code = generate(&secret, 0, &config);

        assert!(!verify("", &code, 0, &config));
        assert!(!verify("!!!!", &code, 0, &config));
        assert!(!verify(&secret, "12345", 0, &config));
        assert!(!verify(&secret, "1234567", 0, &config));
        assert!(!verify(&secret, "12a456", 0, &config));
        assert!(!verify(&secret, "", 0, &config));
    }

    #[test]
    fn test_generated_secrets_stay_in_alphabet() {
        let secret = generate_secret(32);
        assert_eq!(secret.len(), 32);
        assert!(secret.bytes().all(|byte| BASE32_ALPHABET.contains(&byte)));
    }
}
