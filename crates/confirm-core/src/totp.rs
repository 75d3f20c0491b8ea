//! Time-based one-time passwords (RFC 6238 over HMAC-SHA1, RFC 4226 truncation).

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use time::OffsetDateTime;

use crate::error::{CoreError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Time step used for patient PIN reset codes (30 minutes).
pub const PIN_RESET_TIME_STEP: u64 = 1800;
/// Digits in a patient PIN reset code.
pub const PIN_RESET_DIGITS: u32 = 9;

/// A password produced for a given instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpValue {
    pub timestamp: i64,
    pub otp: String,
}

impl TotpValue {
    /// The code split in groups of three, e.g. `123-456-789`.
    pub fn grouped(&self) -> String {
        let digits: Vec<char> = self.otp.chars().collect();
        digits
            .chunks(3)
            .map(|chunk| chunk.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("-")
    }
}

#[derive(Clone)]
pub struct Totp {
    secret: Vec<u8>,
    time_step: u64,
    start_time: i64,
    digits: u32,
}

impl std::fmt::Debug for Totp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Totp")
            .field("secret", &"***")
            .field("time_step", &self.time_step)
            .field("start_time", &self.start_time)
            .field("digits", &self.digits)
            .finish()
    }
}

impl Totp {
    pub fn new(
        secret: impl AsRef<[u8]>,
        time_step: u64,
        start_time: i64,
        digits: u32,
    ) -> Result<Self> {
        if time_step == 0 {
            return Err(CoreError::configuration("TOTP time step must be > 0"));
        }
        if !(1..=10).contains(&digits) {
            return Err(CoreError::configuration("TOTP digits must be within 1..=10"));
        }
        Ok(Self {
            secret: secret.as_ref().to_vec(),
            time_step,
            start_time,
            digits,
        })
    }

    /// Generator for a patient PIN reset: secret is `userId ∥ imei ∥ userId`.
    pub fn pin_reset(user_id: &str, imei: &str) -> Self {
        Self {
            secret: format!("{user_id}{imei}{user_id}").into_bytes(),
            time_step: PIN_RESET_TIME_STEP,
            start_time: 0,
            digits: PIN_RESET_DIGITS,
        }
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// `floor((unixSeconds - startTime) / timeStep)`, zero before `startTime`.
    pub fn counter(&self, unix_seconds: i64) -> u64 {
        let elapsed = unix_seconds.saturating_sub(self.start_time);
        if elapsed <= 0 {
            return 0;
        }
        elapsed as u64 / self.time_step
    }

    pub fn at(&self, ts: OffsetDateTime) -> TotpValue {
        let timestamp = ts.unix_timestamp();
        TotpValue {
            timestamp,
            otp: self.hotp(self.counter(timestamp)),
        }
    }

    pub fn now(&self) -> TotpValue {
        self.at(OffsetDateTime::now_utc())
    }

    /// Checks a submitted code against the current step and its neighbours.
    pub fn verify(&self, otp: &str, ts: OffsetDateTime, skew_steps: u64) -> bool {
        let counter = self.counter(ts.unix_timestamp());
        let low = counter.saturating_sub(skew_steps);
        (low..=counter + skew_steps).any(|c| self.hotp(c) == otp)
    }

    fn hotp(&self, counter: u64) -> String {
        let mut mac =
            HmacSha1::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(&counter.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let code = u32::from_be_bytes([
            digest[offset] & 0x7f,
            digest[offset + 1],
            digest[offset + 2],
            digest[offset + 3],
        ]);
        let modulus = 10u64.pow(self.digits);
        format!(
            "{:0width$}",
            u64::from(code) % modulus,
            width = self.digits as usize
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_SECRET: &[u8] = b"12345678901234567890";

    fn at_unix(totp: &Totp, unix: i64) -> String {
        totp.at(OffsetDateTime::from_unix_timestamp(unix).unwrap()).otp
    }

    #[test]
    fn rfc4226_hotp_vectors() {
        let totp = Totp::new(RFC_SECRET, 1, 0, 6).unwrap();
        let expected = [
            "755224", "287082", "359152", "969429", "338314", "254676", "287922", "162583",
            "399871", "520489",
        ];
        for (counter, otp) in expected.iter().enumerate() {
            assert_eq!(&totp.hotp(counter as u64), otp);
        }
    }

    #[test]
    fn rfc6238_sha1_vectors() {
        let totp = Totp::new(RFC_SECRET, 30, 0, 8).unwrap();
        assert_eq!(at_unix(&totp, 59), "94287082");
        assert_eq!(at_unix(&totp, 1_111_111_109), "07081804");
        assert_eq!(at_unix(&totp, 1_111_111_111), "14050471");
        assert_eq!(at_unix(&totp, 1_234_567_890), "89005924");
        assert_eq!(at_unix(&totp, 2_000_000_000), "69279037");
        assert_eq!(at_unix(&totp, 20_000_000_000), "65353130");
    }

    #[test]
    fn output_is_zero_padded_to_digit_count() {
        for digits in 1..=10 {
            let totp = Totp::new(b"secret", 30, 0, digits).unwrap();
            for t in [0i64, 29, 30, 1_700_000_000] {
                let otp = at_unix(&totp, t);
                assert_eq!(otp.len(), digits as usize);
                assert!(otp.chars().all(|c| c.is_ascii_digit()));
            }
        }
    }

    #[test]
    fn counter_honours_start_time() {
        let totp = Totp::new(b"s", 30, 100, 6).unwrap();
        assert_eq!(totp.counter(50), 0);
        assert_eq!(totp.counter(129), 0);
        assert_eq!(totp.counter(130), 1);
    }

    #[test]
    fn pin_reset_codes_match_explicit_generator() {
        let ts = OffsetDateTime::from_unix_timestamp(1_700_000_123).unwrap();
        let pin = Totp::pin_reset("P", "123456789012345").at(ts);
        let explicit = Totp::new("P123456789012345P", 1800, 0, 9).unwrap().at(ts);
        assert_eq!(pin, explicit);
        assert_eq!(pin.otp.len(), 9);
    }

    #[test]
    fn neighbouring_steps_differ() {
        let totp = Totp::pin_reset("P", "123456789012345");
        let t = 1_700_000_000;
        let a = at_unix(&totp, t);
        let b = at_unix(&totp, t + 1800);
        let c = at_unix(&totp, t - 1800);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn grouped_format() {
        let v = TotpValue {
            timestamp: 0,
            otp: "012345678".into(),
        };
        assert_eq!(v.grouped(), "012-345-678");
    }

    #[test]
    fn verify_accepts_adjacent_step() {
        let totp = Totp::pin_reset("P", "123");
        let t = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let code = totp.at(t).otp;
        assert!(totp.verify(&code, t + time::Duration::seconds(1800), 1));
        assert!(!totp.verify(&code, t + time::Duration::seconds(3 * 1800), 1));
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(Totp::new(b"s", 0, 0, 6).is_err());
        assert!(Totp::new(b"s", 30, 0, 0).is_err());
        assert!(Totp::new(b"s", 30, 0, 11).is_err());
    }
}
