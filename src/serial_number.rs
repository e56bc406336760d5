//! X.509 certificate serial numbers.

use std::fmt;

use openssl::asn1::Asn1Integer;
use openssl::bn::BigNum;

use crate::error::{IssueError, IssueResult};

/// Conventional serial length in bytes.
pub const SERIAL_NUMBER_LEN: usize = 20;

/// A certificate serial number, read as an unsigned big-endian integer.
///
/// Because the bytes are interpreted as unsigned, the encoded INTEGER is never
/// negative.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SerialNumber(Vec<u8>);

impl SerialNumber {
    /// Draw a fresh serial from the OpenSSL CSPRNG.
    ///
    /// The top bit is cleared so the DER encoding stays within 20 octets.
    pub fn random() -> IssueResult<Self> {
        let mut bytes = [0u8; SERIAL_NUMBER_LEN];
        openssl::rand::rand_bytes(&mut bytes)
            .map_err(|e| IssueError::construct("failed to generate serial number", e))?;
        bytes[0] &= 0x7f;
        Ok(Self(bytes.to_vec()))
    }

    /// Use caller supplied bytes verbatim. Accepts 1 to 20 bytes.
    pub fn from_bytes(bytes: &[u8]) -> IssueResult<Self> {
        if bytes.is_empty() || bytes.len() > SERIAL_NUMBER_LEN {
            return Err(IssueError::CertificateConstruction(format!(
                "serial number must be 1 to {} bytes, got {}",
                SERIAL_NUMBER_LEN,
                bytes.len()
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn to_asn1_integer(&self) -> IssueResult<Asn1Integer> {
        BigNum::from_slice(&self.0)
            .and_then(|bn| bn.to_asn1_integer())
            .map_err(|e| IssueError::construct("failed to encode serial number", e))
    }
}

impl fmt::Display for SerialNumber {
    /// Uppercase hex, the form certificate viewers show.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_is_twenty_bytes_and_positive() {
        let serial = SerialNumber::random().unwrap();
        assert_eq!(serial.as_bytes().len(), SERIAL_NUMBER_LEN);
        assert_eq!(serial.as_bytes()[0] & 0x80, 0);
        assert_ne!(serial, SerialNumber::random().unwrap());
    }

    #[test]
    fn test_high_bit_still_encodes_non_negative() {
        let serial = SerialNumber::from_bytes(&[0xff; SERIAL_NUMBER_LEN]).unwrap();
        let bn = serial.to_asn1_integer().unwrap().to_bn().unwrap();
        assert!(!bn.is_negative());
        assert_eq!(bn.to_vec(), vec![0xff; SERIAL_NUMBER_LEN]);
    }

    #[test]
    fn test_length_bounds() {
        assert!(SerialNumber::from_bytes(&[]).is_err());
        assert!(SerialNumber::from_bytes(&[1; 21]).is_err());
        assert!(SerialNumber::from_bytes(&[1]).is_ok());
    }

    #[test]
    fn test_display_is_upper_hex() {
        let serial = SerialNumber::from_bytes(&[0x0a, 0xbc]).unwrap();
        assert_eq!(serial.to_string(), "0ABC");
    }
}
