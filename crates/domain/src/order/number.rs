use std::fmt;
use std::str::FromStr;

const PREFIX: &str = "ORD";

/// Human-readable order number, `ORD-<year>-<sequence>`.
///
/// The sequence is zero-padded to five digits and comes from the store's
/// order sequence, so numbers stay unique under concurrent creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderNumber {
    year: i32,
    sequence: u64,
}

impl OrderNumber {
    pub fn new(year: i32, sequence: u64) -> Self {
        Self { year, sequence }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}-{:04}-{:05}", self.year, self.sequence)
    }
}

/// Error returned when a string is not a well-formed order number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidOrderNumber(pub String);

impl fmt::Display for InvalidOrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid order number: {}", self.0)
    }
}

impl std::error::Error for InvalidOrderNumber {}

impl FromStr for OrderNumber {
    type Err = InvalidOrderNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidOrderNumber(s.to_string());

        let mut parts = s.splitn(3, '-');
        if parts.next() != Some(PREFIX) {
            return Err(invalid());
        }
        let year = parts
            .next()
            .filter(|y| y.len() == 4)
            .and_then(|y| y.parse().ok())
            .ok_or_else(invalid)?;
        let sequence = parts
            .next()
            .filter(|seq| seq.len() >= 5 && seq.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|seq| seq.parse().ok())
            .ok_or_else(invalid)?;

        Ok(Self { year, sequence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_padding() {
        assert_eq!(OrderNumber::new(2026, 1).to_string(), "ORD-2026-00001");
        assert_eq!(OrderNumber::new(2026, 4321).to_string(), "ORD-2026-04321");
    }

    #[test]
    fn sequence_beyond_five_digits_is_not_truncated() {
        assert_eq!(OrderNumber::new(2026, 123456).to_string(), "ORD-2026-123456");
    }

    #[test]
    fn parses_own_output() {
        let number: OrderNumber = "ORD-2026-00042".parse().unwrap();
        assert_eq!(number.year(), 2026);
        assert_eq!(number.sequence(), 42);
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert!("ORD-26-00001".parse::<OrderNumber>().is_err());
        assert!("INV-2026-00001".parse::<OrderNumber>().is_err());
        assert!("ORD-2026-1".parse::<OrderNumber>().is_err());
        assert!("ORD-2026-0000x".parse::<OrderNumber>().is_err());
    }
}
