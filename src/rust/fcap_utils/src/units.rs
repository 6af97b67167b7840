use thiserror::Error;

/// Parses a human-readable size such as `"1g"`, `"512m"`, `"64k"` or a bare
/// byte count. Suffixes are binary (`k` = 1024) and case insensitive, and a
/// trailing `b` is accepted (`"10mb"`). Fractions are allowed before a
/// suffix (`"1.5g"`).
pub fn parse_human_size(input: &str) -> Result<u64, SizeError> {
  let trimmed = input.trim().to_lowercase();
  let trimmed = trimmed.strip_suffix('b').unwrap_or(&trimmed);
  if trimmed.is_empty() {
    return Err(SizeError::Empty);
  }

  let split = trimmed
    .find(|c: char| !(c.is_ascii_digit() || c == '.'))
    .unwrap_or(trimmed.len());
  let (number, suffix) = trimmed.split_at(split);
  let multiplier: u64 = match suffix.trim() {
    "" => 1,
    "k" => 1 << 10,
    "m" => 1 << 20,
    "g" => 1 << 30,
    "t" => 1 << 40,
    "p" => 1 << 50,
    other => return Err(SizeError::UnknownSuffix(other.to_string())),
  };

  if let Ok(whole) = number.parse::<u64>() {
    return whole
      .checked_mul(multiplier)
      .ok_or_else(|| SizeError::Overflow(input.to_string()));
  }
  let value: f64 = number
    .parse()
    .map_err(|_| SizeError::NotANumber(input.to_string()))?;
  let bytes = value * multiplier as f64;
  if !bytes.is_finite() || bytes < 0.0 || bytes >= u64::MAX as f64 {
    return Err(SizeError::Overflow(input.to_string()));
  }
  Ok(bytes as u64)
}

/// Formats a byte count for log output.
pub fn scale_bytes(n: u64) -> String {
  if n > 1 << 30 {
    format!("{:.2} GiB", n as f64 / (1u64 << 30) as f64)
  } else if n > 1 << 20 {
    format!("{:.2} MiB", n as f64 / (1u64 << 20) as f64)
  } else if n > 1 << 10 {
    format!("{:.2} KiB", n as f64 / (1u64 << 10) as f64)
  } else {
    format!("{n} bytes")
  }
}

/// Errors from [`parse_human_size`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SizeError {
  /// Nothing to parse
  #[error("Empty size value")]
  Empty,

  /// The numeric part could not be parsed
  #[error("Not a size: {0}")]
  NotANumber(String),

  /// Suffix other than k, m, g, t or p
  #[error("Unknown size suffix: {0}")]
  UnknownSuffix(String),

  /// The value does not fit in 64 bits
  #[error("Size too large: {0}")]
  Overflow(String),
}
