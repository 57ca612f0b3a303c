//! Strict text encodings for template input and rendered output

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A supported character encoding.
///
/// Decoding and encoding are strict: the first byte or character that the
/// encoding cannot represent is reported by offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
	#[default]
	Utf8,
	Ascii,
	Latin1,
}

/// Offset of the first byte (decode) or character (encode) that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingFailure {
	pub offset: usize,
}

impl Encoding {
	/// Look up an encoding by one of its usual labels, ignoring case.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_mako_engine::Encoding;
	///
	/// assert_eq!(Encoding::from_label("UTF-8"), Some(Encoding::Utf8));
	/// assert_eq!(Encoding::from_label("iso-8859-1"), Some(Encoding::Latin1));
	/// assert_eq!(Encoding::from_label("ebcdic"), None);
	/// ```
	pub fn from_label(label: &str) -> Option<Self> {
		match label.trim().to_ascii_lowercase().replace('_', "-").as_str() {
			"utf-8" | "utf8" => Some(Self::Utf8),
			"ascii" | "us-ascii" => Some(Self::Ascii),
			"latin-1" | "latin1" | "iso-8859-1" | "l1" => Some(Self::Latin1),
			_ => None,
		}
	}

	/// Canonical label
	pub fn label(&self) -> &'static str {
		match self {
			Self::Utf8 => "utf-8",
			Self::Ascii => "ascii",
			Self::Latin1 => "latin-1",
		}
	}

	pub fn decode(&self, bytes: &[u8]) -> Result<String, EncodingFailure> {
		match self {
			Self::Utf8 => std::str::from_utf8(bytes)
				.map(str::to_string)
				.map_err(|e| EncodingFailure {
					offset: e.valid_up_to(),
				}),
			Self::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
				Some(offset) => Err(EncodingFailure { offset }),
				None => Ok(bytes.iter().map(|&b| b as char).collect()),
			},
			Self::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
		}
	}

	pub fn encode(&self, text: &str) -> Result<Vec<u8>, EncodingFailure> {
		let limit = match self {
			Self::Utf8 => return Ok(text.as_bytes().to_vec()),
			Self::Ascii => 0x7f,
			Self::Latin1 => 0xff,
		};
		let mut out = Vec::with_capacity(text.len());
		for (offset, ch) in text.chars().enumerate() {
			let code = ch as u32;
			if code > limit {
				return Err(EncodingFailure { offset });
			}
			out.push(code as u8);
		}
		Ok(out)
	}
}

impl fmt::Display for Encoding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

impl FromStr for Encoding {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_label(s).ok_or_else(|| format!("unknown encoding '{}'", s))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(Encoding::Utf8, "¢".as_bytes(), Ok("¢".to_string()))]
	#[case(Encoding::Latin1, &[0xA2], Ok("¢".to_string()))]
	#[case(Encoding::Ascii, "¢".as_bytes(), Err(EncodingFailure { offset: 0 }))]
	#[case(Encoding::Utf8, &[b'a', 0xff], Err(EncodingFailure { offset: 1 }))]
	fn test_decode(
		#[case] encoding: Encoding,
		#[case] input: &[u8],
		#[case] expected: Result<String, EncodingFailure>,
	) {
		assert_eq!(encoding.decode(input), expected);
	}

	#[rstest]
	fn test_ascii_encode_rejects_cent_sign() {
		// Arrange
		let text = "price: ¢";

		// Act
		let result = Encoding::Ascii.encode(text);

		// Assert
		assert_eq!(result, Err(EncodingFailure { offset: 7 }));
	}

	#[rstest]
	fn test_latin1_encode_single_byte() {
		assert_eq!(Encoding::Latin1.encode("¢"), Ok(vec![0xA2]));
	}

	#[rstest]
	fn test_from_str_unknown() {
		assert!("klingon".parse::<Encoding>().is_err());
	}
}
