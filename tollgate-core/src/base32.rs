//! Unpadded RFC 4648 Base32, as used for TOTP secrets.
//!
//! Decoding is deliberately permissive: input is upper-cased and any
//! character outside the alphabet (spaces, dashes, `=` padding, ...) is
//! skipped rather than rejected, so secrets copied with formatting noise
//! still decode. Off-the-shelf TOTP crates reject such input, which is why
//! this codec lives here.

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Encode bytes as Base32 without padding.
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits_left = 0u32;

    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits_left += 8;

        while bits_left >= 5 {
            let index = (buffer >> (bits_left - 5)) & 0x1F;
            out.push(char::from(ALPHABET[index as usize]));
            bits_left -= 5;
        }
        buffer &= (1 << bits_left) - 1;
    }

    if bits_left > 0 {
        let index = (buffer << (5 - bits_left)) & 0x1F;
        out.push(char::from(ALPHABET[index as usize]));
    }

    out
}

/// Decode Base32 text, ignoring case and skipping unknown characters.
///
/// Trailing bits that do not complete a byte are discarded.
pub fn decode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits_left = 0u32;

    for value in text.bytes().filter_map(symbol_value) {
        buffer = (buffer << 5) | u32::from(value);
        bits_left += 5;

        if bits_left >= 8 {
            out.push(((buffer >> (bits_left - 8)) & 0xFF) as u8);
            bits_left -= 8;
        }
        buffer &= (1 << bits_left) - 1;
    }

    out
}

fn symbol_value(c: u8) -> Option<u8> {
    match c.to_ascii_uppercase() {
        c @ b'A'..=b'Z' => Some(c - b'A'),
        c @ b'2'..=b'7' => Some(c - b'2' + 26),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTORS: &[(&str, &str)] = &[
        ("", ""),
        ("f", "MY"),
        ("fo", "MZXQ"),
        ("foo", "MZXW6"),
        ("foob", "MZXW6YQ"),
        ("fooba", "MZXW6YTB"),
        ("foobar", "MZXW6YTBOI"),
    ];

    #[test]
    fn test_rfc4648_vectors_encode() {
        for (plain, encoded) in VECTORS {
            assert_eq!(encode(plain.as_bytes()), *encoded, "encoding {plain:?}");
        }
    }

    #[test]
    fn test_rfc4648_vectors_decode() {
        for (plain, encoded) in VECTORS {
            assert_eq!(decode(encoded), plain.as_bytes(), "decoding {encoded:?}");
        }
    }

    #[test]
    fn test_round_trip_every_length() {
        let data: Vec<u8> = (0u8..=255).collect();
        for len in 0..data.len() {
            assert_eq!(decode(&encode(&data[..len])), &data[..len]);
        }
    }

    #[test]
    fn test_encode_uses_only_alphabet() {
        let encoded = encode(&[0xFF; 13]);
        assert!(encoded.bytes().all(|c| ALPHABET.contains(&c)));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_decode_is_case_insensitive() {
        assert_eq!(decode("mzxw6ytboi"), b"foobar");
        assert_eq!(decode("MzXw6YtBoI"), b"foobar");
    }

    #[test]
    fn test_decode_skips_unknown_characters() {
        assert_eq!(decode("MZXW 6YTB-OI"), b"foobar");
        assert_eq!(decode("MZXW6YQ="), b"foob");
        assert_eq!(decode("MZ1XW08"), decode("MZXW"));
        assert!(decode("!!!").is_empty());
    }

    #[test]
    fn test_decode_discards_incomplete_trailing_bits() {
        // One symbol carries five bits, not enough for a byte.
        assert!(decode("M").is_empty());
    }
}
