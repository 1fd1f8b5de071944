/// Decode raw bytes as text.
///
/// UTF-8 first; anything that is not valid UTF-8 is decoded as ISO-8859-1,
/// which maps every byte to exactly one char and therefore cannot fail.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => decode_latin1(err.as_bytes()),
    }
}

/// ISO-8859-1: byte value == Unicode scalar value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
