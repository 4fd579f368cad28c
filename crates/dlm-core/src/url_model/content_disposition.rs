//! `Content-Disposition` filename extraction (RFC 6266 / RFC 5987).

/// Filename from a `Content-Disposition` header value.
///
/// `filename*` (extended, percent-encoded) is preferred over `filename`.
/// Quoted values may contain `;` and backslash escapes.
pub fn parse_content_disposition_filename(header_value: &str) -> Option<String> {
    let mut plain = None;
    for (name, value) in params(header_value) {
        if name.eq_ignore_ascii_case("filename*") {
            if let Some(decoded) = decode_ext_value(&value) {
                if !decoded.is_empty() {
                    return Some(decoded);
                }
            }
        } else if name.eq_ignore_ascii_case("filename") && !value.is_empty() {
            plain = Some(value);
        }
    }
    plain
}

/// Splits `type; a=b; c="d;e"` into `(a, b)`, `(c, d;e)`, unquoting values.
fn params(header_value: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut chars = header_value.chars().peekable();

    // skip disposition type
    while let Some(c) = chars.next() {
        if c == ';' {
            break;
        }
    }

    loop {
        let name: String = chars.by_ref().take_while(|&c| c != '=').collect();
        let name = name.trim().to_string();
        if name.is_empty() {
            break;
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
            }
        } else {
            value = chars.by_ref().take_while(|&c| c != ';').collect();
            value = value.trim().to_string();
        }
        out.push((name, value));
    }
    out
}

/// Decodes `charset'lang'pct-encoded`; only UTF-8 and ISO-8859-1 are understood.
fn decode_ext_value(value: &str) -> Option<String> {
    let mut parts = value.splitn(3, '\'');
    let charset = parts.next()?;
    let _lang = parts.next()?;
    let encoded = parts.next()?;
    if charset.eq_ignore_ascii_case("utf-8") {
        Some(percent_decode(encoded))
    } else if charset.eq_ignore_ascii_case("iso-8859-1") {
        Some(percent_decode_bytes(encoded).into_iter().map(char::from).collect())
    } else {
        None
    }
}

/// Percent-decodes `input` as UTF-8 (lossy). Malformed escapes are kept verbatim.
pub(super) fn percent_decode(input: &str) -> String {
    String::from_utf8_lossy(&percent_decode_bytes(input)).into_owned()
}

fn percent_decode_bytes(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}
