//! RFC 5322 header parsing: folding, encoded-words (RFC 2047), and date
//! parsing. MIME parameters are parsed with the structure.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

use crate::model::address::MailboxAddress;
use crate::model::message::{HeaderInfo, Overview};

/// Build the overview record from a raw header block.
pub fn parse_overview(raw_headers: &[u8], uid: u32) -> Overview {
    let text = decode_header_bytes(raw_headers);
    let headers = unfold_headers(&text);

    Overview {
        subject: get_header(&headers, "subject"),
        date: get_header(&headers, "date"),
        message_id: get_header(&headers, "message-id")
            .map(|s| extract_angle_bracket(&s))
            .unwrap_or_default(),
        uid,
        references: get_header(&headers, "references")
            .map(|s| extract_all_angle_brackets(&s))
            .unwrap_or_default(),
    }
}

/// Build the address headers record from a raw header block.
///
/// Personal names are left encoded; decoding is the consumer's job. The
/// block itself is kept undecoded.
pub fn parse_header_info(raw_headers: &[u8]) -> HeaderInfo {
    let headers = unfold_headers(&decode_header_bytes(raw_headers));

    HeaderInfo {
        from: get_header(&headers, "from")
            .map(|v| MailboxAddress::parse_list(&v))
            .unwrap_or_default(),
        cc: get_header(&headers, "cc")
            .map(|v| MailboxAddress::parse_list(&v))
            .unwrap_or_default(),
        raw: raw_headers.to_vec(),
    }
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &bytes[3..]
    } else {
        bytes
    };

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
    }

    result
}

/// Get the first value for a header name (case-insensitive).
pub fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any token, the original text is preserved.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two adjacent encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some(decoded) = try_decode_one_word(after_start) {
            result.push_str(&decoded.text);
            remaining = &remaining[start + 2 + decoded.consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

struct DecodedWord {
    text: String,
    consumed: usize, // bytes consumed from the string *after* the initial "=?"
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let total_consumed = first_q + 1 + second_q + 1 + end + 2;

    let bytes = match encoding.to_uppercase().as_str() {
        "B" => mail_parser::decoders::base64::base64_decode(encoded_text.as_bytes())?,
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    // RFC 2231 language suffix: "UTF-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);
    let text = decode_charset(charset, &bytes);

    Some(DecodedWord {
        text,
        consumed: total_consumed,
    })
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                match hex_byte(bytes[i + 1], bytes[i + 2]) {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

fn hex_byte(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

/// Decode bytes using a named charset.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let charset_lower = charset.trim().to_lowercase();
    match charset_lower.as_str() {
        "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.trim().as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                warn!(
                    charset = charset,
                    "Unknown charset, falling back to UTF-8 lossy"
                );
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

/// Extract content between `<` and `>` (for Message-ID).
pub fn extract_angle_bracket(s: &str) -> String {
    let trimmed = s.trim();
    if let Some(start) = trimmed.find('<') {
        if let Some(end) = trimmed[start..].find('>') {
            return trimmed[start..start + end + 1].to_string();
        }
    }
    trimmed.to_string()
}

/// Extract all `<…>` tokens from a string (for References header).
fn extract_all_angle_brackets(s: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut remaining = s;
    while let Some(start) = remaining.find('<') {
        if let Some(end) = remaining[start..].find('>') {
            result.push(remaining[start..start + end + 1].to_string());
            remaining = &remaining[start + end + 1..];
        } else {
            break;
        }
    }
    result
}

/// Parse an email date string in various common formats.
///
/// Supports RFC 2822, ISO 8601, and many broken real-world variants.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let no_dow = strip_day_of_week(trimmed);
    let no_dow_normalized = normalize_imap_date(&no_dow);

    let formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S %Z",
        "%d %b %Y %H:%M:%S",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];

    for candidate in [&no_dow, &no_dow_normalized] {
        for fmt in &formats {
            if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(candidate, fmt) {
                return Some(Utc.from_utc_datetime(&ndt));
            }
        }
    }

    for candidate in [&no_dow, &no_dow_normalized] {
        let replaced = replace_named_tz(candidate);
        for fmt in &formats {
            if let Ok(dt) = DateTime::parse_from_str(&replaced, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Attempt to parse a date using `mail-parser`'s built-in parser.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    use mail_parser::MessageParser;

    // Wrap input in a minimal RFC 5322 message so mail-parser can parse it
    let fake_msg = format!("Date: {input}\n\n");
    let parser = MessageParser::default();
    let parsed = parser.parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Normalize IMAP-style dates: `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    if !s.contains('-') {
        return s.to_string();
    }

    let title_months = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    for month in title_months {
        for variant in [month.to_uppercase(), month.to_lowercase(), month.to_string()] {
            let pattern = format!("-{variant}-");
            if s.contains(&pattern) {
                return s.replacen(&pattern, &format!(" {month} "), 1);
            }
        }
    }

    s.to_string()
}

/// Strip leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    let days = [
        "Mon,", "Tue,", "Wed,", "Thu,", "Fri,", "Sat,", "Sun,", "Mon ", "Tue ", "Wed ", "Thu ",
        "Fri ", "Sat ", "Sun ",
    ];
    for day in &days {
        if let Some(rest) = s.strip_prefix(day) {
            return rest.trim().to_string();
        }
    }
    s.to_string()
}

/// Replace well-known timezone abbreviations with numeric offsets.
fn replace_named_tz(s: &str) -> String {
    let tzs = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("JST", "+0900"),
    ];
    let mut result = s.to_string();
    for (name, offset) in &tzs {
        if result.ends_with(name) {
            let pos = result.len() - name.len();
            result.replace_range(pos.., offset);
            return result;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_encoded_word() {
        let input = "=?UTF-8?B?SG9sYSBtdW5kbw==?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        let input = "=?ISO-8859-1?Q?caf=E9?=";
        assert_eq!(decode_encoded_words(input), "café");
    }

    #[test]
    fn test_decode_multiple_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        let input = "Re: =?UTF-8?B?SG9sYQ==?= there";
        assert_eq!(decode_encoded_words(input), "Re: Hola there");
    }

    #[test]
    fn test_decode_windows1252_encoded_word() {
        assert_eq!(decode_encoded_words("=?Windows-1252?Q?M=FCller?="), "Müller");
    }

    #[test]
    fn test_unfold_headers() {
        let text = "Subject: This is a long\n\tsubject line\nFrom: user@example.com\n";
        let headers = unfold_headers(text);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, "subject");
        assert_eq!(headers[0].1, "This is a long subject line");
    }

    #[test]
    fn test_parse_overview() {
        let raw = b"Subject: =?UTF-8?B?SG9sYQ==?=\r\nDate: Thu, 04 Jan 2024 10:00:00 +0000\r\nMessage-ID: <m1@x>\r\nReferences: <a@x> <b@x>\r\n\r\n";
        let overview = parse_overview(raw, 7);
        assert_eq!(overview.uid, 7);
        assert_eq!(overview.subject.as_deref(), Some("=?UTF-8?B?SG9sYQ==?="));
        assert_eq!(overview.message_id, "<m1@x>");
        assert_eq!(overview.references, vec!["<a@x>", "<b@x>"]);
    }

    #[test]
    fn test_message_ids_keep_angle_brackets() {
        let raw = b"Message-ID:   <id@host> (comment)\r\nReferences: <a@x>\r\n\t<b@x>\r\n\r\n";
        let overview = parse_overview(raw, 1);
        assert_eq!(overview.message_id, "<id@host>");
        assert_eq!(overview.references, vec!["<a@x>", "<b@x>"]);

        let bare = parse_overview(b"Message-ID: id@host\r\n\r\n", 2);
        assert_eq!(bare.message_id, "id@host");
    }

    #[test]
    fn test_parse_header_info_keeps_raw_bytes() {
        let raw = b"From: Caf\xe9 <cafe@example.com>\r\nSubject: caf\xe9\r\n\r\n";
        let info = parse_header_info(raw);
        assert_eq!(info.raw, raw.to_vec());
        assert_eq!(info.from[0].full_address(), "cafe@example.com");
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 +0000").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-01-04");
    }

    #[test]
    fn test_parse_date_named_tz() {
        assert!(parse_date("Thu, 04 Jan 2024 10:00:00 EST").is_some());
    }

    #[test]
    fn test_parse_date_imap_style() {
        let dt = parse_date("16-JUL-2025 03:01:03").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2025-07-16");
    }

    #[test]
    fn test_parse_date_empty() {
        assert!(parse_date("   ").is_none());
    }
}
