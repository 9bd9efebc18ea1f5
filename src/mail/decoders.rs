pub fn decode_subject(raw: &[u8]) -> String {
    // mailparse expects a full "Key: value" header line
    let mut line = b"Subject: ".to_vec();
    line.extend_from_slice(raw);
    line.extend_from_slice(b"\r\n");

    match mailparse::parse_header(&line) {
        Ok((h, _idx)) => h.get_value(), // decodes RFC 2047
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_subject_passes_through() {
        assert_eq!(decode_subject(b"Dispatch Report #12"), "Dispatch Report #12");
    }

    #[test]
    fn rfc2047_words_are_decoded() {
        assert_eq!(
            decode_subject(b"=?utf-8?q?Dispatch_Report?="),
            "Dispatch Report"
        );
    }
}
