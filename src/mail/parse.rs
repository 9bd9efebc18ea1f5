use mailparse::{DispositionType, ParsedMail};
use thiserror::Error;

/// Ways a dispatch email can fail to yield an alert line. All of them are
/// recoverable at single-item granularity: the watcher shows the fallback
/// text instead and never retries the item.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no email attachment in message")]
    NoAttachment,
    #[error("attached email has no HTML body")]
    NoHtmlBody,
    #[error("expected at least 3 bold spans, found {0}")]
    TooFewBoldSpans(usize),
    #[error("malformed message: {0}")]
    Malformed(#[from] mailparse::MailParseError),
}

/// Extracts the alert line from a dispatch email.
///
/// The qualifying message carries a single attachment that is itself a full
/// email; its HTML body holds at least three bold spans, where the 2nd is
/// the nature of the incident and the 3rd the address. The result is
/// `"<nature> - <address>"`.
pub fn parse_dispatch(raw: &[u8]) -> Result<String, ParseError> {
    let outer = mailparse::parse_mail(raw)?;
    let attachment = find_eml_attachment(&outer).ok_or(ParseError::NoAttachment)?;
    let payload = attachment.get_body_raw()?;
    let inner = mailparse::parse_mail(&payload)?;
    let html = find_html_part(&inner).ok_or(ParseError::NoHtmlBody)?;

    let spans = bold_spans(&html);
    if spans.len() < 3 {
        return Err(ParseError::TooFewBoldSpans(spans.len()));
    }
    Ok(format!("{} - {}", spans[1], spans[2]))
}

fn find_eml_attachment<'a, 'b>(mail: &'a ParsedMail<'b>) -> Option<&'a ParsedMail<'b>> {
    for part in &mail.subparts {
        if part.ctype.mimetype.eq_ignore_ascii_case("message/rfc822") {
            return Some(part);
        }
        let disposition = part.get_content_disposition();
        if disposition.disposition == DispositionType::Attachment {
            let filename = disposition
                .params
                .get("filename")
                .map(String::as_str)
                .unwrap_or("");
            if filename.to_ascii_lowercase().ends_with(".eml") {
                return Some(part);
            }
        }
        if let Some(found) = find_eml_attachment(part) {
            return Some(found);
        }
    }
    None
}

fn find_html_part(part: &ParsedMail) -> Option<String> {
    if part.ctype.mimetype.eq_ignore_ascii_case("text/html") {
        return part.get_body().ok();
    }
    for sub in &part.subparts {
        if let Some(html) = find_html_part(sub) {
            return Some(html);
        }
    }
    None
}

/// Collects the visible text of every `<b>`/`<strong>` element, in document
/// order. A minimal tag scan instead of a full HTML parser; the dispatch
/// bodies are machine-generated and regular.
fn bold_spans(html: &str) -> Vec<String> {
    let lower = html.to_ascii_lowercase();
    let mut spans = Vec::new();
    let mut at = 0usize;

    while let Some((content_start, close_tag)) = next_bold_open(&lower, at) {
        let Some(rel) = lower[content_start..].find(close_tag) else {
            break;
        };
        let content_end = content_start + rel;
        spans.push(clean_text(&html[content_start..content_end]));
        at = content_end + close_tag.len();
    }
    spans
}

/// Finds the next bold opening tag at or after `from`; returns the index
/// just past its `>` and the matching close tag.
fn next_bold_open(lower: &str, from: usize) -> Option<(usize, &'static str)> {
    let mut at = from;
    while let Some(rel) = lower[at..].find('<') {
        let tag_start = at + rel;
        let rest = &lower[tag_start + 1..];
        let (name, close_tag) = if rest.starts_with("strong") {
            ("strong", "</strong>")
        } else if rest.starts_with('b') {
            ("b", "</b>")
        } else {
            at = tag_start + 1;
            continue;
        };
        // reject <br>, <body>, <blockquote>: only a real element
        // boundary after the name counts
        match rest[name.len()..].chars().next() {
            Some('>') | Some(' ') | Some('\t') | Some('\r') | Some('\n') | Some('/') => {}
            _ => {
                at = tag_start + 1;
                continue;
            }
        }
        let gt = lower[tag_start..].find('>')?;
        return Some((tag_start + gt + 1, close_tag));
    }
    None
}

/// Strips any nested markup, decodes the handful of entities the dispatch
/// generator emits and collapses whitespace to single spaces.
fn clean_text(fragment: &str) -> String {
    let mut text = String::new();
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch_html(spans: &[&str]) -> String {
        let bolds: String = spans.iter().map(|s| format!("<b>{s}</b>")).collect();
        format!("<html><body><p>CAD Incident</p>{bolds}</body></html>")
    }

    /// Builds the raw bytes of a dispatch email carrying `html` inside an
    /// attached .eml, the way the county CAD system sends them.
    fn dispatch_email(html: &str) -> Vec<u8> {
        let inner = format!(
            "From: CAD@CABARRUSCOUNTY.US\r\n\
             Subject: Incident Notification\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/html; charset=utf-8\r\n\
             \r\n\
             {html}\r\n"
        );
        let outer = format!(
            "From: CAD@CABARRUSCOUNTY.US\r\n\
             Subject: Dispatch Report #12\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"dispatch-boundary\"\r\n\
             \r\n\
             --dispatch-boundary\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             See attached incident report.\r\n\
             --dispatch-boundary\r\n\
             Content-Type: message/rfc822\r\n\
             Content-Disposition: attachment; filename=\"incident.eml\"\r\n\
             \r\n\
             {inner}\r\n\
             --dispatch-boundary--\r\n"
        );
        outer.into_bytes()
    }

    #[test]
    fn extracts_nature_and_address() {
        let raw = dispatch_email(&dispatch_html(&[
            "Communications",
            "Structure Fire",
            "8500 Flowe Farm Rd",
        ]));
        assert_eq!(
            parse_dispatch(&raw).unwrap(),
            "Structure Fire - 8500 Flowe Farm Rd"
        );
    }

    #[test]
    fn too_few_bold_spans_is_an_error() {
        let raw = dispatch_email(&dispatch_html(&["Communications", "Structure Fire"]));
        match parse_dispatch(&raw) {
            Err(ParseError::TooFewBoldSpans(2)) => {}
            other => panic!("expected TooFewBoldSpans(2), got {other:?}"),
        }
    }

    #[test]
    fn message_without_attachment_is_an_error() {
        let raw = b"From: CAD@CABARRUSCOUNTY.US\r\n\
            Subject: Dispatch Report #12\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            nothing attached\r\n";
        assert!(matches!(
            parse_dispatch(raw),
            Err(ParseError::NoAttachment)
        ));
    }

    #[test]
    fn bold_scan_skips_lookalike_tags() {
        let html = "<body>intro<br><b>one</b><blockquote><strong>two</strong></blockquote><b>three</b></body>";
        assert_eq!(bold_spans(html), vec!["one", "two", "three"]);
    }

    #[test]
    fn bold_spans_with_attributes_and_nesting() {
        let html = r#"<b class="hdr">Communications</b><b><i>Structure</i> Fire</b><b>8500&nbsp;Flowe Farm Rd</b>"#;
        assert_eq!(
            bold_spans(html),
            vec!["Communications", "Structure Fire", "8500 Flowe Farm Rd"]
        );
    }

    #[test]
    fn whitespace_inside_spans_is_collapsed() {
        let html = "<b>Communications</b><b>Structure\n   Fire</b><b>8500 Flowe Farm Rd</b>";
        assert_eq!(bold_spans(html)[1], "Structure Fire");
    }
}
