//! Response header tracking across redirects.

/// Headers of the most recent response seen on a transfer.
///
/// libcurl feeds every header line of every response (redirects included);
/// a status line starts a new response and clears what came before.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResponseHeaders {
    pub status: Option<u32>,
    pub content_length: Option<u64>,
    /// Total from `Content-Range: bytes a-b/total`.
    pub range_total: Option<u64>,
    /// Raw entity tag, quotes included, for `If-Range`.
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_disposition: Option<String>,
}

impl ResponseHeaders {
    pub fn feed(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if line.starts_with("HTTP/") {
            *self = ResponseHeaders {
                status: parse_status_line(line),
                ..Default::default()
            };
            return;
        }
        let Some((name, value)) = line.split_once(':') else {
            return;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            self.content_length = value.parse().ok();
        } else if name.eq_ignore_ascii_case("content-range") {
            self.range_total = value
                .rsplit_once('/')
                .and_then(|(_, total)| total.trim().parse().ok());
        } else if name.eq_ignore_ascii_case("etag") {
            self.etag = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("last-modified") {
            self.last_modified = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("content-disposition") {
            self.content_disposition = Some(value.to_string());
        }
    }

    /// Full size of the resource once written at `offset`; 0 when unknown.
    pub fn expected_total(&self, offset: u64) -> u64 {
        match self.status {
            Some(206) => self
                .range_total
                .or_else(|| self.content_length.map(|len| offset + len))
                .unwrap_or(0),
            Some(200..=299) => self.content_length.unwrap_or(0),
            _ => 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }
}

fn parse_status_line(line: &str) -> Option<u32> {
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(lines: &[&str]) -> ResponseHeaders {
        let mut h = ResponseHeaders::default();
        for l in lines {
            h.feed(l);
        }
        h
    }

    #[test]
    fn tracks_final_response_after_redirect() {
        let h = feed_all(&[
            "HTTP/1.1 302 Found\r\n",
            "Location: /real\r\n",
            "Content-Length: 5\r\n",
            "\r\n",
            "HTTP/1.1 200 OK\r\n",
            "Content-Length: 1024\r\n",
            "ETag: \"v1\"\r\n",
            "\r\n",
        ]);
        assert_eq!(h.status, Some(200));
        assert_eq!(h.content_length, Some(1024));
        assert_eq!(h.etag.as_deref(), Some("\"v1\""));
        assert_eq!(h.expected_total(0), 1024);
    }

    #[test]
    fn partial_content_total() {
        let h = feed_all(&[
            "HTTP/1.1 206 Partial Content",
            "Content-Range: bytes 100-199/200",
            "Content-Length: 100",
        ]);
        assert_eq!(h.expected_total(100), 200);

        let no_range = feed_all(&["HTTP/1.1 206 Partial Content", "Content-Length: 100"]);
        assert_eq!(no_range.expected_total(100), 200);
    }

    #[test]
    fn unsatisfiable_range_reports_total() {
        let h = feed_all(&["HTTP/1.1 416 Range Not Satisfiable", "Content-Range: bytes */4096"]);
        assert_eq!(h.status, Some(416));
        assert_eq!(h.range_total, Some(4096));
        assert!(!h.is_success());
    }

    #[test]
    fn unknown_length_and_errors() {
        assert_eq!(feed_all(&["HTTP/2 200"]).expected_total(0), 0);
        let h = feed_all(&["HTTP/1.1 404 Not Found", "Content-Length: 9"]);
        assert!(!h.is_success());
        assert_eq!(h.expected_total(0), 0);
    }

    #[test]
    fn disposition_and_last_modified() {
        let h = feed_all(&[
            "HTTP/1.1 200 OK",
            "content-disposition: attachment; filename=\"r.pdf\"",
            "Last-Modified: Wed, 21 Oct 2015 07:28:00 GMT",
        ]);
        assert_eq!(h.content_disposition.as_deref(), Some("attachment; filename=\"r.pdf\""));
        assert_eq!(h.last_modified.as_deref(), Some("Wed, 21 Oct 2015 07:28:00 GMT"));
    }
}
