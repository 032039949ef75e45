use std::time::Duration;

use bytes::Bytes;
use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;
use url::{Position, Url};

use super::error::TrackerError;
use super::response::SwarmState;
use crate::bencode::{decode, Value};
use crate::constants::{HTTP_TIMEOUT, USER_AGENT};
use crate::torrent::InfoHash;

/// Bytes left literal in the `info_hash` query value (RFC 3986 unreserved).
const INFO_HASH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Derives the scrape URL from an announce URL.
///
/// The last path segment has to start with `announce`; it is swapped for
/// `scrape`, keeping whatever followed it (`announce.php` becomes
/// `scrape.php`) and the query string.
///
/// ```
/// use tscrape::tracker::scrape_url;
/// use url::Url;
///
/// let announce = Url::parse("http://tracker.example/path/announce.php?x=1").unwrap();
/// assert_eq!(
///     scrape_url(&announce).unwrap().as_str(),
///     "http://tracker.example/path/scrape.php?x=1"
/// );
/// ```
pub fn scrape_url(announce: &Url) -> Result<Url, TrackerError> {
    let path = announce.path();
    let unsupported = || TrackerError::UnsupportedConvention(announce.to_string());

    let slash = path.rfind('/').ok_or_else(unsupported)?;
    let rest = path[slash + 1..]
        .strip_prefix("announce")
        .ok_or_else(unsupported)?;

    let mut scrape = announce.clone();
    scrape.set_path(&format!("{}scrape{}", &path[..=slash], rest));
    scrape.set_fragment(None);
    Ok(scrape)
}

/// The full scrape request URL for one torrent.
pub fn scrape_request_url(announce: &Url, info_hash: &InfoHash) -> Result<Url, TrackerError> {
    let scrape = scrape_url(announce)?;
    let separator = if scrape.query().is_some() { '&' } else { '?' };
    let url = format!(
        "{scrape}{separator}info_hash={}",
        percent_encode(info_hash.as_bytes(), INFO_HASH_ENCODE_SET)
    );
    Url::parse(&url).map_err(|e| TrackerError::InvalidUrl(format!("{url}: {e}")))
}

/// Decodes a bencoded scrape response body.
///
/// The entry for `info_hash` is used when the tracker keys `files` by it;
/// otherwise the response must carry exactly one entry.
pub fn parse_scrape_response(body: &[u8], info_hash: &InfoHash) -> Result<SwarmState, TrackerError> {
    let value = decode(body)?;
    let dict = value
        .as_dict()
        .ok_or_else(|| TrackerError::InvalidResponse("expected dict".into()))?;

    if let Some(failure) = dict.get(b"failure reason".as_slice()) {
        let reason = failure
            .as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        return Err(TrackerError::TrackerFailure(reason));
    }

    let files = dict
        .get(b"files".as_slice())
        .and_then(Value::as_dict)
        .ok_or_else(|| TrackerError::InvalidResponse("missing files".into()))?;

    let entry = match files.get(info_hash.as_bytes().as_slice()) {
        Some(entry) => entry,
        None if files.len() == 1 => files.values().next().ok_or_else(|| {
            TrackerError::InvalidResponse("empty files".into())
        })?,
        None => {
            return Err(TrackerError::InvalidResponse(format!(
                "{} files entries, none for {info_hash}",
                files.len()
            )))
        }
    };

    Ok(SwarmState {
        complete: count(entry, "complete")?,
        downloaded: count(entry, "downloaded")?,
        incomplete: count(entry, "incomplete")?,
    })
}

fn count(entry: &Value, field: &str) -> Result<u32, TrackerError> {
    let value = entry
        .get(field.as_bytes())
        .and_then(Value::as_integer)
        .ok_or_else(|| TrackerError::InvalidResponse(format!("missing {field}")))?;

    u32::try_from(value)
        .map_err(|_| TrackerError::InvalidResponse(format!("{field} out of range: {value}")))
}

/// A raw `GET` for `url`, written straight to a tracker socket.
///
/// HTTP/1.0 keeps the response free of chunked encoding and lets the
/// tracker close the stream when it is done.
pub fn build_get_request(url: &Url) -> Bytes {
    let target = &url[Position::BeforePath..Position::AfterQuery];
    let host = &url[Position::BeforeHost..Position::AfterPort];

    Bytes::from(format!(
        "GET {target} HTTP/1.0\r\n\
         Host: {host}\r\n\
         User-Agent: {USER_AGENT}\r\n\
         Accept: */*\r\n\
         Connection: close\r\n\
         \r\n"
    ))
}

/// Status line and framing headers of a buffered HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    /// Offset of the first body byte.
    pub body_start: usize,
    pub content_length: Option<usize>,
}

impl ResponseHead {
    /// Parses the head once the blank line ending it has arrived.
    ///
    /// Returns `Ok(None)` while the terminator is still missing.
    pub fn parse(buf: &[u8]) -> Result<Option<Self>, TrackerError> {
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return Ok(None);
        };

        let head = String::from_utf8_lossy(&buf[..end]);
        let mut lines = head.split("\r\n");

        let status = lines
            .next()
            .and_then(|line| {
                let mut parts = line.split_whitespace();
                let version = parts.next()?;
                version.starts_with("HTTP/").then_some(())?;
                parts.next()?.parse::<u16>().ok()
            })
            .ok_or_else(|| TrackerError::InvalidResponse("malformed status line".into()))?;

        let content_length = lines
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse().ok());

        Ok(Some(Self {
            status,
            body_start: end + 4,
            content_length,
        }))
    }

    /// Whether `buf` holds the whole body. Without a `Content-Length` the
    /// body only ends when the tracker closes the stream.
    pub fn is_complete(&self, buf: &[u8]) -> bool {
        self.content_length
            .is_some_and(|len| buf.len() >= self.body_start + len)
    }

    pub fn body<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        let end = self
            .content_length
            .map_or(buf.len(), |len| (self.body_start + len).min(buf.len()));
        &buf[self.body_start.min(end)..end]
    }

    pub fn is_success(&self) -> bool {
        is_success(self.status)
    }
}

/// Decodes a complete tracker reply (head and body).
///
/// Error statuses still get their body decoded since trackers put their
/// `failure reason` there; the status is only reported when that fails.
pub fn parse_http_response(
    buf: &[u8],
    info_hash: &InfoHash,
) -> Result<SwarmState, TrackerError> {
    let head = ResponseHead::parse(buf)?
        .ok_or_else(|| TrackerError::InvalidResponse("connection closed before headers".into()))?;
    decode_with_status(head.status, head.body(buf), info_hash)
}

fn decode_with_status(
    status: u16,
    body: &[u8],
    info_hash: &InfoHash,
) -> Result<SwarmState, TrackerError> {
    match parse_scrape_response(body, info_hash) {
        Err(TrackerError::Bencode(_) | TrackerError::InvalidResponse(_))
            if !is_success(status) =>
        {
            Err(TrackerError::HttpStatus(status))
        }
        result => result,
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Scrapes a single HTTP tracker.
///
/// # Examples
///
/// ```no_run
/// use tscrape::tracker::HttpScraper;
/// use tscrape::torrent::InfoHash;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let scraper = HttpScraper::new("http://tracker.example/announce")?;
/// let state = scraper.scrape(&InfoHash::new([0; 20])).await?;
/// println!("{state}");
/// # Ok(())
/// # }
/// ```
pub struct HttpScraper {
    client: Client,
    announce: Url,
}

impl HttpScraper {
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        let announce =
            Url::parse(url).map_err(|e| TrackerError::InvalidUrl(format!("{url}: {e}")))?;
        Self::from_url(announce, HTTP_TIMEOUT)
    }

    pub fn from_url(announce: Url, timeout: Duration) -> Result<Self, TrackerError> {
        if announce.scheme() != "http" {
            return Err(TrackerError::UnsupportedProtocol(
                announce.scheme().to_string(),
            ));
        }
        // Fail early on trackers without a scrape URL.
        scrape_url(&announce)?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, announce })
    }

    pub async fn scrape(&self, info_hash: &InfoHash) -> Result<SwarmState, TrackerError> {
        let url = scrape_request_url(&self.announce, info_hash)?;
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                TrackerError::Timeout
            } else {
                TrackerError::Http(e)
            }
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        decode_with_status(status, &body, info_hash)
    }

    pub fn url(&self) -> &Url {
        &self.announce
    }
}
