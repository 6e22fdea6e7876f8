//! Component F (part 1): cache-key sharding for Range requests.
//!
//! Grounded line-for-line on `cache_range_requests.cc`: compose a
//! range-qualified cache key, rewrite 206→200 before storing and 200→206
//! before serving (keyed off the literal "Partial Content" reason string,
//! matching the original's exact quirk), and honor `X-Crr-Ims` to force a
//! conditional revalidation against the cached object's `Date:` header.

use crate::error::{CoreError, ProtocolError};
use crate::headers::Http11Headers;

pub const RANGE_HEADER: &str = "Range";
pub const IMS_HEADER: &str = "X-Crr-Ims";

/// `"<effective-url>-<range-value>"`, exactly the `snprintf("%s-%s", ...)`
/// composition from the original.
#[must_use]
pub fn compose_key(effective_url: &str, range_value: &str) -> String {
    format!("{effective_url}-{range_value}")
}

/// Extract the cache key for `req`, or `None` if there's no Range header
/// (in which case the ordinary cache key is used unmodified).
#[must_use]
pub fn cache_key_for_request(req: &Http11Headers, effective_url: &str) -> Option<String> {
    req.field(RANGE_HEADER)
        .map(|range| compose_key(effective_url, range))
}

/// Parsed `X-Crr-Ims` value: the caller forces `HIT_STALE` if the cached
/// object's `Date:` is older than this.
pub fn parse_ims(req: &Http11Headers) -> Result<Option<httpdate::HttpDate>, CoreError> {
    let Some(raw) = req.field(IMS_HEADER) else {
        return Ok(None);
    };
    httpdate::parse(raw)
        .map(Some)
        .map_err(|_| ProtocolError::InvalidDate(raw.to_string()).into())
}

/// Compare the cached object's `Date:` header against the parsed
/// `X-Crr-Ims` value; `true` means the cache entry is stale and the lookup
/// should be forced to `HIT_STALE`.
#[must_use]
pub fn is_stale_by_ims(cached_date: httpdate::HttpDate, ims: httpdate::HttpDate) -> bool {
    cached_date < ims
}

/// 206→200 rewrite applied to the origin's response before it's stored,
/// mirroring `handle_server_read_response`: the origin's response is always
/// assumed non-Range-aware once rewritten, so caching of a 200 origin
/// response is disabled afterward (the original's `no_store` call) since it
/// means the origin doesn't actually support Range.
pub fn rewrite_for_store(resp: &mut Http11Headers) -> bool {
    match resp.status {
        Some(206) => {
            resp.set_status(200);
            true
        }
        Some(200) => false,
        _ => false,
    }
}

/// 200→206 rewrite applied when serving a cached range response to the
/// client, keyed off the synthetic "Partial Content" reason string set when
/// the object was stored — matching `handle_client_send_response`'s exact
/// check (status == 200 AND reason == "Partial Content").
pub fn rewrite_for_client(resp: &mut Http11Headers) -> bool {
    if resp.status == Some(200) && resp.reason.as_deref() == Some("Partial Content") {
        resp.set_status(206);
        true
    } else {
        false
    }
}

/// Strip the Range header before forwarding the request upstream, restoring
/// it afterward for logging — matching `remove_header`/`set_header` in
/// `handle_send_origin_request`.
pub fn take_range_header(req: &mut Http11Headers) -> Option<String> {
    let value = req.field(RANGE_HEADER).map(str::to_string);
    req.unset_header(RANGE_HEADER);
    value
}

pub fn restore_range_header(req: &mut Http11Headers, value: &str) {
    req.set_header(RANGE_HEADER, value);
}

/// Minimal RFC 7231 HTTP-date parsing, sufficient for the `Date:` and
/// `X-Crr-Ims` comparisons above. No external crate in the pack supplies
/// this narrowly, so it's hand-rolled against the one format (`IMF-fixdate`)
/// the original core actually emits and expects.
pub mod httpdate {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub struct HttpDate(i64); // seconds since epoch

    const DAYS_PER_MONTH: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

    fn is_leap(year: i64) -> bool {
        (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
    }

    fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
        // Howard Hinnant's days_from_civil algorithm.
        let y = if month <= 2 { year - 1 } else { year };
        let era = if y >= 0 { y } else { y - 399 } / 400;
        let yoe = y - era * 400;
        let mp = (month + 9) % 12;
        let doy = (153 * mp + 2) / 5 + day - 1;
        let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
        era * 146097 + doe - 719468
    }

    pub fn parse(s: &str) -> Result<HttpDate, ()> {
        // IMF-fixdate: "Sun, 06 Nov 1994 08:49:37 GMT"
        let parts: Vec<&str> = s.trim().split_whitespace().collect();
        if parts.len() != 5 {
            return Err(());
        }
        let day: i64 = parts[1].parse().map_err(|_| ())?;
        let month = match parts[2] {
            "Jan" => 1,
            "Feb" => 2,
            "Mar" => 3,
            "Apr" => 4,
            "May" => 5,
            "Jun" => 6,
            "Jul" => 7,
            "Aug" => 8,
            "Sep" => 9,
            "Oct" => 10,
            "Nov" => 11,
            "Dec" => 12,
            _ => return Err(()),
        };
        let year: i64 = parts[3].parse().map_err(|_| ())?;
        let mut hms = parts[4].splitn(3, ':');
        let hour: i64 = hms.next().ok_or(())?.parse().map_err(|_| ())?;
        let min: i64 = hms.next().ok_or(())?.parse().map_err(|_| ())?;
        let sec: i64 = hms.next().ok_or(())?.parse().map_err(|_| ())?;
        let max_day = if month == 2 && is_leap(year) {
            29
        } else {
            DAYS_PER_MONTH[(month - 1) as usize]
        };
        if day < 1 || day > max_day || hour > 23 || min > 59 || sec > 60 {
            return Err(());
        }
        let days = days_from_civil(year, month, day);
        let secs = days * 86400 + hour * 3600 + min * 60 + sec;
        Ok(HttpDate(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_range_qualified_key() {
        assert_eq!(
            compose_key("http://o/x", "bytes=0-99"),
            "http://o/x-bytes=0-99"
        );
    }

    #[test]
    fn rewrites_206_to_200_for_store_and_back_for_client() {
        let mut resp = Http11Headers::new_response(206, "Partial Content", "HTTP/1.1");
        assert!(rewrite_for_store(&mut resp));
        assert_eq!(resp.status, Some(200));
        assert!(rewrite_for_client(&mut resp));
        assert_eq!(resp.status, Some(206));
    }

    #[test]
    fn does_not_rewrite_plain_200_for_client() {
        let mut resp = Http11Headers::new_response(200, "OK", "HTTP/1.1");
        assert!(!rewrite_for_client(&mut resp));
    }

    #[test]
    fn parses_and_compares_imf_fixdate() {
        let a = httpdate::parse("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        let b = httpdate::parse("Sun, 06 Nov 1994 08:49:38 GMT").unwrap();
        assert!(is_stale_by_ims(a, b));
        assert!(!is_stale_by_ims(b, a));
    }
}
