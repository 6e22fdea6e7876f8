//! Component F/§6 plumbing: a minimal MIME header view.
//!
//! Named and shaped after the original core's header-manipulation API
//! (`field_find`, `value_string_get/set`, `status_get/set`, `method_get`,
//! …), realized here as one concrete owned implementation rather than an
//! FFI-backed struct, since this core has no external MIME-parsing layer to
//! bind to (out of scope per the non-goals). Header names are matched
//! case-insensitively, as HTTP requires.

use std::fmt;

/// A single name/value header pair, order-preserving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// An HTTP request or response line plus its header list.
///
/// Grounded on `HttpHeaders`'s method surface (`field_find`-equivalent
/// `field`, `set_header`, `unset_header`, `status`/`set_status`, `method`,
/// `url`, `proto`, iteration skipping the top line) but storing everything
/// as owned `String`s instead of a workspace-backed C array, since there is
/// no shared arena with a C caller here.
#[derive(Debug, Clone, Default)]
pub struct Http11Headers {
    pub method: Option<String>,
    pub url: Option<String>,
    pub proto: Option<String>,
    pub status: Option<u16>,
    pub reason: Option<String>,
    headers: Vec<Header>,
}

impl Http11Headers {
    #[must_use]
    pub fn new_request(method: &str, url: &str, proto: &str) -> Self {
        Self {
            method: Some(method.to_string()),
            url: Some(url.to_string()),
            proto: Some(proto.to_string()),
            status: None,
            reason: None,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn new_response(status: u16, reason: &str, proto: &str) -> Self {
        Self {
            method: None,
            url: None,
            proto: Some(proto.to_string()),
            status: Some(status),
            reason: Some(reason.to_string()),
            headers: Vec::new(),
        }
    }

    /// First header matching `name` (case-insensitive), mirroring `field_find`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Set (create-or-replace-first, dropping duplicates) a header value.
    pub fn set_header(&mut self, name: &str, value: &str) {
        let mut replaced = false;
        self.headers.retain_mut(|h| {
            if h.name.eq_ignore_ascii_case(name) {
                if !replaced {
                    h.value = value.to_string();
                    replaced = true;
                    true
                } else {
                    false
                }
            } else {
                true
            }
        });
        if !replaced {
            self.headers.push(Header {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }

    /// Append a new header slot without deduplicating (Range, Set-Cookie,
    /// etc. can legitimately repeat).
    pub fn append_header(&mut self, name: &str, value: &str) {
        self.headers.push(Header {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    /// Remove every header matching `name` (case-insensitive).
    pub fn unset_header(&mut self, name: &str) {
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }

    pub fn set_reason(&mut self, reason: &str) {
        self.reason = Some(reason.to_string());
    }

    #[must_use]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }
}

impl<'a> IntoIterator for &'a Http11Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.iter()
    }
}

impl fmt::Display for Http11Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(m), Some(u), Some(p)) = (&self.method, &self.url, &self.proto) {
            writeln!(f, "{m} {u} {p}\r")?;
        } else if let (Some(s), Some(r), Some(p)) = (self.status, &self.reason, &self.proto) {
            writeln!(f, "{p} {s} {r}\r")?;
        }
        for h in &self.headers {
            writeln!(f, "{}: {}\r", h.name, h.value)?;
        }
        write!(f, "\r\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_header_replaces_first_and_drops_duplicates() {
        let mut h = Http11Headers::new_response(200, "OK", "HTTP/1.1");
        h.append_header("X-Foo", "1");
        h.append_header("X-Foo", "2");
        h.set_header("X-Foo", "3");
        assert_eq!(h.field("x-foo"), Some("3"));
        assert_eq!(h.headers().len(), 1);
    }

    #[test]
    fn unset_header_removes_all_matches() {
        let mut h = Http11Headers::new_request("GET", "/", "HTTP/1.1");
        h.append_header("Range", "bytes=0-1");
        h.append_header("range", "bytes=2-3");
        h.unset_header("RANGE");
        assert!(h.field("Range").is_none());
    }
}
