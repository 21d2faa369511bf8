//! URI parsing and handling per [RFC 3986](https://tools.ietf.org/html/rfc3986).
//!
//! Covers the subset of URI handling the runtime needs: parsing and
//! composing URI references, reference resolution against a base URI,
//! percent encoding, conversions between `file:` URIs and local paths, and
//! the `?file=<path>` query convention used to select a file underneath or
//! alongside a referenced entity.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// An error arising from URI parsing or conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriError(String);

impl UriError {
    fn new(message: impl Into<String>) -> UriError {
        UriError(message.into())
    }
}

impl fmt::Display for UriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid URI: {}", self.0)
    }
}

impl std::error::Error for UriError {}

/// A URI reference.
///
/// A URI reference is an (absolute) URI if and only if it has a scheme
/// component. The authority component is kept opaque; it is not decomposed
/// into user/host/port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Uri {
    scheme: Option<String>,
    authority: Option<String>,
    path: String,
    query: Option<String>,
    fragment: Option<String>,
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn check_component(component: &str, name: &str) -> Result<(), UriError> {
    if component
        .chars()
        .any(|c| c.is_ascii_control() || c == ' ' || c == '<' || c == '>')
    {
        return Err(UriError::new(format!(
            "illegal character in {name} component: '{component}'"
        )));
    }
    Ok(())
}

impl Uri {
    /// Parses a URI reference. An empty string yields the empty reference.
    pub fn parse(input: &str) -> Result<Uri, UriError> {
        let mut rest = input;

        let fragment = match rest.find('#') {
            Some(pos) => {
                let fragment = &rest[pos + 1..];
                rest = &rest[..pos];
                Some(fragment.to_string())
            }
            None => None,
        };
        let query = match rest.find('?') {
            Some(pos) => {
                let query = &rest[pos + 1..];
                rest = &rest[..pos];
                Some(query.to_string())
            }
            None => None,
        };
        let scheme = match rest.find(':') {
            Some(pos)
                if is_scheme(&rest[..pos])
                    && rest[..pos].find('/').is_none() =>
            {
                let scheme = &rest[..pos];
                rest = &rest[pos + 1..];
                Some(scheme.to_string())
            }
            _ => None,
        };
        let authority = match rest.strip_prefix("//") {
            Some(after) => {
                let end = after.find('/').unwrap_or(after.len());
                let authority = &after[..end];
                rest = &after[end..];
                Some(authority.to_string())
            }
            None => None,
        };
        let uri = Uri {
            scheme,
            authority,
            path: rest.to_string(),
            query,
            fragment,
        };
        uri.check()?;
        Ok(uri)
    }

    /// Composes a URI reference from its components. Each component must
    /// already conform to RFC 3986; no escaping is performed.
    pub fn from_components(
        scheme: Option<&str>,
        authority: Option<&str>,
        path: &str,
        query: Option<&str>,
        fragment: Option<&str>,
    ) -> Result<Uri, UriError> {
        let uri = Uri {
            scheme: scheme.map(str::to_string),
            authority: authority.map(str::to_string),
            path: path.to_string(),
            query: query.map(str::to_string),
            fragment: fragment.map(str::to_string),
        };
        if let Some(s) = &uri.scheme {
            if !is_scheme(s) {
                return Err(UriError::new(format!("invalid scheme: '{s}'")));
            }
        }
        uri.check()?;
        Ok(uri)
    }

    fn check(&self) -> Result<(), UriError> {
        if let Some(a) = &self.authority {
            check_component(a, "authority")?;
        }
        check_component(&self.path, "path")?;
        if let Some(q) = &self.query {
            check_component(q, "query")?;
        }
        if let Some(f) = &self.fragment {
            check_component(f, "fragment")?;
        }
        Ok(())
    }

    /// Returns the scheme component, if present.
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Returns the authority component, if present.
    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    /// Returns the path component.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the query component, if present.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the fragment component, if present.
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Whether this is an absolute URI, i.e. has a scheme.
    pub fn is_absolute(&self) -> bool {
        self.scheme.is_some()
    }

    /// Whether the reference is completely empty.
    pub fn is_empty(&self) -> bool {
        self.scheme.is_none()
            && self.authority.is_none()
            && self.path.is_empty()
            && self.query.is_none()
            && self.fragment.is_none()
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = &self.scheme {
            write!(f, "{s}:")?;
        }
        if let Some(a) = &self.authority {
            write!(f, "//{a}")?;
        }
        f.write_str(&self.path)?;
        if let Some(q) = &self.query {
            write!(f, "?{q}")?;
        }
        if let Some(fr) = &self.fragment {
            write!(f, "#{fr}")?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Uri, UriError> {
        Uri::parse(s)
    }
}

/// RFC 3986 section 5.2.4: removes `.` and `..` segments from a path.
fn remove_dot_segments(path: &str) -> String {
    let mut input = path.to_string();
    let mut output = String::with_capacity(path.len());
    while !input.is_empty() {
        if let Some(rest) = input.strip_prefix("../") {
            input = rest.to_string();
        } else if let Some(rest) = input.strip_prefix("./") {
            input = rest.to_string();
        } else if let Some(rest) = input.strip_prefix("/./") {
            input = format!("/{rest}");
        } else if input == "/." {
            input = "/".to_string();
        } else if let Some(rest) = input.strip_prefix("/../") {
            input = format!("/{rest}");
            pop_segment(&mut output);
        } else if input == "/.." {
            input = "/".to_string();
            pop_segment(&mut output);
        } else if input == "." || input == ".." {
            input.clear();
        } else {
            let start = usize::from(input.starts_with('/'));
            let end = input[start..]
                .find('/')
                .map(|p| p + start)
                .unwrap_or(input.len());
            output.push_str(&input[..end]);
            input = input.split_off(end);
        }
    }
    output
}

fn pop_segment(output: &mut String) {
    if let Some(pos) = output.rfind('/') {
        output.truncate(pos);
    } else {
        output.clear();
    }
}

/// RFC 3986 section 5.2.3: merges a relative path with a base path.
fn merge_paths(base: &Uri, reference_path: &str) -> String {
    if base.authority().is_some() && base.path().is_empty() {
        format!("/{reference_path}")
    } else {
        match base.path().rfind('/') {
            Some(pos) => format!("{}{}", &base.path()[..=pos], reference_path),
            None => reference_path.to_string(),
        }
    }
}

/// Resolves a URI reference relative to an absolute base URI, per RFC 3986
/// section 5.2.
pub fn resolve_reference(base: &Uri, reference: &Uri) -> Result<Uri, UriError> {
    if !base.is_absolute() {
        return Err(UriError::new("the base URI must be absolute"));
    }
    let target = if reference.is_absolute() {
        Uri {
            scheme: reference.scheme.clone(),
            authority: reference.authority.clone(),
            path: remove_dot_segments(reference.path()),
            query: reference.query.clone(),
            fragment: reference.fragment.clone(),
        }
    } else if reference.authority().is_some() {
        Uri {
            scheme: base.scheme.clone(),
            authority: reference.authority.clone(),
            path: remove_dot_segments(reference.path()),
            query: reference.query.clone(),
            fragment: reference.fragment.clone(),
        }
    } else if reference.path().is_empty() {
        Uri {
            scheme: base.scheme.clone(),
            authority: base.authority.clone(),
            path: base.path.clone(),
            query: reference.query.clone().or_else(|| base.query.clone()),
            fragment: reference.fragment.clone(),
        }
    } else if reference.path().starts_with('/') {
        Uri {
            scheme: base.scheme.clone(),
            authority: base.authority.clone(),
            path: remove_dot_segments(reference.path()),
            query: reference.query.clone(),
            fragment: reference.fragment.clone(),
        }
    } else {
        Uri {
            scheme: base.scheme.clone(),
            authority: base.authority.clone(),
            path: remove_dot_segments(&merge_paths(base, reference.path())),
            query: reference.query.clone(),
            fragment: reference.fragment.clone(),
        }
    };
    Ok(target)
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

/// Percent-encodes every character except RFC 3986 "unreserved" ones and
/// those listed in `exceptions`.
pub fn percent_encode(input: &str, exceptions: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for &byte in input.as_bytes() {
        if is_unreserved(byte) || exceptions.as_bytes().contains(&byte) {
            output.push(byte as char);
        } else {
            output.push_str(&format!("%{byte:02X}"));
        }
    }
    output
}

/// Decodes percent-encoded sequences. Accepts both upper- and lowercase
/// hexadecimal digits.
pub fn percent_decode(input: &str) -> Result<String, UriError> {
    let bytes = input.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| {
                    UriError::new(format!("invalid percent-encoded sequence in '{input}'"))
                })?;
            output.push(hex);
            i += 3;
        } else {
            output.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(output)
        .map_err(|_| UriError::new(format!("percent-decoded '{input}' is not valid UTF-8")))
}

/// Converts an absolute local filesystem path to a `file:` URI.
pub fn path_to_file_uri(path: &Path) -> Result<Uri, UriError> {
    if path.as_os_str().is_empty() {
        return Uri::from_components(Some("file"), None, "", None, None);
    }
    if !path.is_absolute() {
        return Err(UriError::new(format!(
            "cannot convert relative path '{}' to a file URI",
            path.display()
        )));
    }
    let path_str = path
        .to_str()
        .ok_or_else(|| UriError::new("path is not valid UTF-8"))?;
    #[cfg(windows)]
    let uri_path = {
        let forward = path_str.replace('\\', "/");
        let rooted = if forward.starts_with('/') {
            forward
        } else {
            format!("/{forward}")
        };
        percent_encode(&rooted, "/:")
    };
    #[cfg(not(windows))]
    let uri_path = percent_encode(path_str, "/:");
    Uri::from_components(Some("file"), Some(""), &uri_path, None, None)
}

/// Converts a `file:` URI to a local filesystem path.
pub fn file_uri_to_path(uri: &Uri) -> Result<PathBuf, UriError> {
    if uri.scheme() != Some("file") {
        return Err(UriError::new(format!("'{uri}' is not a file URI")));
    }
    match uri.authority() {
        None | Some("") | Some("localhost") => {}
        Some(other) => {
            return Err(UriError::new(format!(
                "cannot access files on remote authority '{other}'"
            )))
        }
    }
    let decoded = percent_decode(uri.path())?;
    #[cfg(windows)]
    {
        let trimmed = decoded
            .strip_prefix('/')
            .filter(|rest| rest.get(1..2) == Some(":"))
            .unwrap_or(&decoded);
        Ok(PathBuf::from(trimmed.replace('/', "\\")))
    }
    #[cfg(not(windows))]
    Ok(PathBuf::from(decoded))
}

/// Looks up the `file` parameter of a URI query and resolves it against
/// the entity referenced by `base_file_uri`:
///
/// - a relative `file=` value selects a file alongside (or underneath) the
///   directory containing the base entity;
/// - an absolute `file=<file-URI>` value selects that file directly;
/// - a missing `file` parameter selects the containing directory itself.
///
/// `uri` must be absolute.
pub fn file_query_uri_to_path(base_file_uri: &Uri, uri: &Uri) -> Result<PathBuf, UriError> {
    if !uri.is_absolute() {
        return Err(UriError::new(format!("'{uri}' is not an absolute URI")));
    }
    let base_dir = {
        let mut p = file_uri_to_path(base_file_uri)?;
        p.pop();
        p
    };
    let file_value = uri.query().and_then(|query| {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("file="))
    });
    match file_value {
        None => Ok(base_dir),
        Some(value) => {
            let decoded = percent_decode(value)?;
            if let Ok(file_uri) = Uri::parse(&decoded) {
                if file_uri.scheme() == Some("file") {
                    return file_uri_to_path(&file_uri);
                }
            }
            Ok(base_dir.join(decoded))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_components() {
        let empty = Uri::parse("").unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.path(), "");
        assert!(empty.scheme().is_none());

        let http = Uri::parse("http://user@example.com:1234/foo/bar?q=uux#frag").unwrap();
        assert_eq!(http.scheme(), Some("http"));
        assert_eq!(http.authority(), Some("user@example.com:1234"));
        assert_eq!(http.path(), "/foo/bar");
        assert_eq!(http.query(), Some("q=uux"));
        assert_eq!(http.fragment(), Some("frag"));
        assert_eq!(
            http.to_string(),
            "http://user@example.com:1234/foo/bar?q=uux#frag"
        );

        // A '?' after '#' belongs to the fragment.
        let file = Uri::parse("file:///foo/bar#frag?q=uux").unwrap();
        assert_eq!(file.scheme(), Some("file"));
        assert_eq!(file.authority(), Some(""));
        assert_eq!(file.path(), "/foo/bar");
        assert_eq!(file.query(), None);
        assert_eq!(file.fragment(), Some("frag?q=uux"));

        let mailto = Uri::parse("mailto:user@example.com").unwrap();
        assert_eq!(mailto.scheme(), Some("mailto"));
        assert_eq!(mailto.authority(), None);
        assert_eq!(mailto.path(), "user@example.com");

        let urn = Uri::parse("urn:foo:bar:baz").unwrap();
        assert_eq!(urn.scheme(), Some("urn"));
        assert_eq!(urn.path(), "foo:bar:baz");
    }

    #[test]
    fn test_relative_references() {
        let relative = Uri::parse("foo/bar?x#y").unwrap();
        assert!(!relative.is_absolute());
        assert_eq!(relative.path(), "foo/bar");
        assert_eq!(relative.query(), Some("x"));
        assert_eq!(relative.fragment(), Some("y"));

        // A colon in a later path segment does not make a scheme.
        let colon_path = Uri::parse("./a:b").unwrap();
        assert!(colon_path.scheme().is_none());
        assert_eq!(colon_path.path(), "./a:b");
    }

    #[test]
    fn test_invalid_uris_are_rejected() {
        assert!(Uri::parse("http://example.com/with space").is_err());
        assert!(Uri::from_components(Some("1http"), None, "/x", None, None).is_err());
    }

    // Reference resolution examples from RFC 3986, section 5.4.
    #[test]
    fn test_reference_resolution() {
        let base = Uri::parse("http://a/b/c/d;p?q").unwrap();
        let resolve = |r: &str| {
            resolve_reference(&base, &Uri::parse(r).unwrap())
                .unwrap()
                .to_string()
        };
        assert_eq!(resolve("g:h"), "g:h");
        assert_eq!(resolve("g"), "http://a/b/c/g");
        assert_eq!(resolve("./g"), "http://a/b/c/g");
        assert_eq!(resolve("g/"), "http://a/b/c/g/");
        assert_eq!(resolve("/g"), "http://a/g");
        assert_eq!(resolve("//g"), "http://g");
        assert_eq!(resolve("?y"), "http://a/b/c/d;p?y");
        assert_eq!(resolve("g?y"), "http://a/b/c/g?y");
        assert_eq!(resolve("#s"), "http://a/b/c/d;p?q#s");
        assert_eq!(resolve("g#s"), "http://a/b/c/g#s");
        assert_eq!(resolve("g?y#s"), "http://a/b/c/g?y#s");
        assert_eq!(resolve(";x"), "http://a/b/c/;x");
        assert_eq!(resolve("g;x"), "http://a/b/c/g;x");
        assert_eq!(resolve(""), "http://a/b/c/d;p?q");
        assert_eq!(resolve("."), "http://a/b/c/");
        assert_eq!(resolve("./"), "http://a/b/c/");
        assert_eq!(resolve(".."), "http://a/b/");
        assert_eq!(resolve("../"), "http://a/b/");
        assert_eq!(resolve("../g"), "http://a/b/g");
        assert_eq!(resolve("../.."), "http://a/");
        assert_eq!(resolve("../../"), "http://a/");
        assert_eq!(resolve("../../g"), "http://a/g");
        // Abnormal cases.
        assert_eq!(resolve("../../../g"), "http://a/g");
        assert_eq!(resolve("../../../../g"), "http://a/g");
        assert_eq!(resolve("/./g"), "http://a/g");
        assert_eq!(resolve("/../g"), "http://a/g");
        assert_eq!(resolve("g."), "http://a/b/c/g.");
        assert_eq!(resolve(".g"), "http://a/b/c/.g");
        assert_eq!(resolve("g.."), "http://a/b/c/g..");
        assert_eq!(resolve("..g"), "http://a/b/c/..g");
        assert_eq!(resolve("g?y/./x"), "http://a/b/c/g?y/./x");
        assert_eq!(resolve("g?y/../x"), "http://a/b/c/g?y/../x");
        assert_eq!(resolve("g#s/./x"), "http://a/b/c/g#s/./x");
        assert_eq!(resolve("g#s/../x"), "http://a/b/c/g#s/../x");
        assert_eq!(resolve("http:g"), "http:g");
    }

    #[test]
    fn test_percent_coding() {
        assert_eq!(percent_encode(" foo*/123;bar%", ""), "%20foo%2A%2F123%3Bbar%25");
        assert_eq!(percent_encode(" foo*/123;bar%", "/;"), "%20foo%2A/123;bar%25");
        assert_eq!(
            percent_decode("%20foo%2A%2F123%3Bbar%25").unwrap(),
            " foo*/123;bar%"
        );
        assert_eq!(
            percent_decode("%20foo%2a%2f123%3bbar%25").unwrap(),
            " foo*/123;bar%"
        );
        assert!(percent_decode("%G0").is_err());
        assert!(percent_decode("%0G").is_err());
    }

    #[test]
    fn test_file_uri_conversions() {
        assert_eq!(
            path_to_file_uri(Path::new("/foo bar/baz")).unwrap().to_string(),
            "file:///foo%20bar/baz"
        );
        assert_eq!(path_to_file_uri(Path::new("")).unwrap().to_string(), "file:");
        assert!(path_to_file_uri(Path::new("relative/path")).is_err());

        let to_path = |u: &str| file_uri_to_path(&Uri::parse(u).unwrap());
        assert_eq!(to_path("file:///foo%20bar/baz").unwrap(), PathBuf::from("/foo bar/baz"));
        assert_eq!(to_path("file:///c:/foo%20bar/baz").unwrap(), PathBuf::from("/c:/foo bar/baz"));
        assert_eq!(
            to_path("file://localhost/foo%20bar/baz").unwrap(),
            PathBuf::from("/foo bar/baz")
        );
        assert!(to_path("http://foo/bar").is_err());
        assert!(to_path("file://foo/bar").is_err());
    }

    #[test]
    fn test_file_query_conversions() {
        let base = Uri::parse("file:///c:/foo/bar").unwrap();
        let query = |u: &str| file_query_uri_to_path(&base, &Uri::parse(u).unwrap());
        assert_eq!(
            query("proxy://foo%20bar/bar?file=baz.txt").unwrap(),
            PathBuf::from("/c:/foo/baz.txt")
        );
        assert_eq!(
            query("http://foo%20bar/foo/bar?file=bar%20foo/baz.txt").unwrap(),
            PathBuf::from("/c:/foo/bar foo/baz.txt")
        );
        assert_eq!(
            query("proxy://foo/bar?file=file:///c:/baz.txt").unwrap(),
            PathBuf::from("/c:/baz.txt")
        );
        assert_eq!(
            query("http://foo%20baz/bar?foo=baz.txt").unwrap(),
            PathBuf::from("/c:/foo")
        );
        assert!(query("foo/bar/baz.txt").is_err());
    }
}
