//! Local filename derivation for downloads.
//!
//! Prefers the Content-Disposition filename when the server sends one,
//! otherwise the last URL path segment, sanitized for Linux filesystems.

/// Fallback when neither URL path nor Content-Disposition yields a name.
const DEFAULT_FILENAME: &str = "download.bin";

/// Derives a safe filename for saving a download.
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    let candidate = content_disposition
        .and_then(disposition_filename)
        .filter(|s| !s.is_empty())
        .or_else(|| url_path_filename(url));

    let raw = match candidate {
        Some(c) => c,
        None => return DEFAULT_FILENAME.to_string(),
    };

    let sanitized = sanitize(&raw);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// Last non-empty path segment of `url`, or None for root/unparseable URLs.
fn url_path_filename(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .next_back()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Extracts `filename=` from a Content-Disposition value. Handles the quoted
/// and bare-token forms; the RFC 5987 `filename*` form is not attempted.
fn disposition_filename(header_value: &str) -> Option<String> {
    for param in header_value.split(';') {
        let param = param.trim();
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("filename") {
            continue;
        }
        let value = value.trim();
        let unquoted = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        if !unquoted.is_empty() {
            return Some(unquoted.to_string());
        }
    }
    None
}

/// Replace path separators and control characters, trim dot/space edges,
/// collapse runs of `_`, and cap at 255 bytes (NAME_MAX).
fn sanitize(name: &str) -> String {
    const NAME_MAX: usize = 255;

    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;
    for c in name.chars() {
        let keep = !(c == '\0' || c == '/' || c == '\\' || c == ' ' || c == '\t' || c.is_control());
        if keep {
            out.push(c);
            prev_underscore = false;
        } else if !prev_underscore {
            out.push('_');
            prev_underscore = true;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    if trimmed.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}
