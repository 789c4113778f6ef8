use crate::error::GateError;

/// Normalizes a request path into the exact form that is both classified and
/// forwarded upstream.
///
/// Empty and `.` segments are dropped, `..` pops the previous segment (never
/// past the root), and percent-encoded dots count as dots. Encoded slashes and
/// backslashes are refused outright: upstreams disagree on whether they
/// separate segments.
pub fn canonical_path(raw: &str) -> Result<String, GateError> {
    if raw.contains('\\') {
        return Err(GateError::MalformedPath);
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        let lowered = segment.to_ascii_lowercase();
        if lowered.contains("%2f") || lowered.contains("%5c") {
            return Err(GateError::MalformedPath);
        }
        match decode_dots(&lowered).as_deref() {
            Some("") | Some(".") => {}
            Some("..") => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    let mut path = String::with_capacity(raw.len());
    for segment in &segments {
        path.push('/');
        path.push_str(segment);
    }
    if path.is_empty() || (raw.ends_with('/') && !segments.is_empty()) {
        path.push('/');
    }
    Ok(path)
}

/// The segment with `%2e` spelled as `.`, or `None` if anything else is in it.
fn decode_dots(lowered: &str) -> Option<String> {
    let decoded = lowered.replace("%2e", ".");
    decoded.chars().all(|c| c == '.').then_some(decoded)
}
