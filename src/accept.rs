//! Accept-Encoding evaluation.

/// Returns whether the Accept-Encoding header value admits gzip.
///
/// The header value is expected to be comma-separated encodings with
/// optional quality values (e.g., "gzip, br;q=1.0, identity;q=0.5").
/// An entry with `q=0` refuses the encoding.
pub(crate) fn accepts_gzip(header: &str) -> bool {
    for part in header.split(',') {
        let (encoding, quality) = parse_encoding_with_quality(part.trim());

        if quality == 0.0 {
            continue;
        }

        if encoding.eq_ignore_ascii_case("gzip") || encoding.eq_ignore_ascii_case("x-gzip") {
            return true;
        }
    }

    false
}

/// Parses an encoding entry like "gzip" or "gzip;q=0.8" into (encoding, quality).
fn parse_encoding_with_quality(s: &str) -> (&str, f32) {
    let mut parts = s.splitn(2, ';');
    let encoding = parts.next().unwrap_or("").trim();

    let quality = parts
        .next()
        .and_then(|q| {
            let q = q.trim();
            if q.starts_with("q=") || q.starts_with("Q=") {
                q[2..].parse::<f32>().ok()
            } else {
                None
            }
        })
        .unwrap_or(1.0);

    (encoding, quality)
}
