use crate::models::RatioKind;
use chrono::{DateTime, NaiveDate};

// ── Parsers ───────────────────────────────────────────────────────────────────

fn is_blank(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "" | "n/a" | "na" | "-" | "—" | "--" | "nan" | "null"
    )
}

/// Parse a table number: thousands separators, a trailing `x` multiple marker,
/// `%` and K/M/B/T magnitude suffixes are understood.
/// "1,234.56" → 1234.56 | "23.4x" → 23.4 | "1.2B" → 1.2e9 | "(3.1)" → -3.1
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if is_blank(s) {
        return None;
    }

    let (negative, s) = match s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };

    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%' | ' ' | '\u{a0}'))
        .collect();
    let cleaned = cleaned.trim_end_matches(|c: char| c == 'x' || c == 'X');

    let (num_str, multiplier) = match cleaned.chars().last()? {
        'T' => (&cleaned[..cleaned.len() - 1], 1e12),
        'B' => (&cleaned[..cleaned.len() - 1], 1e9),
        'M' => (&cleaned[..cleaned.len() - 1], 1e6),
        'K' => (&cleaned[..cleaned.len() - 1], 1e3),
        _ => (cleaned, 1.0),
    };

    let value: f64 = num_str.parse().ok()?;
    let value = value * multiplier;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Parse dates: "Feb 20, 2024" (investing.com) or ISO
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    ["%b %d, %Y", "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%d %b %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Unix seconds → UTC calendar date.
pub fn date_from_unix(ts: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}

pub fn normalise_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Map a statistics-table label to a ratio kind. Forward and other variants
/// are deliberately not matched.
pub fn ratio_kind_for_label(label: &str) -> Option<RatioKind> {
    let key: String = label
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    match key.as_str() {
        "peratio" | "p/e" | "p/eratio" | "pe" | "trailingpe" | "trailingp/e" | "price/earnings" => {
            Some(RatioKind::Pe)
        }
        "psratio" | "p/s" | "p/sratio" | "ps" | "price/sales" => Some(RatioKind::Ps),
        "pbratio" | "p/b" | "p/bratio" | "pb" | "price/book" => Some(RatioKind::Pb),
        "ev/ebitda" | "evebitda" | "ev/ebitdaratio" | "enterprisevalue/ebitda" => {
            Some(RatioKind::EvEbitda)
        }
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1,234.56"), Some(1234.56));
        assert_eq!(parse_number("23.4x"), Some(23.4));
        assert_eq!(parse_number("1.5B"), Some(1.5e9));
        assert_eq!(parse_number("345K"), Some(345_000.0));
        assert_eq!(parse_number("(3.1)"), Some(-3.1));
        assert_eq!(parse_number("2.5%"), Some(2.5));
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number("—"), None);
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 20);
        assert_eq!(parse_date("Feb 20, 2024"), expected);
        assert_eq!(parse_date("2024-02-20"), expected);
        assert_eq!(parse_date("02/20/2024"), expected);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_date_from_unix() {
        assert_eq!(date_from_unix(1_704_067_200), NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn test_ratio_labels() {
        assert_eq!(ratio_kind_for_label("PE Ratio"), Some(RatioKind::Pe));
        assert_eq!(ratio_kind_for_label(" P/S Ratio "), Some(RatioKind::Ps));
        assert_eq!(ratio_kind_for_label("PB Ratio"), Some(RatioKind::Pb));
        assert_eq!(ratio_kind_for_label("EV / EBITDA"), Some(RatioKind::EvEbitda));
        assert_eq!(ratio_kind_for_label("Forward PE"), None);
        assert_eq!(ratio_kind_for_label("PEG Ratio"), None);
    }
}
