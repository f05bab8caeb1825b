//! Pure render helpers shared by the TUI and the transaction scanner.

/// Truncate a string to `max` characters, appending an ellipsis when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return s.chars().take(max).collect();
    }
    let kept: String = s.chars().take(max - 3).collect();
    format!("{kept}...")
}

/// Insert thousands separators into the integer part of a decimal string.
///
/// Leaves the sign and any fractional part untouched: `-1234567.89` becomes
/// `-1,234,567.89`.
pub fn group_thousands(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };

    let n = digits.len();
    if n <= 3 {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len() + n / 3);
    out.push_str(sign);
    let lead = n % 3;
    if lead > 0 {
        out.push_str(&digits[..lead]);
        out.push(',');
    }
    for (i, chunk) in digits[lead..].as_bytes().chunks(3).enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(std::str::from_utf8(chunk).expect("ascii digits"));
    }

    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Render a float at fixed precision with thousands separators.
pub fn format_float(value: f64, decimals: usize) -> String {
    group_thousands(&format!("{value:.decimals$}"))
}

/// Shorten an address for list views: `0x1234..abcd`.
pub fn short_address(addr: &str) -> String {
    let addr = addr.trim();
    if addr.len() <= 10 {
        return addr.to_string();
    }
    format!("{}..{}", &addr[..6], &addr[addr.len() - 4..])
}

/// Replace every alphanumeric character with `*`, keeping punctuation so the
/// shape of the value stays readable in privacy mode.
pub fn mask(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { '*' } else { c })
        .collect()
}

/// Mask an address but keep the `0x` prefix and the last two characters.
pub fn mask_address(addr: &str) -> String {
    if addr.len() <= 4 {
        return mask(addr);
    }
    let (head, tail) = addr.split_at(2);
    let (mid, last) = tail.split_at(tail.len() - 2);
    format!("{head}{}{last}", "*".repeat(mid.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_and_long() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("hello", 2), "he");
    }

    #[test]
    fn group_thousands_basic() {
        assert_eq!(group_thousands("123"), "123");
        assert_eq!(group_thousands("1234"), "1,234");
        assert_eq!(group_thousands("1234567"), "1,234,567");
        assert_eq!(group_thousands("-1234567.89"), "-1,234,567.89");
        assert_eq!(group_thousands("0.5"), "0.5");
        assert_eq!(group_thousands(""), "");
    }

    #[test]
    fn format_float_rounds() {
        assert_eq!(format_float(1234.567, 2), "1,234.57");
        assert_eq!(format_float(0.0, 2), "0.00");
    }

    #[test]
    fn short_address_keeps_ends() {
        assert_eq!(
            short_address("0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B"),
            "0xAb58..eC9B"
        );
        assert_eq!(short_address("0x1234"), "0x1234");
    }

    #[test]
    fn mask_address_keeps_prefix() {
        let masked = mask_address("0xAb5801a7");
        assert!(masked.starts_with("0x"));
        assert!(masked.ends_with("a7"));
        assert!(masked.contains('*'));
    }
}
