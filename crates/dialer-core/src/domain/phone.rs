/// Shortest digit run we are willing to dial.
pub const MIN_PHONE_DIGITS: usize = 7;

/// Normalizes a dialable number to digits with an optional leading `+`.
///
/// Formatting characters are dropped and anything after an extension marker
/// is ignored. Returns `None` when fewer than [`MIN_PHONE_DIGITS`] remain.
pub fn normalize_phone(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut out = String::new();
    let mut digits = 0usize;

    if trimmed.starts_with('+') {
        out.push('+');
    }

    for ch in trimmed.chars() {
        if ch.is_ascii_digit() {
            out.push(ch);
            digits += 1;
            continue;
        }

        if matches!(ch, 'x' | 'X' | '#' | ';' | ',') {
            if digits == 0 {
                return None;
            }
            break;
        }
    }

    if digits < MIN_PHONE_DIGITS {
        return None;
    }

    Some(out)
}
