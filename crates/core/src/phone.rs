/// Canonical international form: a single leading `+` followed by digits only.
///
/// Returns `None` when the input holds no digits at all.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    Some(format!("+{digits}"))
}
