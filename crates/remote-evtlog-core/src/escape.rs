//! Message text escaping.

/// Double every backslash. Nothing else is altered.
#[must_use]
pub fn escape_backslashes(text: &str) -> String {
    let extra = text.bytes().filter(|&b| b == b'\\').count();
    if extra == 0 {
        return text.to_owned();
    }
    let mut out = String::with_capacity(text.len() + extra);
    for ch in text.chars() {
        if ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_each_backslash() {
        let raw = r"C:\Windows\System32\svchost.exe -k \\netsvcs";
        let escaped = escape_backslashes(raw);
        let count = |s: &str| s.chars().filter(|&c| c == '\\').count();
        assert_eq!(count(&escaped), 2 * count(raw));
        assert_eq!(escaped.replace(r"\\", r"\"), raw);
    }

    #[test]
    fn test_other_characters_untouched() {
        let raw = "Service \"Spooler\" entered\nthe running state. ünïcødé";
        assert_eq!(escape_backslashes(raw), raw);
    }

    #[test]
    fn test_empty() {
        assert_eq!(escape_backslashes(""), "");
    }
}
