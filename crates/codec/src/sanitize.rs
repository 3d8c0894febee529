//! Title ↔ directory name mapping.
//!
//! Book titles become directory names, so anything a filesystem could choke
//! on is percent-escaped as `%XX` (upper-case hex). `%` itself is always
//! escaped, which is what makes [`desanitize`] an exact inverse.

use crate::error::{ErrorKind, Result};

const ESCAPE: char = '%';
const UNSAFE: [char; 10] = ['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>'];

/// Convert a book title into a filesystem-safe directory name.
///
/// # Examples
///
/// ```
/// use shelf_codec::{desanitize, sanitize};
///
/// let name = sanitize("Re:Zero / Vol. 1").unwrap();
/// assert_eq!(name, "Re%3AZero %2F Vol. 1");
/// assert_eq!(desanitize(&name), "Re:Zero / Vol. 1");
/// ```
pub fn sanitize(title: &str) -> Result<String> {
    if title.is_empty() {
        exn::bail!(ErrorKind::EmptyTitle);
    }
    let mut name = String::with_capacity(title.len());
    for (position, c) in title.char_indices() {
        // A leading dot would hide the directory, or turn "." and ".." into
        // references to the current/parent directory.
        if UNSAFE.contains(&c) || c.is_ascii_control() || (position == 0 && c == '.') {
            name.push_str(&format!("{ESCAPE}{:02X}", c as u32));
        } else {
            name.push(c);
        }
    }
    Ok(name)
}

/// Recover the original title from a directory name produced by [`sanitize`].
///
/// Escape sequences that don't decode to an ASCII character are kept as-is,
/// so directory names created by other tools come back unchanged.
#[must_use]
pub fn desanitize(name: &str) -> String {
    let mut title = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(index) = rest.find(ESCAPE) {
        title.push_str(&rest[..index]);
        let sequence = &rest[index..];
        match sequence.get(1..3).and_then(decode_hex) {
            Some(c) => {
                title.push(c);
                rest = &sequence[3..];
            },
            None => {
                title.push(ESCAPE);
                rest = &sequence[1..];
            },
        }
    }
    title.push_str(rest);
    title
}

fn decode_hex(digits: &str) -> Option<char> {
    // from_str_radix tolerates a leading '+', which no escape ever contains.
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(digits, 16).ok().filter(u8::is_ascii).map(char::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("Plain Title", "Plain Title")]
    #[case("a/b", "a%2Fb")]
    #[case("100%", "100%25")]
    #[case("Why?", "Why%3F")]
    #[case("..", "%2E.")]
    #[case(".hidden", "%2Ehidden")]
    #[case("v1.0", "v1.0")]
    #[case("tab\there", "tab%09here")]
    #[case("日本語のタイトル", "日本語のタイトル")]
    fn test_sanitize(#[case] title: &str, #[case] expected: &str) {
        assert_eq!(sanitize(title).unwrap(), expected);
    }

    #[test]
    fn test_sanitize_empty() {
        let err = sanitize("").unwrap_err();
        assert_eq!(*err, ErrorKind::EmptyTitle);
    }

    #[rstest]
    #[case("50%", "50%")]
    #[case("%zz", "%zz")]
    #[case("%+1", "%+1")]
    #[case("%C3%A9", "%C3%A9")]
    #[case("a%2", "a%2")]
    fn test_desanitize_foreign_names(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(desanitize(name), expected);
    }

    proptest! {
        #[test]
        fn sanitize_round_trip(title in "\\PC{1,64}") {
            let name = sanitize(&title).unwrap();
            prop_assert!(!name.contains('/'));
            prop_assert!(!name.starts_with('.'));
            prop_assert_eq!(desanitize(&name), title);
        }

        #[test]
        fn sanitize_round_trip_unsafe_heavy(title in "[./\\\\?%*:|\"<>a ]{1,32}") {
            prop_assert_eq!(desanitize(&sanitize(&title).unwrap()), title);
        }
    }
}
