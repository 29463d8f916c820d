/// Normalize a device name to the identity of its physical instrument
///
/// Trims, lowercases and removes a trailing `<whitespace><digits>` suffix so
/// that numbered ports of one instrument share a name:
/// `"Launchkey MK4 2"` → `"launchkey mk4"`. Digits not preceded by
/// whitespace are kept (`"Port2"` → `"port2"`).
///
/// Suffixes are removed until none is left, so applying the function to its
/// own output returns it unchanged.
pub fn base_name(name: &str) -> String {
    let mut base = name.trim().to_lowercase();
    while let Some(stripped) = strip_index_suffix(&base) {
        base.truncate(stripped);
    }
    base
}

/// Byte length of `s` without its `<whitespace><digits>` suffix, if it has one
fn strip_index_suffix(s: &str) -> Option<usize> {
    let without_digits = s.trim_end_matches(|c: char| c.is_ascii_digit());
    if without_digits.len() == s.len() {
        return None;
    }

    let without_space = without_digits.trim_end_matches(char::is_whitespace);
    if without_space.len() == without_digits.len() {
        return None;
    }

    Some(without_space.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_port_index() {
        assert_eq!(base_name("Launchkey MK4 2"), "launchkey mk4");
        assert_eq!(base_name("Launchkey 2"), "launchkey");
        assert_eq!(base_name("Korg 1"), "korg");
    }

    #[test]
    fn test_plain_names_lowercased() {
        assert_eq!(base_name("Arturia"), "arturia");
        assert_eq!(base_name("  MiniLab mkII  "), "minilab mkii");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(base_name(""), "");
        assert_eq!(base_name("   "), "");
    }

    #[test]
    fn test_digits_without_whitespace_kept() {
        assert_eq!(base_name("Port2"), "port2");
        assert_eq!(base_name("TR-8S"), "tr-8s");
        assert_eq!(base_name("42"), "42");
    }

    #[test]
    fn test_multiple_spaces_and_tabs() {
        assert_eq!(base_name("Synth   12"), "synth");
        assert_eq!(base_name("Synth\t3"), "synth");
    }

    #[test]
    fn test_idempotent() {
        for name in [
            "Launchkey MK4 2",
            "Arturia",
            "",
            "Port2",
            "Device 2 3",
            "1 2",
            "  Mixed Case 007 ",
            "Ünïcödé 9",
        ] {
            let once = base_name(name);
            assert_eq!(base_name(&once), once, "not idempotent for {:?}", name);
        }
    }

    #[test]
    fn test_stacked_suffixes_fully_removed() {
        assert_eq!(base_name("Device 2 3"), "device");
        assert_eq!(base_name("1 2"), "1");
    }
}
