use hamstercage::manifest::Mode;
use hamstercage::utils::formatters::format_mode;
use hamstercage::utils::normalize_entry_path;
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_mode_text_round_trip(bits in 0u32..=0o7777) {
        let mode = Mode::new(bits);
        prop_assert_eq!(Mode::parse(&mode.to_string()).unwrap(), mode);
        prop_assert_eq!(Mode::parse(&format!("{bits:o}")).unwrap(), mode);
        prop_assert_eq!(Mode::parse(&format!("0{bits:o}")).unwrap(), mode);
    }

    #[test]
    fn test_mode_rejects_decimal_digits(prefix in "[0-7]{0,2}", bad in "[89]", suffix in "[0-7]{0,1}") {
        let text = format!("{prefix}{bad}{suffix}");
        prop_assert!(Mode::parse(&text).is_err());
    }

    #[test]
    fn test_normalized_paths_are_stable(
        parts in prop::collection::vec("[a-zA-Z0-9_.-]{1,8}", 1..6),
        leading in any::<bool>(),
        trailing in any::<bool>(),
    ) {
        prop_assume!(parts.iter().all(|p| p != "." && p != ".."));
        let mut path = parts.join("/");
        if leading {
            path.insert(0, '/');
        }
        if trailing {
            path.push('/');
        }

        let normalized = normalize_entry_path(&path).unwrap();
        prop_assert!(!normalized.starts_with('/'));
        prop_assert!(!normalized.ends_with('/'));
        prop_assert_eq!(&normalized, &parts.join("/"));
        prop_assert_eq!(normalize_entry_path(&normalized).unwrap(), normalized);
    }

    #[test]
    fn test_format_mode_shape(bits in 0u32..=0o7777) {
        let text = format_mode('-', bits);
        prop_assert_eq!(text.chars().count(), 10);
        prop_assert!(text.starts_with('-'));
    }
}
