//! The flag sub-language of timetable rows.
//!
//! The simulator annotates rows with a compact string of markers, e.g.
//! `"D"` (pass-through without stopping), `"E(2764)"` (the train continues as
//! a replacement train with the given id), `"K(2764)"` (couples onto the
//! given train), `"F(2764)"` (splits off a new train), `"L"` (loco runs
//! around), `"R"` (direction reversal) and `"W[2][4]"` (loco change).
//! Several markers may be concatenated in one string.

/// Row is a pass-through, the train does not stop.
pub fn pass_through(flags: &str) -> bool {
    flags.contains('D')
}

/// The train ends here and continues under a new number.
pub fn replacement_zid(flags: &str) -> Option<i32> {
    linked_zid(flags, 'E')
}

/// The train ends here by coupling onto the given train.
pub fn coupling_zid(flags: &str) -> Option<i32> {
    linked_zid(flags, 'K')
}

/// A new train splits off here.
pub fn split_zid(flags: &str) -> Option<i32> {
    linked_zid(flags, 'F')
}

/// The train reverses direction at this stop.
pub fn direction_reversal(flags: &str) -> bool {
    flags.contains('R')
}

/// The locomotive runs around the train at this stop.
pub fn loco_move(flags: &str) -> bool {
    flags.contains('L')
}

/// The locomotive is exchanged at this stop, `W[..][..]`.
pub fn loco_change(flags: &str) -> bool {
    match flags.find('W') {
        Some(index) => flags[index + 1..].starts_with('['),
        None => false,
    }
}

/// Parses the `zid` out of a `<marker>(<zid>)` group.
fn linked_zid(flags: &str, marker: char) -> Option<i32> {
    let rest = &flags[flags.find(marker)? + marker.len_utf8()..];
    let rest = rest.strip_prefix('(')?;
    let digits = &rest[..rest.find(')')?];
    match digits.parse() {
        Ok(zid) => Some(zid),
        Err(_) => {
            log::debug!("unparsable zid in flags {:?}", flags);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_flags() {
        assert!(!pass_through(""));
        assert_eq!(replacement_zid(""), None);
        assert!(!loco_change(""));
    }

    #[test]
    fn linked_train_ids() {
        assert_eq!(replacement_zid("E(2764)"), Some(2764));
        assert_eq!(coupling_zid("K(31)"), Some(31));
        assert_eq!(split_zid("F(102764)"), Some(102764));
        assert_eq!(replacement_zid("K(31)"), None);
    }

    #[test]
    fn combined_markers() {
        let flags = "RF(2764)";
        assert!(direction_reversal(flags));
        assert_eq!(split_zid(flags), Some(2764));
        assert_eq!(coupling_zid(flags), None);
    }

    #[test]
    fn malformed_groups_are_ignored() {
        assert_eq!(replacement_zid("E(27x4)"), None);
        assert_eq!(replacement_zid("E(2764"), None);
        assert_eq!(replacement_zid("E2764)"), None);
    }

    #[test]
    fn loco_change_needs_brackets() {
        assert!(loco_change("W[2][4]"));
        assert!(!loco_change("W"));
    }
}
