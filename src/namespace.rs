//! Pure path/key translation between the hierarchical view FSBridge works
//! with and the flat remote object keyspace and the [`MetaStore`]'s
//! container addressing. Holds no state of its own.

/// Splits `path` (no leading slash, `/`-separated, empty for root) into its
/// parent directory path and final segment. Returns `None` for the root.
pub fn split(path: &str) -> Option<(&str, &str)> {
    if path.is_empty() {
        return None;
    }
    match path.rfind('/') {
        Some(i) => Some((&path[..i], &path[i + 1..])),
        None => Some(("", path)),
    }
}

/// Joins a parent directory path and a child segment into a path.
pub fn join(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{parent}/{segment}")
    }
}

/// Derives (parent path, terminal segment, is_directory) from a remote
/// object key. A key ending in `/` names a directory.
pub fn from_object_key(key: &str) -> (String, String, bool) {
    let is_dir = key.ends_with('/');
    let trimmed = key.trim_end_matches('/');
    match split(trimmed) {
        Some((parent, segment)) => (parent.to_string(), segment.to_string(), is_dir),
        None => (String::new(), String::new(), is_dir),
    }
}

/// The remote object key a directory uses as a `ListObjectsV2` prefix.
pub fn list_prefix(dir_path: &str) -> String {
    if dir_path.is_empty() {
        String::new()
    } else {
        format!("{}/", dir_path.trim_end_matches('/'))
    }
}

/// The remote object key for a file at `path`.
pub fn object_key(path: &str) -> String {
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_root_is_none() {
        assert_eq!(split(""), None);
    }

    #[test]
    fn split_top_level() {
        assert_eq!(split("a"), Some(("", "a")));
    }

    #[test]
    fn split_nested() {
        assert_eq!(split("a/b/c"), Some(("a/b", "c")));
    }

    #[test]
    fn join_round_trips_split() {
        assert_eq!(join("a/b", "c"), "a/b/c");
        assert_eq!(join("", "c"), "c");
    }

    #[test]
    fn object_key_from_directory_key() {
        assert_eq!(from_object_key("a/b/"), ("a".to_string(), "b".to_string(), true));
    }

    #[test]
    fn object_key_from_file_key() {
        assert_eq!(from_object_key("a/b"), ("a".to_string(), "b".to_string(), false));
    }

    #[test]
    fn list_prefix_for_root() {
        assert_eq!(list_prefix(""), "");
        assert_eq!(list_prefix("a"), "a/");
    }
}
