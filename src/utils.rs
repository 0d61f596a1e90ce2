/// Object key utility functions / 对象键工具函数

/// Path segment delimiter used for pseudo-directories / 伪目录分隔符
pub const DELIMITER: &str = "/";

/// Normalize a user path into an object key / 将用户路径转换为对象键
/// Removes exactly one leading separator; nothing else is touched
/// (no collapsing of `//`, no `.`/`..` resolution).
pub fn normalize_path(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Directory prefix for listing queries / 目录查询前缀
/// Empty path lists the bucket root, otherwise a trailing `/` is ensured.
pub fn dir_prefix(path: &str) -> String {
    let key = normalize_path(path);
    if key.is_empty() || key.ends_with('/') {
        key.to_string()
    } else {
        format!("{}/", key)
    }
}

/// Join a directory key and a file name / 拼接目录和文件名
pub fn join_key(dir: &str, name: &str) -> String {
    let dir = normalize_path(dir).trim_end_matches('/');
    let name = name.trim_start_matches('/');

    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Whether a key is a directory marker object / 是否为目录占位对象
pub fn is_dir_marker(key: &str) -> bool {
    key.ends_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/a/b.txt"), "a/b.txt");
        assert_eq!(normalize_path("a/b.txt"), "a/b.txt");
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path(""), "");
        // only one separator is removed
        assert_eq!(normalize_path("//a"), "/a");
        assert_eq!(normalize_path("/a//b/../c"), "a//b/../c");
    }

    #[test]
    fn test_normalize_path_idempotent() {
        for p in ["/a", "a", "/dir/sub/", "", "/", "x/./y"] {
            let once = normalize_path(p);
            assert_eq!(normalize_path(once), once, "path {:?}", p);
        }
    }

    #[test]
    fn test_dir_prefix() {
        assert_eq!(dir_prefix(""), "");
        assert_eq!(dir_prefix("/"), "");
        assert_eq!(dir_prefix("dir"), "dir/");
        assert_eq!(dir_prefix("/dir/"), "dir/");
        assert_eq!(dir_prefix("/a/b"), "a/b/");
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("", "f.txt"), "f.txt");
        assert_eq!(join_key("/", "f.txt"), "f.txt");
        assert_eq!(join_key("/uploads", "f.txt"), "uploads/f.txt");
        assert_eq!(join_key("uploads/", "/f.txt"), "uploads/f.txt");
    }

    #[test]
    fn test_is_dir_marker() {
        assert!(is_dir_marker("dir/"));
        assert!(!is_dir_marker("dir/a"));
    }
}
