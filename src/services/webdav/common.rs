//! Common utilities and shared functions for the WebDAV client

use std::borrow::Cow;

/// Property request sent with every PROPFIND
pub const PROPFIND_TEMPLATE: &str = r#"<d:propfind xmlns:d='DAV:'>
<d:prop>
	<d:displayname/>
	<d:resourcetype/>
	<d:getcontentlength/>
	<d:getcontenttype/>
	<d:getlastmodified/>
	<d:getetag/>
</d:prop>
</d:propfind>"#;

/// Build a standardized User-Agent string for all WebDAV requests
pub fn build_user_agent() -> String {
    format!("clouddav/{} (WebDAV-Client)", env!("CARGO_PKG_VERSION"))
}

/// Percent-escapes every `/`-separated segment of `path` on its own, so the
/// separators survive and everything inside a segment is encoded.
pub fn path_escape(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reverses [`path_escape`]. Returns `None` when the decoded bytes are not UTF-8.
pub fn path_unescape(path: &str) -> Option<String> {
    urlencoding::decode(path).ok().map(Cow::into_owned)
}

/// Form-style escaping used inside the Passport sign-in header
pub fn query_escape(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

pub fn fix_slash(s: &str) -> String {
    if s.ends_with('/') {
        s.to_string()
    } else {
        format!("{}/", s)
    }
}

pub fn fix_slashes(s: &str) -> String {
    if s.starts_with('/') {
        fix_slash(s)
    } else {
        fix_slash(&format!("/{}", s))
    }
}

/// Joins two path fragments with exactly one separator between them
pub fn join(base: &str, path: &str) -> String {
    let base = base.strip_suffix('/').unwrap_or(base);
    let path = path.strip_prefix('/').unwrap_or(path);
    format!("{}/{}", base, path)
}

/// Lexically normalizes a slash-separated path: collapses repeated
/// separators, drops `.` segments and resolves `..` against its parent.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Everything up to the final separator, normalized. `"a.txt"` yields `"."`
/// and `"/a.txt"` yields `"/"`.
pub fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => clean_path(&path[..=idx]),
        None => ".".to_string(),
    }
}

/// Last element of a path, ignoring trailing separators
pub fn base_name(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { ".".to_string() } else { "/".to_string() };
    }
    match trimmed.rfind('/') {
        Some(idx) => trimmed[idx + 1..].to_string(),
        None => trimmed.to_string(),
    }
}

/// Expands a directory path into every ancestor from the top down,
/// including the path itself: `/a/b` becomes `["/", "/a", "/a/b"]`.
pub fn split_path_to_hierarchy(full_path: &str) -> Vec<String> {
    let cleaned = clean_path(full_path);
    let mut result = Vec::new();
    let mut current = String::new();

    for part in cleaned.split('/') {
        if part.is_empty() {
            if result.is_empty() {
                current = "/".to_string();
                result.push(current.clone());
            }
            continue;
        }

        current = if current.is_empty() {
            part.to_string()
        } else if current.ends_with('/') {
            format!("{}{}", current, part)
        } else {
            format!("{}/{}", current, part)
        };
        result.push(current.clone());
    }

    result
}

/// Lenient size parse: anything unparsable or negative counts as zero
pub fn parse_i64(value: &str) -> i64 {
    value.trim().parse::<i64>().ok().filter(|n| *n >= 0).unwrap_or(0)
}
