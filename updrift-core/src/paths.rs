use std::path::Path;

/// Lexically normalizes a remote path: rewrites backslashes to `/`, resolves
/// `.` and `..` segments, collapses duplicate separators and strips any
/// trailing separator. No filesystem access.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/') || path.starts_with('\\');
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(stack.last(), Some(&"..")) || (stack.is_empty() && !absolute) {
                    stack.push("..");
                } else {
                    stack.pop();
                }
            }
            other => stack.push(other),
        }
    }
    if absolute {
        format!("/{}", stack.join("/"))
    } else if stack.is_empty() {
        ".".to_string()
    } else {
        stack.join("/")
    }
}

/// Computes the remote destination for a local file: the path of `local`
/// relative to `watch_root`, separator-rewritten, prefixed with
/// `remote_root` and then normalized. Returns `None` when `local` does not
/// live under `watch_root`.
pub fn remote_path_for(remote_root: &str, local: &Path, watch_root: &Path) -> Option<String> {
    let relative = local.strip_prefix(watch_root).ok()?;
    let relative = relative.to_string_lossy().replace('\\', "/");
    let root = remote_root.trim_end_matches(['/', '\\']);
    Some(normalize(&format!("{root}/{relative}")))
}

/// True iff the normalized candidate equals the normalized root or is a
/// separator-delimited descendant of it. Normalization happens before the
/// comparison, so `..` climbs are rejected even when the rewritten text no
/// longer contains a literal `..`.
pub fn is_within_root(root: &str, candidate: &str) -> bool {
    let root = normalize(root);
    let candidate = normalize(candidate);
    if candidate == root {
        return true;
    }
    if root == "/" {
        return candidate.starts_with('/');
    }
    candidate.starts_with(&root) && candidate.as_bytes().get(root.len()) == Some(&b'/')
}

/// Parent of a remote path, `None` for the root or a bare name.
pub fn parent_dir(remote: &str) -> Option<&str> {
    let trimmed = remote.trim_end_matches('/');
    let (parent, _) = trimmed.rsplit_once('/')?;
    if parent.is_empty() { None } else { Some(parent) }
}
