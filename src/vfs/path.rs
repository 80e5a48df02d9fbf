//! Path normalization and glob matching for the VFS namespace.
//!
//! Paths are POSIX-style: `/` separated, absolute, `.`/`..` collapsed during
//! normalization. All comparisons use code-point-level ASCII lower-casing so
//! behavior never depends on locale.

/// A normalized, absolute path: a sequence of non-empty segments, no `.` or
/// `..` remaining.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPath {
    segments: Vec<String>,
}

impl NormalizedPath {
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Normalize `path`, resolving relative to `base` if `path` is not
    /// absolute. Accepts both `/` and `\` as separators. `..` at root is a
    /// no-op rather than an error.
    pub fn resolve(path: &str, base: &NormalizedPath) -> Self {
        let is_absolute = path.starts_with('/') || path.starts_with('\\');
        let mut segments = if is_absolute {
            Vec::new()
        } else {
            base.segments.clone()
        };

        for raw in path.split(['/', '\\']) {
            match raw {
                "" | "." => continue,
                ".." => {
                    segments.pop();
                }
                seg => segments.push(seg.to_string()),
            }
        }

        Self { segments }
    }

    /// Append one segment, returning a new path (used when walking a
    /// directory tree rather than parsing user input).
    pub fn join(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self { segments })
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Render as an absolute path string, optionally with a trailing slash
    /// (directories end with `/`, files do not).
    pub fn display(&self, trailing_slash: bool) -> String {
        let mut s = String::from("/");
        s.push_str(&self.segments.join("/"));
        if trailing_slash && !s.ends_with('/') {
            s.push('/');
        }
        s
    }
}

/// Case-insensitive (ASCII-only) equality, used for top-level synthesized
/// name lookups as well as container-internal name resolution.
pub fn eq_ignore_ascii_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Whether `segments` starts with `prefix`, comparing each segment
/// case-insensitively (ASCII only). Used by the overlay to find entries
/// nested under a directory being listed.
pub fn segments_start_with(segments: &[String], prefix: &[String]) -> bool {
    segments.len() >= prefix.len()
        && segments
            .iter()
            .zip(prefix)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
}

/// Compile a `*`/`?` search pattern into a matcher usable against a single
/// path segment (file or directory name). `*` matches any run of
/// characters (including none); `?` matches exactly one character.
/// Matching is case-insensitive and anchored to the whole name.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().flat_map(|c| c.to_lowercase()).collect();
    let name: Vec<char> = name.chars().flat_map(|c| c.to_lowercase()).collect();
    glob_match_chars(&pattern, &name)
}

fn glob_match_chars(pattern: &[char], name: &[char]) -> bool {
    // classic DP-free recursive matcher; pattern/name segments are short
    // (file names), so this is not a performance concern.
    match pattern.first() {
        None => name.is_empty(),
        Some('*') => {
            glob_match_chars(&pattern[1..], name)
                || (!name.is_empty() && glob_match_chars(pattern, &name[1..]))
        }
        Some('?') => !name.is_empty() && glob_match_chars(&pattern[1..], &name[1..]),
        Some(c) => name.first() == Some(c) && glob_match_chars(&pattern[1..], &name[1..]),
    }
}
