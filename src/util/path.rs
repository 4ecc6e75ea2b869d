use serde::Deserialize;

/// How skip patterns are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Containment of `/<pattern>` or `<pattern>/`, or exact equality.
    /// A pattern can match a fragment of a longer name (`"b"` skips `a/bx`).
    #[default]
    Substring,
    /// Anchored glob matching with `*`, `?` and `**`.
    Glob,
}

/// Replace Windows separators with forward slashes.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Join a relative folder prefix and a name with `/`.
pub fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// The folder part of a relative path: everything before the last `/`,
/// or the empty string for a top-level entry.
pub fn parent_folder(relative: &str) -> &str {
    match relative.rsplit_once('/') {
        Some((parent, _)) => parent,
        None => "",
    }
}

/// The last component of a relative path.
pub fn file_name(relative: &str) -> &str {
    relative.rsplit('/').next().unwrap_or(relative)
}

/// Check whether `path` matches any of `patterns` under the given mode.
pub fn matches(path: &str, patterns: &[String], mode: MatchMode) -> bool {
    match mode {
        MatchMode::Substring => should_skip(path, patterns),
        MatchMode::Glob => matches_glob(path, patterns),
    }
}

/// Substring skip rule.
///
/// Each pattern has one trailing `/*` stripped and then matches when the
/// normalized path contains `/<pattern>`, contains `<pattern>/`, or equals
/// `<pattern>`. No wildcard characters are interpreted.
pub fn should_skip(path: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }

    let normalized = normalize(path);
    patterns.iter().any(|pattern| {
        let clean = pattern.strip_suffix("/*").unwrap_or(pattern);
        normalized.contains(&format!("/{clean}"))
            || normalized.contains(&format!("{clean}/"))
            || normalized == clean
    })
}

/// Check whether a path matches any of the glob patterns.
pub fn matches_glob(path: &str, patterns: &[String]) -> bool {
    let normalized = normalize(path);
    let path = normalized.trim_start_matches('/');
    patterns.iter().any(|pattern| glob_match(pattern, path))
}

/// Glob matching supporting `*` (single segment) and `**` (any depth).
fn glob_match(pattern: &str, path: &str) -> bool {
    if pattern.contains("**") {
        let parts: Vec<&str> = pattern.split("**").collect();
        if parts.len() == 2 {
            let prefix = parts[0].trim_end_matches('/');
            let suffix = parts[1].trim_start_matches('/');

            if prefix.is_empty() {
                // `**/foo`: suffix may sit at any depth
                return suffix.is_empty()
                    || path.split('/').any(|segment| simple_glob(suffix, segment));
            }

            // `dir/**` or `dir/**/suffix`: any segment may match the prefix,
            // and what follows it must satisfy the suffix
            let segments: Vec<&str> = path.split('/').collect();
            for i in 0..segments.len() {
                if simple_glob(prefix, segments[i]) {
                    let rest = segments[i + 1..].join("/");
                    let suffix_ok = suffix.is_empty()
                        || simple_glob(suffix, &rest)
                        || rest.split('/').any(|seg| simple_glob(suffix, seg));
                    if suffix_ok {
                        return true;
                    }
                }
            }
            return false;
        }
    }

    if !pattern.contains('/') {
        return simple_glob(pattern, file_name(path));
    }

    simple_glob(pattern, path)
}

/// Match a glob with `*` and `?` only against a string.
///
/// Iterative with a single backtrack point: on a mismatch the most recent
/// `*` absorbs one more character. Linear in practice, quadratic at worst.
fn simple_glob(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    star = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pats(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parent_folder_and_file_name() {
        assert_eq!(parent_folder("a/b/c.txt"), "a/b");
        assert_eq!(parent_folder("c.txt"), "");
        assert_eq!(file_name("a/b/c.txt"), "c.txt");
        assert_eq!(file_name("c.txt"), "c.txt");
        assert_eq!(join("", "x"), "x");
        assert_eq!(join("a", "x"), "a/x");
    }

    #[test]
    fn test_skip_segment_match() {
        assert!(should_skip("a/b/c.txt", &pats(&["b"])));
        assert!(!should_skip("a/b/c.txt", &pats(&["bx"])));
    }

    #[test]
    fn test_skip_empty_patterns() {
        assert!(!should_skip("anything/at/all", &[]));
    }

    #[test]
    fn test_skip_exact_and_trailing_wildcard() {
        assert!(should_skip("node_modules", &pats(&["node_modules"])));
        assert!(should_skip(
            "/home/me/project/node_modules",
            &pats(&["node_modules/*"])
        ));
        assert!(should_skip("build/out.o", &pats(&["build/*"])));
        assert!(!should_skip("src/main.rs", &pats(&["build/*"])));
    }

    #[test]
    fn test_skip_backslashes_normalized() {
        assert!(should_skip(r"C:\Users\me\.git\config", &pats(&[".git"])));
    }

    #[test]
    fn test_skip_is_substring_not_anchored() {
        // "/b" is a prefix of "/bxy", so the loose rule matches.
        assert!(should_skip("a/bxy", &pats(&["b"])));
        // Wildcards are literal in substring mode.
        assert!(!should_skip("a/foo.tmp", &pats(&["*.tmp"])));
    }

    #[test]
    fn test_skip_order_independent() {
        let paths = ["a/b/c.txt", "x/.git/HEAD", "top.txt", "deep/node_modules/x"];
        let forward = pats(&["zzz", ".git", "node_modules/*"]);
        let mut reversed = forward.clone();
        reversed.reverse();
        for p in paths {
            assert_eq!(should_skip(p, &forward), should_skip(p, &reversed), "{p}");
        }
    }

    #[test]
    fn test_glob_star() {
        assert!(matches("foo.tmp", &pats(&["*.tmp"]), MatchMode::Glob));
        assert!(!matches("foo.txt", &pats(&["*.tmp"]), MatchMode::Glob));
    }

    #[test]
    fn test_glob_doublestar() {
        assert!(matches_glob("deep/nested/.git/config", &pats(&[".git/**"])));
        assert!(matches_glob("node_modules/foo/bar.js", &pats(&["node_modules/**"])));
        assert!(!matches_glob("src/main.rs", &pats(&["node_modules/**"])));
    }

    #[test]
    fn test_glob_is_anchored_per_segment() {
        assert!(!matches("a/bxy", &pats(&["b"]), MatchMode::Glob));
        assert!(matches("a/b", &pats(&["b"]), MatchMode::Glob));
        assert!(matches("x/thumbs.db", &pats(&["thumb?.db"]), MatchMode::Glob));
    }

    #[test]
    fn test_glob_with_combining_unicode() {
        let name = "Solidarita\u{308}tsanlass_24.2.2026.jpg";
        assert!(matches_glob(name, &pats(&["*.jpg"])));
        assert!(!matches_glob(name, &pats(&["*.png"])));
    }

    #[test]
    fn test_glob_with_slash_matches_relative_path() {
        assert!(matches("build/out.o", &pats(&["build/*.o"]), MatchMode::Glob));
        assert!(!matches("src/out.o", &pats(&["build/*.o"]), MatchMode::Glob));
        assert!(matches("docs/report.pdf", &pats(&["docs/*.pdf"]), MatchMode::Glob));
    }

    #[test]
    fn test_simple_glob_edges() {
        assert!(simple_glob("*", ""));
        assert!(simple_glob("", ""));
        assert!(!simple_glob("a*", ""));
        assert!(simple_glob("a*b*c", "aXXbYYc"));
        assert!(!simple_glob("a*b*c", "aXXbYY"));
        assert!(simple_glob("*.tar.*", "x.tar.gz"));
        assert!(simple_glob("??.txt", "ab.txt"));
        assert!(!simple_glob("??.txt", "abc.txt"));
    }

    #[test]
    fn test_many_stars_against_long_name() {
        let name = "a".repeat(200);
        assert!(!simple_glob("*a*a*a*a*a*a*a*a*b", &name));
        assert!(simple_glob("*a*a*a*a*a*a*a*a*", &name));
    }
}
