//! Remote URL normalization.
//!
//! Collapses the various git remote URL spellings (HTTPS, SSH, scp-like
//! `user@host:path`) into a canonical `host/path` identity used as the
//! registry key. Hosts are case-insensitive and lowercased; paths keep their
//! case. A `.git` suffix and trailing slashes are stripped.

/// Normalize a remote URL into a canonical repository identity.
///
/// Returns an empty string for empty input. Inputs that fit none of the
/// recognized shapes fall through mostly unchanged (lowercased host rules do
/// not apply), so callers can still use them as opaque identities.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    // scp-like syntax: user@host:path (no scheme)
    if !raw.contains("://")
        && let Some((user_host, path)) = raw.split_once(':')
        && user_host.contains('@')
    {
        let host = user_host.split('@').next_back().unwrap_or(user_host);
        return canonical_identity(host, path);
    }

    // Scheme URLs: scheme://[user@]host[:port]/path
    if let Some((_, rest)) = raw.split_once("://") {
        let (authority, path) = match rest.split_once('/') {
            Some((a, p)) => (a, p),
            None => (rest, ""),
        };
        let host_port = authority.split('@').next_back().unwrap_or(authority);
        let host = host_port.split(':').next().unwrap_or(host_port);
        return canonical_identity(host, path);
    }

    // No scheme and not scp-like: treat as host/path.
    match raw.split_once('/') {
        Some((host, path)) => canonical_identity(host, path),
        None => canonical_identity(raw, ""),
    }
}

fn canonical_identity(host: &str, path: &str) -> String {
    let host = host.trim().to_lowercase();
    let path = path.trim().trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        host
    } else {
        format!("{host}/{path}")
    }
}

/// Pick the canonical remote from a list of remote names.
///
/// Git convention: `origin` wins when present, otherwise the
/// lexicographically smallest name.
pub fn primary_remote(names: &[String]) -> Option<String> {
    if names.iter().any(|n| n == "origin") {
        return Some("origin".to_string());
    }
    names.iter().min().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::scp("git@github.com:owner/repo.git", "github.com/owner/repo")]
    #[case::scp_no_suffix("git@github.com:owner/repo", "github.com/owner/repo")]
    #[case::https("https://github.com/owner/repo.git", "github.com/owner/repo")]
    #[case::https_trailing_slash("https://github.com/owner/repo/", "github.com/owner/repo")]
    #[case::ssh_scheme("ssh://git@gitlab.example.com/org/project.git", "gitlab.example.com/org/project")]
    #[case::ssh_port("ssh://git@host.com:2222/owner/repo.git", "host.com/owner/repo")]
    #[case::host_case("https://GitHub.COM/Owner/Repo.git", "github.com/Owner/Repo")]
    #[case::nested_path("https://gitlab.com/group/sub/repo.git", "gitlab.com/group/sub/repo")]
    #[case::whitespace("  git@github.com:owner/repo.git\n", "github.com/owner/repo")]
    #[case::empty("", "")]
    fn normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_url(input), expected);
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "git@github.com:owner/repo.git",
            "https://github.com/owner/repo.git",
            "ssh://git@host/owner/repo",
            "github.com/owner/repo",
        ];
        for input in inputs {
            let once = normalize_url(input);
            assert_eq!(normalize_url(&once), once, "input: {input}");
        }
    }

    #[rstest]
    #[case::origin_wins(&["upstream", "origin", "fork"], Some("origin"))]
    #[case::smallest(&["upstream", "fork"], Some("fork"))]
    #[case::single(&["mirror"], Some("mirror"))]
    #[case::empty(&[], None)]
    fn picks_primary_remote(#[case] names: &[&str], #[case] expected: Option<&str>) {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        assert_eq!(primary_remote(&names).as_deref(), expected);
    }
}
