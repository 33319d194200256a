//! Parsers for VCS command output.

use super::{TrackingState, WorktreeStatus};

/// Parse `git status --porcelain=v1` into working-tree counters.
///
/// Each line carries a two-column prefix: `??` marks an untracked file,
/// otherwise column X is the staged bit and column Y the unstaged bit
/// (space or empty means clean for that column).
pub(crate) fn parse_porcelain_status(output: &str) -> WorktreeStatus {
    let mut staged = 0u32;
    let mut unstaged = 0u32;
    let mut untracked = 0u32;

    for line in output.lines() {
        if line.len() < 2 {
            continue;
        }
        let mut chars = line.chars();
        let x = chars.next().unwrap_or(' ');
        let y = chars.next().unwrap_or(' ');
        if x == '?' && y == '?' {
            untracked += 1;
            continue;
        }
        if x != ' ' {
            staged += 1;
        }
        if y != ' ' {
            unstaged += 1;
        }
    }

    WorktreeStatus::new(staged, unstaged, untracked)
}

/// One line of `git for-each-ref` output for a local branch.
///
/// Format: `branch|upstream|track|trackshort`, pipe-split into four fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RefLine {
    pub branch: String,
    pub upstream: String,
    pub track: String,
    pub trackshort: String,
}

impl RefLine {
    pub(crate) fn parse(line: &str) -> Option<Self> {
        let mut fields = line.splitn(4, '|');
        let branch = fields.next()?.to_string();
        let upstream = fields.next().unwrap_or_default().to_string();
        let track = fields.next().unwrap_or_default().to_string();
        let trackshort = fields.next().unwrap_or_default().to_string();
        if branch.is_empty() {
            return None;
        }
        Some(Self {
            branch,
            upstream,
            track,
            trackshort,
        })
    }

    /// Tracking state for this ref. `[gone]` in the track field wins over the
    /// trackshort symbol.
    pub(crate) fn state(&self) -> TrackingState {
        if self.upstream.is_empty() {
            return TrackingState::None;
        }
        if self.track.contains("gone") {
            return TrackingState::Gone;
        }
        match self.trackshort.as_str() {
            ">" => TrackingState::Ahead,
            "<" => TrackingState::Behind,
            "<>" => TrackingState::Diverged,
            "=" => TrackingState::Equal,
            _ => TrackingState::None,
        }
    }
}

/// Find the ref line for `branch` in `for-each-ref` output.
pub(crate) fn find_ref_line(output: &str, branch: &str) -> Option<RefLine> {
    output
        .lines()
        .filter_map(RefLine::parse)
        .find(|r| r.branch == branch)
}

/// Parse `git rev-list --left-right --count a...b` output: `<ahead>\t<behind>`.
///
/// Missing fields default to 0.
pub(crate) fn parse_ahead_behind(output: &str) -> (u32, u32) {
    let mut fields = output.split_whitespace();
    let ahead = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
    let behind = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
    (ahead, behind)
}

/// Parse `hg paths` output: one `name = url` line per remote.
pub(crate) fn parse_hg_paths(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let (name, url) = line.split_once('=')?;
            let name = name.trim();
            let url = url.trim();
            if name.is_empty() || url.is_empty() {
                return None;
            }
            Some((name.to_string(), url.to_string()))
        })
        .collect()
}

/// Parse `hg status` into working-tree counters.
///
/// Mercurial has no staging area: tracked changes (`M`, `A`, `R`, `!`) count
/// as unstaged, `?` as untracked.
pub(crate) fn parse_hg_status(output: &str) -> WorktreeStatus {
    let mut unstaged = 0u32;
    let mut untracked = 0u32;
    for line in output.lines() {
        match line.chars().next() {
            Some('M') | Some('A') | Some('R') | Some('!') => unstaged += 1,
            Some('?') => untracked += 1,
            _ => {}
        }
    }
    WorktreeStatus::new(0, unstaged, untracked)
}
