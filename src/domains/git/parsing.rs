//! Pure parsers for git's script-friendly output formats.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AheadBehind {
    pub behind: u32,
    pub ahead: u32,
}

/// Two whitespace-separated integers as printed by
/// `git rev-list --left-right --count <upstream>...HEAD`.
pub fn parse_ahead_behind_counts(output: &str) -> Option<AheadBehind> {
    let mut parts = output.split_whitespace();
    let behind = parts.next()?.parse().ok()?;
    let ahead = parts.next()?.parse().ok()?;
    Some(AheadBehind { behind, ahead })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitStatusSummary {
    pub branch_head: Option<String>,
    pub branch_oid: Option<String>,
    pub upstream: Option<String>,
    pub ahead: Option<u32>,
    pub behind: Option<u32>,
    pub staged: usize,
    pub unstaged: usize,
    pub untracked: usize,
}

impl GitStatusSummary {
    pub fn short_oid(&self) -> Option<&str> {
        let oid = self.branch_oid.as_deref().filter(|oid| !oid.is_empty())?;
        Some(oid.get(..7).unwrap_or(oid))
    }

    pub fn has_changes(&self) -> bool {
        self.staged + self.unstaged + self.untracked > 0
    }
}

/// Parses `git status --porcelain=v2 [--branch]`.
pub fn parse_git_status_v2(output: &str) -> GitStatusSummary {
    let mut summary = GitStatusSummary::default();

    for line in output.lines() {
        if let Some(header) = line.strip_prefix("# ") {
            let mut parts = header.splitn(2, ' ');
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            let value = value.trim();
            match key {
                "branch.head" => summary.branch_head = Some(value.to_string()),
                "branch.oid" => summary.branch_oid = Some(value.to_string()),
                "branch.upstream" => summary.upstream = Some(value.to_string()),
                "branch.ab" => {
                    for token in value.split_whitespace() {
                        if let Some(ahead) = token.strip_prefix('+') {
                            summary.ahead = ahead.parse().ok();
                        } else if let Some(behind) = token.strip_prefix('-') {
                            summary.behind = behind.parse().ok();
                        }
                    }
                }
                _ => {}
            }
            continue;
        }

        if line.starts_with("? ") {
            summary.untracked += 1;
            continue;
        }

        if line.starts_with("1 ") || line.starts_with("2 ") || line.starts_with("u ") {
            let Some(xy) = line.split_whitespace().nth(1) else {
                continue;
            };
            let mut chars = xy.chars();
            if let (Some(index), Some(worktree)) = (chars.next(), chars.next()) {
                if index != '.' {
                    summary.staged += 1;
                }
                if worktree != '.' {
                    summary.unstaged += 1;
                }
            }
        }
    }

    summary
}

/// Dirty when the summary shows any entry or the raw output carries anything at all.
pub fn is_dirty_status(output: &str) -> bool {
    parse_git_status_v2(output).has_changes() || !output.trim().is_empty()
}

/// Last `/`-separated segment of `git symbolic-ref` output.
pub fn parse_default_branch_from_symbolic_ref(output: &str) -> Option<String> {
    output
        .trim()
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Textual conflict probe over `git merge-tree` output.
pub fn parse_merge_tree_conflict(output: &str) -> bool {
    output.contains("<<<<<<<") || output.contains(">>>>>>>") || output.contains("|||||||")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PorcelainWorktree {
    pub path: PathBuf,
    pub head: Option<String>,
    pub branch: Option<String>,
    pub detached: bool,
}

impl PorcelainWorktree {
    /// Branch name without `refs/heads/`, or the abbreviated HEAD when detached.
    pub fn display_name(&self) -> String {
        if let Some(branch) = &self.branch {
            return branch
                .strip_prefix("refs/heads/")
                .unwrap_or(branch)
                .to_string();
        }
        match &self.head {
            Some(head) => head.get(..7).unwrap_or(head).to_string(),
            None => self
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// Parses `git worktree list --porcelain`. Blank lines separate records and
/// records marked `bare` are dropped; order is preserved.
pub fn parse_worktree_porcelain(output: &str) -> Vec<PorcelainWorktree> {
    let mut worktrees = Vec::new();
    let mut current: Option<PorcelainWorktree> = None;
    let mut bare = false;

    let mut flush = |current: &mut Option<PorcelainWorktree>, bare: &mut bool| {
        if let Some(entry) = current.take() {
            if !*bare {
                worktrees.push(entry);
            }
        }
        *bare = false;
    };

    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            flush(&mut current, &mut bare);
            continue;
        }

        if let Some(path) = line.strip_prefix("worktree ") {
            flush(&mut current, &mut bare);
            current = Some(PorcelainWorktree {
                path: PathBuf::from(path),
                ..PorcelainWorktree::default()
            });
            continue;
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };
        if let Some(head) = line.strip_prefix("HEAD ") {
            entry.head = Some(head.to_string());
        } else if let Some(branch) = line.strip_prefix("branch ") {
            entry.branch = Some(branch.to_string());
        } else if line == "detached" {
            entry.detached = true;
        } else if line == "bare" {
            bare = true;
        }
    }
    flush(&mut current, &mut bare);

    worktrees
}
