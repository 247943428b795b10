/// Host and repository coordinates parsed from a git remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GithubRemote {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

/// Accepts `git@host:owner/repo(.git)`, `ssh://git@host[:port]/owner/repo(.git)`
/// and `https://host/owner/repo(.git)`.
pub fn parse_github_remote(url: &str) -> Option<GithubRemote> {
    let url = url.trim();

    let (host, path) = if let Some((scheme, rest)) = url.split_once("://") {
        if !matches!(scheme, "https" | "http" | "ssh" | "git") {
            return None;
        }
        let (authority, path) = rest.split_once('/')?;
        let host = authority.rsplit('@').next()?;
        let host = host.split(':').next()?;
        (host, path)
    } else {
        let (user_host, path) = url.split_once(':')?;
        let host = user_host.rsplit('@').next()?;
        (host, path)
    };

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    if segments.next().is_some() || host.is_empty() {
        return None;
    }

    Some(GithubRemote {
        host: host.to_string(),
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}
