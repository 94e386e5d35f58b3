//! Minimal GitHub REST access for versioned target-data runs.
//!
//! A retrospective run pins the target file to the newest commit on or
//! before the reference date, reconstructing exactly what was published at
//! the time. An optional token authenticates the commits-API call only; raw
//! file downloads and every other source stay unauthenticated so the
//! credential never leaves the GitHub API host.

use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate};

use crate::fetch::{HttpClient, auth::ApiKey, fetch_text};

/// Returns the SHA of the most recent commit touching `path` on or before
/// `as_of_date`. The cutoff is 11:59pm Eastern on that date, expressed as
/// 04:59:59Z on the following day.
pub async fn commit_on_or_before<C: HttpClient>(
    client: &C,
    token: Option<&str>,
    repo: &str,
    path: &str,
    as_of_date: NaiveDate,
) -> Result<String> {
    let next_day = as_of_date + Duration::days(1);
    let url = format!(
        "https://api.github.com/repos/{repo}/commits?path={path}&until={next_day}T04:59:59Z&per_page=1"
    );

    let body = match token {
        Some(token) => fetch_text(&ApiKey::bearer(client, token.to_string()), &url).await,
        None => fetch_text(client, &url).await,
    }
    .with_context(|| format!("listing commits for {repo}/{path}"))?;
    let json: serde_json::Value =
        serde_json::from_str(&body).context("parsing GitHub commits response")?;

    match json.get(0).and_then(|c| c["sha"].as_str()) {
        Some(sha) => Ok(sha.to_string()),
        None => bail!("no commits found for {repo}/{path} on or before {as_of_date}"),
    }
}

/// Fetches the raw contents of `path` in `repo` at a specific commit.
/// Always unauthenticated: `raw.githubusercontent.com` is not the API host.
pub async fn file_at_commit<C: HttpClient>(
    client: &C,
    repo: &str,
    path: &str,
    sha: &str,
) -> Result<String> {
    let url = format!("https://raw.githubusercontent.com/{repo}/{sha}/{path}");
    fetch_text(client, &url)
        .await
        .with_context(|| format!("fetching {repo}/{path} at {sha}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Canned-response client recording each request's URL and whether it
    /// carried an Authorization header.
    struct Recorder {
        body: &'static str,
        requests: Mutex<Vec<(String, bool)>>,
    }

    impl Recorder {
        fn new(body: &'static str) -> Self {
            Self {
                body,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<(String, bool)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for Recorder {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            self.requests.lock().unwrap().push((
                req.url().to_string(),
                req.headers().contains_key("authorization"),
            ));
            let resp = http::Response::builder()
                .status(200)
                .body(self.body.to_string())
                .unwrap();
            Ok(resp.into())
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn test_token_sent_to_commits_api_only() {
        let client = Recorder::new(r#"[{"sha":"abc123"}]"#);
        let sha = commit_on_or_before(&client, Some("tok"), "org/repo", "data.csv", d(2025, 12, 27))
            .await
            .unwrap();
        assert_eq!(sha, "abc123");

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].0.starts_with("https://api.github.com/"));
        assert!(requests[0].1, "commits call should carry the token");
    }

    #[tokio::test]
    async fn test_no_token_means_no_auth_header() {
        let client = Recorder::new(r#"[{"sha":"abc123"}]"#);
        commit_on_or_before(&client, None, "org/repo", "data.csv", d(2025, 12, 27))
            .await
            .unwrap();
        assert!(!client.requests()[0].1);
    }

    #[tokio::test]
    async fn test_raw_download_never_authenticated() {
        let client = Recorder::new("location,target_end_date\n");
        file_at_commit(&client, "org/repo", "data.csv", "abc123")
            .await
            .unwrap();

        let requests = client.requests();
        assert!(requests[0].0.starts_with("https://raw.githubusercontent.com/"));
        assert!(!requests[0].1, "raw download must not carry the token");
    }

    #[tokio::test]
    async fn test_empty_commit_list_is_an_error() {
        let client = Recorder::new("[]");
        let err = commit_on_or_before(&client, None, "org/repo", "data.csv", d(2025, 12, 27))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no commits found"));
    }
}
