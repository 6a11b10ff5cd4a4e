//! Git commands through the host's `git.*` operations.

use serde::Deserialize;
use serde_json::Value;

use researchkit_shared::Result;

use crate::response::decode;
use crate::transport::HostTransport;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GitDiff {
    pub staged: String,
    pub unstaged: String,
    /// Staged and unstaged diffs joined by a newline.
    pub combined: String,
}

impl GitDiff {
    pub fn is_empty(&self) -> bool {
        self.combined.trim().is_empty()
    }
}

/// Output of a mutating git command (`add`, `commit`, `push`, ...).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GitOutput {
    pub success: bool,
    pub output: String,
}

#[derive(Debug, Deserialize)]
struct BranchReply {
    #[serde(default)]
    branch: String,
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct LogReply {
    #[serde(default)]
    log: String,
}

/// Git operations against a repository path on the host.
#[derive(Clone)]
pub struct Git<T> {
    transport: T,
}

fn s(value: &str) -> Value {
    Value::String(value.to_string())
}

impl<T: HostTransport> Git<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn output(&self, op: &str, args: Vec<Value>) -> Result<GitOutput> {
        let raw = self.transport.invoke(op, args).await?;
        decode(op, &raw)
    }

    /// `git status --porcelain`.
    pub async fn status(&self, repo: &str) -> Result<String> {
        let op = "git.getStatus";
        let raw = self.transport.invoke(op, vec![s(repo)]).await?;
        Ok(decode::<StatusReply>(op, &raw)?.status)
    }

    pub async fn diff(&self, repo: &str) -> Result<GitDiff> {
        let op = "git.getDiff";
        let raw = self.transport.invoke(op, vec![s(repo)]).await?;
        decode(op, &raw)
    }

    pub async fn branch(&self, repo: &str) -> Result<String> {
        let op = "git.getBranch";
        let raw = self.transport.invoke(op, vec![s(repo)]).await?;
        Ok(decode::<BranchReply>(op, &raw)?.branch.trim().to_string())
    }

    pub async fn commit_log(&self, repo: &str, count: Option<u32>) -> Result<String> {
        let op = "git.getCommitLog";
        let mut args = vec![s(repo)];
        if let Some(n) = count {
            args.push(s(&n.to_string()));
        }
        let raw = self.transport.invoke(op, args).await?;
        Ok(decode::<LogReply>(op, &raw)?.log)
    }

    /// Stage `files`, or everything when `None`.
    pub async fn add(&self, repo: &str, files: Option<&str>) -> Result<GitOutput> {
        let mut args = vec![s(repo)];
        if let Some(files) = files {
            args.push(s(files));
        }
        self.output("git.add", args).await
    }

    pub async fn commit(&self, repo: &str, message: &str) -> Result<GitOutput> {
        self.output("git.commit", vec![s(repo), s(message)]).await
    }

    pub async fn push(&self, repo: &str) -> Result<GitOutput> {
        self.output("git.push", vec![s(repo)]).await
    }

    pub async fn pull(&self, repo: &str) -> Result<GitOutput> {
        self.output("git.pull", vec![s(repo)]).await
    }

    pub async fn checkout(&self, repo: &str, branch: &str) -> Result<GitOutput> {
        self.output("git.checkout", vec![s(repo), s(branch)]).await
    }

    pub async fn create_branch(&self, repo: &str, name: &str) -> Result<GitOutput> {
        self.output("git.createBranch", vec![s(repo), s(name)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedTransport;

    #[tokio::test]
    async fn branch_and_diff_decoded() {
        let host = ScriptedTransport::new();
        host.respond("git.getBranch", r#"{"branch":"feature/x\n"}"#).respond(
            "git.getDiff",
            r#"{"staged":"","unstaged":"+a","combined":"\n+a"}"#,
        );
        let git = Git::new(host);

        assert_eq!(git.branch("/repo").await.unwrap(), "feature/x");
        let diff = git.diff("/repo").await.unwrap();
        assert_eq!(diff.unstaged, "+a");
        assert!(!diff.is_empty());
    }

    #[tokio::test]
    async fn add_without_files_sends_repo_only() {
        let host = ScriptedTransport::new();
        host.respond("git.add", r#"{"success":true,"output":""}"#);
        let git = Git::new(host.clone());

        let out = git.add("/repo", None).await.unwrap();
        assert!(out.success);
        assert_eq!(host.calls_to("git.add")[0].args.len(), 1);
    }

    #[tokio::test]
    async fn push_failure_propagates() {
        let host = ScriptedTransport::new();
        host.fail("git.push", "Git command failed: rejected");
        let git = Git::new(host);
        let err = git.push("/repo").await.unwrap_err();
        assert!(err.to_string().contains("rejected"));
    }
}
