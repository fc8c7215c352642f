//! Inject a secret reference into GitHub Actions workflows that run Terraform.

use serde::{Deserialize, Serialize};

/// The environment variable and secret added to Terraform workflows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSecret {
    /// Case-insensitive marker that makes a workflow eligible.
    pub tool_marker: String,
    pub env_name: String,
    pub secret_name: String,
}

impl Default for WorkflowSecret {
    fn default() -> Self {
        Self {
            tool_marker: "terraform".to_string(),
            env_name: "GITHUB_TOKEN".to_string(),
            secret_name: "gh-readaccess-pat".to_string(),
        }
    }
}

impl WorkflowSecret {
    fn entry(&self) -> String {
        format!("{}: ${{{{ secrets.{} }}}}", self.env_name, self.secret_name)
    }
}

/// Add the secret to the workflow-level `env:` mapping, else to the first
/// job's `env:`, creating that one if needed. Returns `None` when the
/// workflow does not reference the tool, already references the secret, or
/// has nowhere to put it.
pub fn inject_workflow_secret(content: &str, secret: &WorkflowSecret) -> Option<String> {
    if !content.to_lowercase().contains(&secret.tool_marker.to_lowercase())
        || content.contains(&secret.secret_name)
    {
        return None;
    }

    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let (index, insert) = workflow_env(&lines, secret).or_else(|| first_job(&lines, secret))?;

    let mut out = String::with_capacity(content.len() + insert.len() + 1);
    for (i, line) in lines.iter().enumerate() {
        out.push_str(line);
        if i == index {
            if !line.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&insert);
        }
    }
    Some(out)
}

/// A column-0 `env:` ahead of `jobs:`. Job and step `env:` blocks don't count.
fn workflow_env(lines: &[&str], secret: &WorkflowSecret) -> Option<(usize, String)> {
    let jobs = lines
        .iter()
        .position(|l| is_top_level(l, "jobs"))
        .unwrap_or(lines.len());
    let index = lines[..jobs].iter().position(|l| is_top_level(l, "env"))?;
    Some(append_to_env(lines, index, secret))
}

fn first_job(lines: &[&str], secret: &WorkflowSecret) -> Option<(usize, String)> {
    let jobs = lines.iter().position(|l| key_of(l) == Some("jobs"))?;
    let jobs_indent = indent_of(lines[jobs]).len();
    let job = lines[jobs + 1..]
        .iter()
        .position(|l| !is_blank(l) && indent_of(l).len() > jobs_indent && key_of(l).is_some())?
        + jobs
        + 1;
    let job_indent = indent_of(lines[job]);

    let body: Vec<(usize, &str)> = lines[job + 1..]
        .iter()
        .enumerate()
        .filter(|(_, l)| !is_blank(l))
        .take_while(|(_, l)| indent_of(l).len() > job_indent.len())
        .map(|(i, l)| (job + 1 + i, *l))
        .collect();
    if let Some(&(_, first)) = body.first() {
        let child_indent = indent_of(first);
        if let Some(&(index, _)) = body
            .iter()
            .find(|(_, l)| indent_of(l) == child_indent && key_of(l) == Some("env"))
        {
            return Some(append_to_env(lines, index, secret));
        }
    }

    Some((
        job,
        format!(
            "{job_indent}  env:\n{job_indent}    {}\n",
            secret.entry()
        ),
    ))
}

/// Insert point and entry for the `env:` mapping opened at `index`.
fn append_to_env(lines: &[&str], index: usize, secret: &WorkflowSecret) -> (usize, String) {
    let env_indent = indent_of(lines[index]);
    let child_indent = lines[index + 1..]
        .iter()
        .find(|l| !is_blank(l))
        .map(|l| indent_of(l))
        .filter(|i| i.len() > env_indent.len())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{env_indent}  "));
    (index, format!("{child_indent}{}\n", secret.entry()))
}

fn is_top_level(line: &str, key: &str) -> bool {
    indent_of(line).is_empty() && key_of(line) == Some(key)
}

/// Key of a `key:` line that opens a nested mapping.
fn key_of(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let key = trimmed.strip_suffix(':')?;
    (!key.is_empty() && !key.starts_with('#') && !key.starts_with('-') && !key.contains(' '))
        .then_some(key)
}

fn indent_of(line: &str) -> &str {
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

fn is_blank(line: &str) -> bool {
    let t = line.trim();
    t.is_empty() || t.starts_with('#')
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_LINE: &str = "GITHUB_TOKEN: ${{ secrets.gh-readaccess-pat }}";

    #[test]
    fn test_adds_to_existing_env() {
        let input = "name: plan\non: push\nenv:\n  TF_IN_AUTOMATION: true\njobs:\n  plan:\n    runs-on: ubuntu-latest\n    steps:\n      - run: terraform plan\n";
        let out = inject_workflow_secret(input, &WorkflowSecret::default()).unwrap();
        assert!(out.contains(&format!("env:\n  {SECRET_LINE}\n  TF_IN_AUTOMATION: true\n")));
    }

    #[test]
    fn test_creates_env_under_first_job() {
        let input = "name: plan\njobs:\n  plan:\n    runs-on: ubuntu-latest\n    steps:\n      - run: terraform init\n";
        let out = inject_workflow_secret(input, &WorkflowSecret::default()).unwrap();
        assert!(out.contains(&format!("  plan:\n    env:\n      {SECRET_LINE}\n    runs-on")));
    }

    #[test]
    fn test_step_env_is_not_the_workflow_env() {
        let input = "name: plan\njobs:\n  plan:\n    runs-on: ubuntu-latest\n    steps:\n      - name: init\n        env:\n          TF_LOG: info\n        run: terraform init\n";
        let out = inject_workflow_secret(input, &WorkflowSecret::default()).unwrap();
        assert!(out.contains(&format!("  plan:\n    env:\n      {SECRET_LINE}\n    runs-on")));
        assert!(out.contains("        env:\n          TF_LOG: info\n        run"));
    }

    #[test]
    fn test_workflow_env_wins_over_later_step_env() {
        let input = "jobs:\n  plan:\n    steps:\n      - env:\n          A: b\n        run: terraform plan\n";
        let with_top = format!("on: push\nenv:\n  TF_IN_AUTOMATION: true\n{input}");
        let out = inject_workflow_secret(&with_top, &WorkflowSecret::default()).unwrap();
        assert!(out.starts_with(&format!("on: push\nenv:\n  {SECRET_LINE}\n  TF_IN_AUTOMATION")));
        assert_eq!(out.matches(SECRET_LINE).count(), 1);
    }

    #[test]
    fn test_adds_to_existing_job_env() {
        let input = "jobs:\n  plan:\n    runs-on: ubuntu-latest\n    env:\n      TF_IN_AUTOMATION: true\n    steps:\n      - run: terraform plan\n";
        let out = inject_workflow_secret(input, &WorkflowSecret::default()).unwrap();
        assert!(out.contains(&format!("    env:\n      {SECRET_LINE}\n      TF_IN_AUTOMATION: true\n")));
        assert_eq!(out.matches("env:").count(), 1);
    }

    #[test]
    fn test_skips_non_terraform_workflow() {
        let input = "jobs:\n  test:\n    steps:\n      - run: cargo test\n";
        assert!(inject_workflow_secret(input, &WorkflowSecret::default()).is_none());
    }

    #[test]
    fn test_skips_when_secret_present() {
        let input = format!("env:\n  {SECRET_LINE}\njobs:\n  a:\n    steps:\n      - run: terraform fmt\n");
        assert!(inject_workflow_secret(&input, &WorkflowSecret::default()).is_none());
    }

    #[test]
    fn test_injection_is_idempotent() {
        let input = "jobs:\n  deploy:\n    steps:\n      - uses: hashicorp/setup-terraform@v3\n";
        let once = inject_workflow_secret(input, &WorkflowSecret::default()).unwrap();
        assert!(inject_workflow_secret(&once, &WorkflowSecret::default()).is_none());
    }
}
