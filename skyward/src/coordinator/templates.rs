//! Template catalog, scoring and placeholder rendering

use std::collections::BTreeMap;

use crate::models::workflow::{WorkflowTemplate, WorkflowType};

/// Tag marking a template as a fallback for any framework
pub const GENERIC_TAG: &str = "generic";

const FRAMEWORK_MATCH_SCORE: u32 = 10;
const GENERIC_SCORE: u32 = 1;

/// Score of `template` for a project using `frameworks`. Every exact
/// framework match outweighs the generic tag; zero means unusable.
pub fn score(template: &WorkflowTemplate, frameworks: &[String]) -> u32 {
    let mut score = 0;
    for tag in &template.frameworks {
        if tag.eq_ignore_ascii_case(GENERIC_TAG) {
            score += GENERIC_SCORE;
        } else if frameworks.iter().any(|f| f.eq_ignore_ascii_case(tag)) {
            score += FRAMEWORK_MATCH_SCORE;
        }
    }
    score
}

/// Ordered set of templates; earlier templates win score ties
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<WorkflowTemplate>,
}

impl TemplateCatalog {
    pub fn new(templates: Vec<WorkflowTemplate>) -> Self {
        Self { templates }
    }

    /// Catalog of the templates shipped with skyward
    pub fn builtin() -> Self {
        Self::new(builtin_templates())
    }

    pub fn add(&mut self, template: WorkflowTemplate) {
        self.templates.push(template);
    }

    pub fn templates(&self) -> &[WorkflowTemplate] {
        &self.templates
    }

    /// Best template of `workflow_type` with its score
    pub fn select(
        &self,
        workflow_type: WorkflowType,
        frameworks: &[String],
    ) -> Option<(&WorkflowTemplate, u32)> {
        let mut best: Option<(&WorkflowTemplate, u32)> = None;
        for template in self.templates.iter().filter(|t| t.workflow_type == workflow_type) {
            let score = score(template, frameworks);
            if score == 0 {
                continue;
            }
            match best {
                Some((_, best_score)) if best_score >= score => {}
                _ => best = Some((template, score)),
            }
        }
        best
    }
}

/// Substitute `{{KEY}}` placeholders from `context`. Unknown keys and
/// `${{ ... }}` expressions are left untouched.
pub fn render(content: &str, context: &BTreeMap<String, String>) -> String {
    let mut rendered = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("{{") {
        let escaped = rest[..start].ends_with('$');
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + len + 2;
        let key = rest[start + 2..start + 2 + len].trim();

        rendered.push_str(&rest[..start]);
        match context.get(key) {
            Some(value) if !escaped => rendered.push_str(value),
            _ => rendered.push_str(&rest[start..end]),
        }
        rest = &rest[end..];
    }

    rendered.push_str(rest);
    rendered
}

fn template(
    id: &str,
    workflow_type: WorkflowType,
    frameworks: &[&str],
    file_name: &str,
    content: &str,
) -> WorkflowTemplate {
    WorkflowTemplate {
        id: id.to_string(),
        name: id.replace('-', " "),
        workflow_type,
        frameworks: frameworks.iter().map(|f| f.to_string()).collect(),
        file_name: file_name.to_string(),
        content: content.to_string(),
    }
}

fn builtin_templates() -> Vec<WorkflowTemplate> {
    vec![
        template(
            "ci-node",
            WorkflowType::Ci,
            &["node", "react", "nextjs", "vue"],
            "ci.yml",
            r#"name: CI
on: [push, pull_request]
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: actions/setup-node@v4
        with:
          node-version: {{NODE_VERSION}}
      - run: npm ci
      - run: npm test
"#,
        ),
        template(
            "ci-rust",
            WorkflowType::Ci,
            &["rust"],
            "ci.yml",
            r#"name: CI
on: [push, pull_request]
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: dtolnay/rust-toolchain@stable
      - run: cargo test --workspace
"#,
        ),
        template(
            "ci-python",
            WorkflowType::Ci,
            &["python", "django", "flask"],
            "ci.yml",
            r#"name: CI
on: [push, pull_request]
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: actions/setup-python@v5
      - run: pip install -r requirements.txt
      - run: pytest
"#,
        ),
        template(
            "ci-generic",
            WorkflowType::Ci,
            &[GENERIC_TAG],
            "ci.yml",
            r#"name: CI
on: [push, pull_request]
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - run: make test
"#,
        ),
        template(
            "cd-container",
            WorkflowType::Cd,
            &[GENERIC_TAG],
            "cd.yml",
            r#"name: CD
on:
  workflow_run:
    workflows: [CI]
    types: [completed]
jobs:
  deploy:
    if: ${{ github.event.workflow_run.conclusion == 'success' }}
    runs-on: ubuntu-latest
    environment: {{ENVIRONMENT}}
    steps:
      - uses: actions/checkout@v4
      - run: docker build -t {{REGISTRY}}/{{PROJECT_NAME}}:${{ github.sha }} .
      - run: echo {{secrets.REGISTRY_TOKEN}} | docker login {{REGISTRY}} --password-stdin
      - run: docker push {{REGISTRY}}/{{PROJECT_NAME}}:${{ github.sha }}
"#,
        ),
        template(
            "cd-node",
            WorkflowType::Cd,
            &["node", "nextjs"],
            "cd.yml",
            r#"name: CD
on:
  workflow_run:
    workflows: [CI]
    types: [completed]
jobs:
  deploy:
    if: ${{ github.event.workflow_run.conclusion == 'success' }}
    runs-on: ubuntu-latest
    environment: {{ENVIRONMENT}}
    steps:
      - uses: actions/checkout@v4
      - run: npm ci && npm run build
      - run: npx deploy --project {{PROJECT_NAME}} --token {{secrets.DEPLOY_TOKEN}}
"#,
        ),
        template(
            "security-scan-generic",
            WorkflowType::SecurityScan,
            &[GENERIC_TAG],
            "security-scan.yml",
            r#"name: Security scan
on:
  schedule:
    - cron: '0 3 * * 1'
jobs:
  scan:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: aquasecurity/trivy-action@master
        with:
          scan-type: fs
"#,
        ),
        template(
            "security-scan-rust",
            WorkflowType::SecurityScan,
            &["rust"],
            "security-scan.yml",
            r#"name: Security scan
on:
  schedule:
    - cron: '0 3 * * 1'
jobs:
  audit:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - run: cargo install cargo-audit && cargo audit
"#,
        ),
        template(
            "release-generic",
            WorkflowType::Release,
            &[GENERIC_TAG],
            "release.yml",
            r#"name: Release
on:
  push:
    tags: ['v*']
jobs:
  release:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: softprops/action-gh-release@v2
        with:
          name: {{PROJECT_NAME}} ${{ github.ref_name }}
"#,
        ),
    ]
}
