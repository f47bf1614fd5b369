//! Prompt pack builder for planner and worker input.

use anyhow::Result;
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::types::{MAX_REVIEW_SCORE, MIN_REVIEW_SCORE};

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const WORKER_TEMPLATE: &str = include_str!("prompts/worker.md");

/// Reference diff shown to the worker as the expected output format.
pub const EXAMPLE_CODE_DIFF: &str = r#"diff --git a/src/main.py b/src/main.py
index 58d38b6..23b0827 100644
--- a/src/main.py
+++ b/src/main.py
@@ -19,7 +19,10 @@ def run_bash_file_from_string(s: str):
     """Runs a bash script from a string"""
     with open('temp.sh', 'w') as f:
         f.write(s)
-    os.system('bash temp.sh')
+    if os.name == 'nt':  # Windows systems
+        os.system('powershell.exe .\\temp.sh')
+    else:  # Unix/Linux systems
+        os.system('bash temp.sh')
     os.remove('temp.sh')"#;

/// Planner sections dropped first when over budget, older history before the
/// previous diff. The file map is last in the template and gets truncated
/// instead.
const PLANNER_DROP_ORDER: &[&str] = &["steps", "diff"];
const WORKER_DROP_ORDER: &[&str] = &["example"];

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)?;
        env.add_template("worker", WORKER_TEMPLATE)?;
        Ok(Self { env })
    }

    fn render_planner(&self, input: &PlannerPromptInputs<'_>) -> Result<String> {
        let template = self.env.get_template("planner")?;
        let rendered = template.render(context! {
            prompt => input.prompt.trim(),
            code_diff => (!input.code_diff.trim().is_empty()).then(|| input.code_diff.trim()),
            steps => input.steps,
            file_map => (!input.file_map.trim().is_empty()).then(|| input.file_map.trim_end()),
            threshold => input.threshold,
            min_score => MIN_REVIEW_SCORE,
            max_score => MAX_REVIEW_SCORE,
        })?;
        Ok(rendered)
    }

    fn render_worker(&self, input: &WorkerPromptInputs<'_>) -> Result<String> {
        let template = self.env.get_template("worker")?;
        let rendered = template.render(context! {
            example_diff => EXAMPLE_CODE_DIFF,
            steps => input.steps,
            chunk => input.chunk.trim_end(),
        })?;
        Ok(rendered)
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    /// Section identifier (e.g., "contract", "file_map").
    key: String,
    /// Whether this section is required (cannot be dropped).
    required: bool,
    /// Section content without the marker.
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
///
/// Markers follow format: `<!-- section:KEY required|droppable -->`
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    use std::sync::LazyLock;
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker regex")
    });

    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let required = kind.as_str() == "required";
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());

        let content = rendered[whole.end()..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

/// Drop sections in `drop_order` until the prompt fits, then truncate the
/// last section if it still does not.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize, drop_order: &[&str]) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    if total_len(sections) <= budget {
        return;
    }

    for key in drop_order {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            let dropped_len = sections[idx].content.len();
            debug!(
                section = key,
                bytes_dropped = dropped_len,
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    let Some((last, rest)) = sections.split_last_mut() else {
        return;
    };
    let other_len: usize = rest.iter().map(|s| s.content.len()).sum();
    let allowed = budget.saturating_sub(other_len);
    let before_len = last.content.len();
    if before_len > allowed {
        const MARKER: &str = "\n[truncated]";
        let keep = if allowed > MARKER.len() {
            allowed - MARKER.len()
        } else {
            allowed
        };
        last.content.truncate(floor_char_boundary(&last.content, keep));
        if allowed > MARKER.len() {
            last.content.push_str(MARKER);
        }
        debug!(
            section = last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    (0..=index)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0)
}

/// Render sections back to a single string.
fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Inputs for the review-and-plan prompt.
#[derive(Debug, Clone)]
pub struct PlannerPromptInputs<'a> {
    /// The user's change request.
    pub prompt: &'a str,
    /// Rendered repository file map.
    pub file_map: &'a str,
    /// Diff from the previous iteration (empty on the first).
    pub code_diff: &'a str,
    /// Steps from the previous iteration.
    pub steps: &'a [String],
    pub threshold: i64,
}

/// Inputs for the per-chunk diff prompt.
#[derive(Debug, Clone)]
pub struct WorkerPromptInputs<'a> {
    pub chunk: &'a str,
    pub steps: &'a [String],
}

/// Builds a prompt pack within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    /// Create a builder with the given byte budget.
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Build a prompt pack for the planner.
    pub fn build_planner(&self, input: &PlannerPromptInputs<'_>) -> Result<PromptPack> {
        let rendered = PromptEngine::new()?.render_planner(input)?;
        Ok(self.pack(&rendered, PLANNER_DROP_ORDER))
    }

    /// Build a prompt pack for the worker.
    pub fn build_worker(&self, input: &WorkerPromptInputs<'_>) -> Result<PromptPack> {
        let rendered = PromptEngine::new()?.render_worker(input)?;
        Ok(self.pack(&rendered, WORKER_DROP_ORDER))
    }

    fn pack(&self, rendered: &str, drop_order: &[&str]) -> PromptPack {
        let mut sections = parse_sections(rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes, drop_order);
        PromptPack {
            content: render_sections(&sections),
        }
    }
}

/// A rendered prompt ready to send to a completion backend.
#[derive(Debug, Clone)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    /// Get the rendered prompt content.
    pub fn render(&self) -> String {
        self.content.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps() -> Vec<String> {
        vec!["Add a flag".to_string(), "Wire it into main".to_string()]
    }

    #[test]
    fn planner_sections_are_ordered() {
        let steps = steps();
        let input = PlannerPromptInputs {
            prompt: "add a --verbose flag",
            file_map: "src/\n  main.rs",
            code_diff: "diff --git a/x b/x",
            steps: &steps,
            threshold: 7,
        };

        let content = PromptBuilder::new(100_000)
            .build_planner(&input)
            .expect("build")
            .render();

        let contract = content.find("### Planner Contract").expect("contract");
        let request = content.find("### Request").expect("request");
        let diff = content.find("### Previous Code Diff").expect("diff");
        let steps_pos = content.find("### Previous Steps").expect("steps");
        let map = content.find("### Repository File Map").expect("file map");
        assert!(contract < request);
        assert!(request < diff);
        assert!(diff < steps_pos);
        assert!(steps_pos < map);
        assert!(content.contains("1. Add a flag"));
        assert!(content.contains("A score of 7 means"));
        assert!(content.contains("get_codegen_review_and_plan"));
    }

    #[test]
    fn first_iteration_omits_empty_history_sections() {
        let input = PlannerPromptInputs {
            prompt: "add a flag",
            file_map: "main.rs",
            code_diff: "",
            steps: &[],
            threshold: 7,
        };

        let content = PromptBuilder::new(100_000)
            .build_planner(&input)
            .expect("build")
            .render();

        assert!(!content.contains("### Previous Code Diff"));
        assert!(!content.contains("### Previous Steps"));
        assert!(content.contains("<request>\nadd a flag\n</request>"));
    }

    #[test]
    fn budget_drops_steps_then_truncates_file_map() {
        let steps = vec!["step".repeat(100)];
        let file_map = "src/file.rs\n".repeat(200);
        let input = PlannerPromptInputs {
            prompt: "request",
            file_map: &file_map,
            code_diff: "",
            steps: &steps,
            threshold: 7,
        };

        let content = PromptBuilder::new(2_000)
            .build_planner(&input)
            .expect("build")
            .render();

        assert!(!content.contains("### Previous Steps"), "steps dropped");
        assert!(content.contains("### Planner Contract"), "contract kept");
        assert!(content.contains("### Request"), "request kept");
        assert!(content.ends_with("[truncated]"), "file map truncated");
        assert!(content.len() <= 2_000 + 4 * "\n\n".len());
    }

    #[test]
    fn budget_drops_large_diff_before_file_map() {
        let steps = steps();
        let code_diff = format!("diff --git a/x b/x\n{}", "+line\n".repeat(1_000));
        let input = PlannerPromptInputs {
            prompt: "request",
            file_map: "src/\n  main.rs",
            code_diff: &code_diff,
            steps: &steps,
            threshold: 7,
        };

        let content = PromptBuilder::new(3_000)
            .build_planner(&input)
            .expect("build")
            .render();

        assert!(!content.contains("### Previous Code Diff"), "diff dropped");
        assert!(!content.contains("### Previous Steps"), "steps dropped");
        assert!(content.contains("<file_map>\nsrc/\n  main.rs\n</file_map>"));
        assert!(!content.ends_with("[truncated]"));
        assert!(content.len() <= 3_000);
    }

    #[test]
    fn worker_prompt_carries_chunk_steps_and_example() {
        let steps = steps();
        let chunk = "--- File: src/main.rs ---\nfn main() {}\n";
        let input = WorkerPromptInputs {
            chunk,
            steps: &steps,
        };

        let content = PromptBuilder::new(100_000)
            .build_worker(&input)
            .expect("build")
            .render();

        assert!(content.contains("<chunk>\n--- File: src/main.rs ---\nfn main() {}\n</chunk>"));
        assert!(content.contains("2. Wire it into main"));
        assert!(content.contains("run_bash_file_from_string"));
        assert!(content.contains("get_codegen_code_diff"));
    }

    #[test]
    fn worker_drops_example_before_touching_chunk() {
        let steps = steps();
        let chunk = format!("--- File: a.rs ---\n{}\n", "x".repeat(600));
        let input = WorkerPromptInputs {
            chunk: &chunk,
            steps: &steps,
        };

        let content = PromptBuilder::new(1_400)
            .build_worker(&input)
            .expect("build")
            .render();

        assert!(!content.contains("### Diff Format"));
        assert!(content.contains(&"x".repeat(600)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut sections = vec![ParsedSection {
            key: "file_map".to_string(),
            required: false,
            content: "é".repeat(50),
        }];
        apply_budget_to_sections(&mut sections, 31, &[]);
        assert!(sections[0].content.ends_with("[truncated]"));
        assert!(sections[0].content.len() <= 31);
    }
}
