//! Strict schema for the agent's post-processing instructions.
//!
//! The agent's output is untrusted advisory input that ends up driving
//! filesystem moves and shell execution. [`parse_plan`] accepts exactly
//! two shapes — a source/target path pair, or an ordered action list —
//! and rejects everything else. Fields outside the schema are never
//! acted on.

use serde::Deserialize;

use crate::client::AgentError;

/// A validated source → target move instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct MovePlan {
    pub source_path: String,
    pub target_path: String,
}

/// A validated ordered list of shell actions.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionList {
    /// Commands to run sequentially, each best-effort.
    pub actions: Vec<String>,
    /// Shell to run them under (e.g. `sh`, `bash`).
    pub shell: String,
}

/// The two instruction shapes the hook honors.
#[derive(Debug, Clone, PartialEq)]
pub enum PostProcessPlan {
    Move(MovePlan),
    Actions(ActionList),
}

/// Everything the agent might emit; validation decides what survives.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlan {
    source_path: Option<String>,
    target_path: Option<String>,
    actions: Option<Vec<String>>,
    shell: Option<String>,
}

/// Strip a Markdown code fence if the agent wrapped its JSON in one.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parse and validate the agent's raw answer into a [`PostProcessPlan`].
///
/// A non-empty path pair wins over an action list when the agent
/// returns both shapes; conflicting fields are not reconciled. Missing
/// or empty required fields fail validation.
pub fn parse_plan(raw: &str) -> Result<PostProcessPlan, AgentError> {
    let text = strip_code_fence(raw);
    let parsed: RawPlan = serde_json::from_str(text)
        .map_err(|e| AgentError::InvalidPlan(format!("not valid JSON: {e}")))?;

    let source = parsed.source_path.as_deref().map(str::trim).unwrap_or("");
    let target = parsed.target_path.as_deref().map(str::trim).unwrap_or("");

    if !source.is_empty() && !target.is_empty() {
        return Ok(PostProcessPlan::Move(MovePlan {
            source_path: source.to_string(),
            target_path: target.to_string(),
        }));
    }

    if let Some(actions) = parsed.actions {
        let actions: Vec<String> = actions
            .into_iter()
            .map(|a| a.trim().to_string())
            .collect();
        if actions.is_empty() {
            return Err(AgentError::InvalidPlan("empty action list".into()));
        }
        if actions.iter().any(|a| a.is_empty()) {
            return Err(AgentError::InvalidPlan(
                "action list contains an empty command".into(),
            ));
        }
        let shell = parsed
            .shell
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("sh")
            .to_string();
        return Ok(PostProcessPlan::Actions(ActionList { actions, shell }));
    }

    Err(AgentError::InvalidPlan(
        "neither a path pair nor an action list".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_move_plan() {
        let plan = parse_plan(
            r#"{"sourcePath": "/downloads/Show.S01", "targetPath": "/media/library/tv/Show/Season 01", "os": "linux"}"#,
        )
        .unwrap();
        assert_eq!(
            plan,
            PostProcessPlan::Move(MovePlan {
                source_path: "/downloads/Show.S01".into(),
                target_path: "/media/library/tv/Show/Season 01".into(),
            })
        );
    }

    #[test]
    fn parses_action_list() {
        let plan = parse_plan(
            r#"{"actions": ["mkdir -p /media/library/films", "mv /downloads/a.mkv /media/library/films/"], "shell": "bash"}"#,
        )
        .unwrap();
        assert_matches!(plan, PostProcessPlan::Actions(list) => {
            assert_eq!(list.actions.len(), 2);
            assert_eq!(list.shell, "bash");
        });
    }

    #[test]
    fn move_plan_wins_when_both_shapes_present() {
        let plan = parse_plan(
            r#"{"sourcePath": "/a", "targetPath": "/b", "actions": ["rm -rf /"]}"#,
        )
        .unwrap();
        assert_matches!(plan, PostProcessPlan::Move(_));
    }

    #[test]
    fn missing_target_falls_through_to_actions() {
        let plan = parse_plan(r#"{"sourcePath": "/a", "actions": ["mv /a /b"]}"#).unwrap();
        assert_matches!(plan, PostProcessPlan::Actions(_));
    }

    #[test]
    fn shell_defaults_to_sh() {
        let plan = parse_plan(r#"{"actions": ["mv /a /b"]}"#).unwrap();
        assert_matches!(plan, PostProcessPlan::Actions(list) => {
            assert_eq!(list.shell, "sh");
        });
    }

    #[test]
    fn rejects_empty_action_list() {
        assert_matches!(
            parse_plan(r#"{"actions": []}"#),
            Err(AgentError::InvalidPlan(_))
        );
    }

    #[test]
    fn rejects_blank_action() {
        assert_matches!(
            parse_plan(r#"{"actions": ["mv /a /b", "   "]}"#),
            Err(AgentError::InvalidPlan(_))
        );
    }

    #[test]
    fn rejects_non_json() {
        assert_matches!(
            parse_plan("Sure! I'd move it to the films folder."),
            Err(AgentError::InvalidPlan(_))
        );
    }

    #[test]
    fn rejects_empty_object() {
        assert_matches!(parse_plan("{}"), Err(AgentError::InvalidPlan(_)));
    }

    #[test]
    fn unwraps_markdown_fenced_json() {
        let plan = parse_plan(
            "```json\n{\"sourcePath\": \"/a\", \"targetPath\": \"/b\"}\n```",
        )
        .unwrap();
        assert_matches!(plan, PostProcessPlan::Move(_));
    }
}
