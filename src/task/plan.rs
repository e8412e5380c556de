//! Tolerant extraction of a `{direct_answer | decompose | code}` plan from
//! unstructured LLM text. Never throws; default is `direct_answer(body)`.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    DirectAnswer { answer: String },
    Decompose { subtasks: Vec<Subtask> },
    Code { language: String, code: String, packages: Vec<String>, needs_network: bool },
    /// The response named a recognized plan type (`"type":"code"`, etc.) but
    /// was missing a field that type requires, e.g. `code`. Distinct from
    /// the "no JSON at all" case: a recognized-but-malformed plan must fail
    /// the task rather than be treated as a successful direct answer.
    Invalid { reason: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Subtask {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawPlan {
    DirectAnswer { answer: String },
    Decompose { subtasks: Vec<Subtask> },
    Code {
        language: String,
        code: String,
        #[serde(default)]
        packages: Vec<String>,
        #[serde(default)]
        needs_network: bool,
    },
}

impl From<RawPlan> for Plan {
    fn from(raw: RawPlan) -> Self {
        match raw {
            RawPlan::DirectAnswer { answer } => Plan::DirectAnswer { answer },
            RawPlan::Decompose { subtasks } => Plan::Decompose { subtasks },
            RawPlan::Code { language, code, packages, needs_network } => {
                Plan::Code { language, code, packages, needs_network }
            }
        }
    }
}

const KNOWN_TYPES: &[&str] = &["direct_answer", "decompose", "code"];

/// Four-strategy ladder: whole-string parse, first fenced block, first
/// `{`..last `}`, then the same span with trailing commas stripped. On
/// total failure to find any JSON, treat the whole response as a direct
/// answer. But if a candidate span parses as an object carrying a
/// recognized `type` tag that nonetheless fails to deserialize into that
/// variant's shape (e.g. `"type":"code"` with no `code` field), the plan
/// is malformed, not absent — report it as `Plan::Invalid` instead of
/// falling through to a direct answer.
pub fn extract_plan(content: &str) -> Plan {
    let trimmed = content.trim();
    let mut candidates = vec![trimmed.to_string()];

    if let Some(fenced) = extract_fenced(trimmed) {
        candidates.push(fenced.trim().to_string());
    }
    if let Some(braces) = extract_outer_braces(trimmed) {
        candidates.push(braces.to_string());
        candidates.push(strip_trailing_commas(braces));
    }

    for candidate in &candidates {
        if let Some(plan) = try_parse(candidate) {
            return plan;
        }
    }
    for candidate in &candidates {
        if let Some(reason) = recognized_but_malformed(candidate) {
            return Plan::Invalid { reason };
        }
    }

    Plan::DirectAnswer { answer: content.to_string() }
}

fn try_parse(s: &str) -> Option<Plan> {
    serde_json::from_str::<RawPlan>(s).ok().map(Plan::from)
}

/// Returns `Some(reason)` when `s` parses as a JSON object whose `type`
/// field names a known plan type, but the object still fails to
/// deserialize into `RawPlan` (a required field is missing or malformed).
fn recognized_but_malformed(s: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(s).ok()?;
    let tag = value.get("type")?.as_str()?;
    if !KNOWN_TYPES.contains(&tag) {
        return None;
    }
    match serde_json::from_value::<RawPlan>(value) {
        Ok(_) => None,
        Err(err) => Some(format!("plan type '{tag}' is missing or has an invalid required field: {err}")),
    }
}

fn extract_fenced(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;
    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;
    if body_start >= body_end {
        return None;
    }
    Some(&content[body_start..body_end])
}

fn extract_outer_braces(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&content[start..=end])
}

fn strip_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.char_indices().peekable();
    let mut in_string = false;
    let mut escape_next = false;
    while let Some((_, ch)) = chars.next() {
        if escape_next {
            out.push(ch);
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => {
                out.push(ch);
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
                out.push(ch);
            }
            ',' if !in_string => {
                let rest = s[out.len() + 1..].trim_start();
                if rest.starts_with('}') || rest.starts_with(']') {
                    continue;
                }
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_direct_answer() {
        let plan = extract_plan(r#"{"type":"direct_answer","answer":"hi"}"#);
        assert_eq!(plan, Plan::DirectAnswer { answer: "hi".to_string() });
    }

    #[test]
    fn parses_fenced_json() {
        let text = "Sure thing:\n```json\n{\"type\":\"direct_answer\",\"answer\":\"hi\"}\n```\nhope that helps";
        let plan = extract_plan(text);
        assert_eq!(plan, Plan::DirectAnswer { answer: "hi".to_string() });
    }

    #[test]
    fn parses_embedded_braces_with_prose() {
        let text = "here is my plan {\"type\":\"code\",\"language\":\"python\",\"code\":\"print(1)\"} thanks";
        let plan = extract_plan(text);
        assert_eq!(
            plan,
            Plan::Code {
                language: "python".to_string(),
                code: "print(1)".to_string(),
                packages: vec![],
                needs_network: false,
            }
        );
    }

    #[test]
    fn strips_trailing_commas() {
        let text = r#"{"type":"direct_answer","answer":"hi",}"#;
        let plan = extract_plan(text);
        assert_eq!(plan, Plan::DirectAnswer { answer: "hi".to_string() });
    }

    #[test]
    fn falls_back_to_direct_answer_on_garbage() {
        let plan = extract_plan("not json at all");
        assert_eq!(plan, Plan::DirectAnswer { answer: "not json at all".to_string() });
    }

    #[test]
    fn parses_decompose() {
        let text = r#"{"type":"decompose","subtasks":[{"title":"a"},{"title":"b","description":"d"}]}"#;
        let plan = extract_plan(text);
        assert_eq!(
            plan,
            Plan::Decompose {
                subtasks: vec![
                    Subtask { title: "a".to_string(), description: String::new() },
                    Subtask { title: "b".to_string(), description: "d".to_string() },
                ]
            }
        );
    }

    #[test]
    fn code_type_missing_code_field_is_invalid_not_direct_answer() {
        let plan = extract_plan(r#"{"type":"code","language":"python","packages":[]}"#);
        match plan {
            Plan::Invalid { reason } => assert!(reason.contains("code")),
            other => panic!("expected Plan::Invalid, got {other:?}"),
        }
    }

    #[test]
    fn never_panics_on_arbitrary_input() {
        for s in ["", "{", "}", "{{{{", "null", "[1,2,3]", "\"just a string\""] {
            let _ = extract_plan(s);
        }
    }
}
