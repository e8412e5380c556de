//! Built-in skill texts matched by keyword against a task's title/description.
//!
//! The external Memory service can also serve skill text (see `memory`), but
//! a small built-in set keeps the engine useful even when memory is
//! unconfigured.

pub struct Skill {
    pub tag: &'static str,
    pub text: &'static str,
}

pub const SKILLS: &[Skill] = &[
    Skill {
        tag: "web search",
        text: "When a task needs current information, write Python using the `requests` \
               package against the configured search endpoint rather than guessing.",
    },
    Skill {
        tag: "file",
        text: "Prefer reading and writing files under /workspace; never assume paths \
               outside the sandbox's working directory exist.",
    },
    Skill {
        tag: "git",
        text: "Git operations against the agent's own source happen through the repo \
               client, not through shell git commands inside the sandbox.",
    },
];

/// Return the verbatim text of every skill whose tag appears in `haystack`
/// (case-insensitive substring match against title + description).
pub fn matching_skill_text(haystack: &str) -> Vec<&'static str> {
    let lower = haystack.to_lowercase();
    SKILLS
        .iter()
        .filter(|s| lower.contains(s.tag))
        .map(|s| s.text)
        .collect()
}
