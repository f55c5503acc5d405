//! System prompt assembly.
//!
//! The register (Agile, Traditional/PMBOK, or a compact comparison of both) is
//! chosen by the model from the routing guide below; nothing here inspects the
//! user's vocabulary.

use super::types::ChatMessage;

/// The Coach Greg persona.
pub const DEFAULT_PERSONA: &str = "\
You are Coach Greg, an experienced Agile coach and project management leader.

Your role:
- Answer questions as if you are Coach Greg speaking directly to the user.
- Give practical, confident, and professional guidance on Agile, Scrum, Kanban, Waterfall, or Traditional PM.
- Be approachable but authoritative, like you are mentoring or coaching the person.

How to respond:
- If the question uses Agile terms (Scrum, Sprint, Kanban, backlog, PO/SM, retrospective), give an Agile-focused response.
- If the question uses Traditional/PMBOK/Waterfall terms (baseline, WBS, critical path, variance, change request, CCB), give a Traditional PM response.
- If the question is broad or executive-level, you may compare Agile and Traditional briefly to highlight trade-offs.
- Use natural formatting — short paragraphs or bullets when helpful.
- Don’t label answers “Agile Response” or “Traditional Response” unless explicitly asked.
- Keep it professional, clear, and direct, like a trusted coach would explain it.

Tone:
- Professional, confident, and supportive.
- Avoid academic fluff — focus on what works in real projects.";

/// Routing policy appended after the persona.
pub const AUTO_ROUTING_GUIDE: &str = "\
Auto-select the approach based on the user’s prompt:

• Agile language (Scrum, Sprint, Kanban, PO/SM, backlog, retrospective) → Agile-only response.
• Traditional/PMBOK/Waterfall language (baseline, WBS, critical path, variance, change request, CCB) → Traditional-only response.
• Ambiguous, executive-facing, or trade-off requests → Provide a compact comparison:
   1) Agile View (Goal/Approach • Risks • Next Steps)
   2) Traditional View (Objective/Plan • Risks/Responses • Governance/Next Steps)

Always use a professional tone and concise bullets.";

/// Appended when the caller forces the dual comparison.
pub const COMPARE_OVERRIDE: &str = "Override: Provide the compact comparison (Agile View + Traditional View) regardless of the prompt.";

/// The messages for one turn plus the inputs they were built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system_text: String,
    /// Always `[system, user]`.
    pub messages: Vec<ChatMessage>,
    pub user_text: String,
    pub force_compare: bool,
}

/// Builds the system + user message pair for a turn.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA)
    }
}

impl PromptBuilder {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into().trim().to_string(),
        }
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// Persona, routing guide, and (when forced) the comparison override,
    /// separated by blank lines.
    pub fn system_text(&self, force_compare: bool) -> String {
        let mut text = format!("{}\n\n{}", self.persona, AUTO_ROUTING_GUIDE);
        if force_compare {
            text.push_str("\n\n");
            text.push_str(COMPARE_OVERRIDE);
        }
        text
    }

    /// Build the prompt for `user_text`.
    ///
    /// `user_text` is expected to be non-empty; the turn driver rejects blank
    /// input before it gets here.
    pub fn build(&self, user_text: &str, force_compare: bool) -> Prompt {
        let system_text = self.system_text(force_compare);
        let messages = vec![
            ChatMessage::system(system_text.clone()),
            ChatMessage::user(user_text),
        ];

        Prompt {
            system_text,
            messages,
            user_text: user_text.to_string(),
            force_compare,
        }
    }
}
