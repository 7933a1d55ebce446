//! Prompt text for every capability call.

use crate::capabilities::{PersonaContext, NO_SUGGESTION};
use crate::types::{AvatarStyle, Mood};

pub fn conversation_system_prompt(
    persona: &PersonaContext,
    mood: Mood,
    language: &str,
    facts: &[String],
) -> String {
    let character = match persona.style {
        AvatarStyle::Abstract => format!(
            "You are {}, a small, warm desktop companion who floats on the user's screen. \
            You are playful, concise, and genuinely helpful.",
            persona.name
        ),
        _ => format!(
            "You are {}. Stay fully in character: speak the way {} would, \
            while still helping the user with whatever they ask.",
            persona.name, persona.name
        ),
    };

    let mut parts = vec![
        character,
        format!("The user currently seems {}. Match your tone to that.", mood),
        format!("Always reply in the language with locale code {}.", language),
        "Keep replies short enough to be read aloud: two or three sentences.".to_string(),
        "You can act through function calls:\n\
        - changeCharacter when the user asks you to become someone else\n\
        - extractFact when the user tells you something worth remembering about themselves\n\
        - setReminder when the user wants to be reminded of something later (delay in seconds)\n\
        - startFocusSession when the user wants to focus on a task for some minutes\n\
        - launchApplication when the user asks you to open an app\n\
        Always include a short spoken reply alongside any function call."
            .to_string(),
    ];

    if !facts.is_empty() {
        let listing = facts
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!("Things you know about the user:\n{}", listing));
    }

    parts.join("\n\n")
}

pub const CONFIRM_TRANSFORMATION: &str =
    "You have just transformed into this character. Announce it in one short, in-character line.";

pub const DEFAULT_SUMMARY_INSTRUCTION: &str = "summarize";

pub fn mood_prompt(language: &str) -> String {
    format!(
        "Classify the emotion of the user's message (written in {}). \
        Answer with exactly one word from: neutral, happy, sad, excited, surprised, angry, curious, calm.",
        language
    )
}

pub const VOICE_PROMPT: &str = "Pick the voice that best fits the named character. \
Answer with exactly one word from: Zephyr (bright, friendly), Puck (upbeat, playful), \
Charon (deep, commanding), Kore (firm, youthful), Fenrir (excitable, energetic).";

pub fn avatar_prompt(character: &str) -> String {
    format!(
        "A clean, expressive portrait of {} as a small desktop mascot, \
        centered, simple flat background, friendly and readable at 128px.",
        character
    )
}

pub fn web_prompt(language: &str) -> String {
    format!(
        "Answer the user's question from the numbered web excerpts you are given. \
        Reply in {}, in a few spoken sentences. If the excerpts don't cover it, say so \
        plainly instead of guessing.",
        language
    )
}

/// Used when no page could be retrieved; the answer carries no sources.
pub fn web_offline_prompt(language: &str) -> String {
    format!(
        "Answer the user's question from general knowledge. Reply in {}, in a few spoken \
        sentences, and mention that you couldn't check the web this time.",
        language
    )
}

pub fn describe_image_prompt(language: &str) -> String {
    format!(
        "Describe the image and answer the user's request about it. Reply in {}. Be brief.",
        language
    )
}

pub fn summarize_prompt(language: &str) -> String {
    format!(
        "You are given some content and an instruction. Follow the instruction using the content. Reply in {}.",
        language
    )
}

pub const PRIORITIZE_PROMPT: &str = "You are given a list of tasks as JSON objects with id and task. \
Order them from most to least urgent. Respond as JSON: {\"order\": [id, ...]}.";

pub fn fun_fact_prompt(language: &str, persona: &PersonaContext) -> String {
    format!(
        "You are {}. The user has been quiet for a while. Offer one short fun fact or light joke \
        to brighten their day, in {}. One or two sentences.",
        persona.name, language
    )
}

pub fn proactive_prompt(language: &str) -> String {
    format!(
        "This is a screenshot of the user's screen. If there is something genuinely useful you could \
        suggest (a fix, a shortcut, a reminder), say it in one sentence in {}. \
        Otherwise answer exactly {}.",
        language, NO_SUGGESTION
    )
}

pub const OPTIMIZE_PERSONA_INSTRUCTION: &str = "Rewrite this draft as a clear, compact persona prompt \
for a desktop companion: who they are, how they speak, what they care about. Keep it under 120 words.";

pub const MOOD_REPORT_INSTRUCTION: &str = "These are timestamped mood readings of the user. \
Write a short, kind report of how their mood has been trending, with one gentle suggestion.";

pub const CONVERSATION_SUMMARY_INSTRUCTION: &str =
    "Summarize this conversation in a few bullet points.";
