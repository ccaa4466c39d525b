//! Prompt text and option templates for round generation.
//!
//! The narrative pipeline is asked for strict JSON (`story`,
//! `summary50`, `options`); the extractor tolerates the cases where it
//! answers with fences or prose anyway.

use std::collections::BTreeMap;

use taleloom_domain::{PlayerOptions, TOTAL_EVENTS};

/// Fallback story used whenever the pipeline yields nothing usable.
/// Content-deterministic so a round always produces a playable result.
pub const FALLBACK_STORY: &str = "The ancient tavern door creaks open as you and your companions step into the dimly lit common room. The air is thick with the scent of ale and mystery. A hooded figure in the corner gestures toward your table, and you notice a weathered map spread across its surface. Your adventure begins here, in this moment of anticipation.";

pub const FALLBACK_SUMMARY: &str =
    "You enter a mysterious tavern where a hooded figure awaits with a map. The adventure begins.";

pub const FALLBACK_OPTIONS: [&str; 4] = [
    "Approach the hooded figure and examine the map.",
    "Order drinks and listen for rumors from other patrons.",
    "Investigate the tavern's back rooms for secrets.",
    "Leave the tavern and explore the surrounding town.",
];

/// Terminal response once the collaborative story has run its course.
pub const END_STORY_COLLABORATIVE: &str = "**THE END**\n\nYour epic collaborative adventure has reached its conclusion! All players have completed their journey together.";
pub const END_SUMMARY_COLLABORATIVE: &str = "Collaborative story completed!";

/// Terminal response for solo stories.
pub const END_STORY_SOLO: &str = "**THE END**\n\nYour epic adventure has reached its conclusion! You have completed all 10 events of your story. Thank you for playing!";
pub const END_SUMMARY_SOLO: &str = "Story completed! All 10 events finished.";

/// Used when a solo continuation gets no usable model output.
pub const SOLO_TROUBLE_STORY: &str =
    "I'm having trouble generating the story right now. Please try again.";

/// Option rotation for the opening round.
const OPENING_OPTION_TEMPLATES: [[&str; 4]; 3] = [
    [
        "Approach the hooded figure and examine the map.",
        "Order drinks and listen for rumors.",
        "Investigate the tavern's back rooms.",
        "Leave and explore the town.",
    ],
    [
        "Challenge the hooded figure to a game of dice.",
        "Search for hidden passages in the walls.",
        "Buy information from the bartender.",
        "Follow a suspicious patron outside.",
    ],
    [
        "Cast a detection spell to reveal secrets.",
        "Use stealth to eavesdrop on conversations.",
        "Offer to help the tavern keeper.",
        "Examine the map for magical properties.",
    ],
];

/// Option rotation for every later round.
const CONTINUATION_OPTION_TEMPLATES: [[&str; 4]; 3] = [
    [
        "Investigate the mysterious sounds coming from below.",
        "Search for hidden treasure in the room.",
        "Attempt to communicate with the spirits.",
        "Look for secret passages in the walls.",
    ],
    [
        "Cast a protective spell around the group.",
        "Use magic to illuminate the dark corners.",
        "Try to dispel any curses in the area.",
        "Summon a familiar to scout ahead.",
    ],
    [
        "Draw your weapon and prepare for combat.",
        "Use stealth to avoid detection.",
        "Set up traps for potential enemies.",
        "Call out to announce your presence.",
    ],
];

/// 1-based index of the event about to be generated. Counters above
/// the total come from unvalidated client input and clamp to the
/// opening position.
pub fn event_position(events_remaining: u32) -> u32 {
    TOTAL_EVENTS - events_remaining.min(TOTAL_EVENTS) + 1
}

fn events_clause(events_remaining: u32) -> String {
    if events_remaining == 1 {
        "This is the FINAL event - conclude the story with a satisfying ending!".to_string()
    } else {
        format!(
            "You have {} events remaining after this one.",
            events_remaining - 1
        )
    }
}

const JSON_SCHEMA_CLAUSE: &str = "Respond ONLY as strict JSON matching this schema: {\n  \"story\": string,\n  \"summary50\": string,\n  \"options\": [string, string, string, string]\n} without any extra text.";

/// Prompt for the opening round of a fresh collaborative story.
pub fn opening_prompt(player_count: usize) -> String {
    format!(
        "You are a Dungeon Master starting a collaborative adventure for {player_count} players. \
         Begin the story with an evocative opening in 1-2 vivid paragraphs. \
         This is event 1 of {TOTAL_EVENTS} total events. You have {} events remaining after this one. \
         THEN produce a concise 50-word summary of the new scene. \
         THEN produce 3-4 distinct actionable next-step options for the players. \
         {JSON_SCHEMA_CLAUSE} Session start: create opening scene and choices.",
        TOTAL_EVENTS - 1
    )
}

/// Prompt weaving every player's submitted choice into the next round.
pub fn continuation_prompt(
    player_count: usize,
    events_remaining: u32,
    choices: &[(String, String)],
    previous_story: Option<&str>,
) -> String {
    let choices_text = choices
        .iter()
        .map(|(username, choice)| format!("{username}: {choice}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a Dungeon Master managing a collaborative story with {player_count} players. \
         This is event {} of {TOTAL_EVENTS} total events. {} \
         Each player has made their choice. Weave their actions together into a cohesive story continuation. \
         THEN produce a concise 50-word summary of the new scene. \
         THEN produce 3-4 distinct actionable next-step options for the next round. \
         {JSON_SCHEMA_CLAUSE}\n\n\
         Player choices:\n{choices_text}\n\n\
         Previous story context: {}",
        event_position(events_remaining),
        events_clause(events_remaining),
        previous_story.unwrap_or("Beginning of story"),
    )
}

/// Prompt continuing a solo story from the user's free-form message.
pub fn solo_prompt(events_remaining: u32, user_message: &str) -> String {
    format!(
        "You are a Dungeon Master. Continue the user's fantasy story in 1-2 vivid paragraphs. \
         IMPORTANT: This is event {} of {TOTAL_EVENTS} total events. {} \
         THEN produce a concise 50-word summary of the new scene. \
         THEN produce 3-4 distinct actionable next-step options the user can choose, terse but evocative. \
         {JSON_SCHEMA_CLAUSE}\n\n\
         User's story continuation: {user_message}",
        event_position(events_remaining),
        events_clause(events_remaining),
    )
}

/// Assign one option-list template to each player by position in the
/// member iteration order. Cosmetic variety only: index mod 3, so the
/// same ordering always yields the same assignment.
pub fn assign_player_options(
    members: &[(String, String)],
    opening: bool,
) -> BTreeMap<String, PlayerOptions> {
    let templates = if opening {
        &OPENING_OPTION_TEMPLATES
    } else {
        &CONTINUATION_OPTION_TEMPLATES
    };
    members
        .iter()
        .enumerate()
        .map(|(index, (user_id, username))| {
            let template = &templates[index % templates.len()];
            (
                user_id.clone(),
                PlayerOptions {
                    username: username.clone(),
                    options: template.iter().map(|s| (*s).to_string()).collect(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_position_counts_up_from_one() {
        assert_eq!(event_position(10), 1);
        assert_eq!(event_position(9), 2);
        assert_eq!(event_position(1), 10);
    }

    #[test]
    fn oversized_counter_clamps_to_opening_position() {
        assert_eq!(event_position(50), 1);
        assert_eq!(event_position(u32::MAX), 1);

        let prompt = solo_prompt(50, "onward");
        assert!(prompt.contains("This is event 1 of 10"));
    }

    #[test]
    fn final_event_gets_conclusion_instruction() {
        let prompt = solo_prompt(1, "onward");
        assert!(prompt.contains("This is event 10 of 10"));
        assert!(prompt.contains("FINAL event"));

        let prompt = solo_prompt(5, "onward");
        assert!(prompt.contains("This is event 6 of 10"));
        assert!(prompt.contains("4 events remaining after this one"));
    }

    #[test]
    fn continuation_prompt_lists_choices_and_context() {
        let choices = vec![
            ("Alice".to_string(), "Open the door".to_string()),
            ("Bob".to_string(), "Light a torch".to_string()),
        ];
        let prompt = continuation_prompt(2, 9, &choices, Some("The door loomed."));
        assert!(prompt.contains("Alice: Open the door"));
        assert!(prompt.contains("Bob: Light a torch"));
        assert!(prompt.contains("Previous story context: The door loomed."));

        let prompt = continuation_prompt(2, 9, &choices, None);
        assert!(prompt.contains("Previous story context: Beginning of story"));
    }

    #[test]
    fn option_rotation_is_stable_and_wraps() {
        let members: Vec<(String, String)> = ["u1", "u2", "u3"]
            .iter()
            .map(|id| ((*id).to_string(), format!("name-{id}")))
            .collect();

        let first = assign_player_options(&members, false);
        let second = assign_player_options(&members, false);
        assert_eq!(first, second, "same ordering must yield same assignment");

        let opts: Vec<_> = members.iter().map(|(id, _)| &first[id].options).collect();
        assert_ne!(opts[0], opts[1]);
        assert_ne!(opts[1], opts[2]);
        assert_eq!(opts[0].len(), 4);

        // Opening and continuation rotations are distinct sets.
        let opening = assign_player_options(&members, true);
        assert_ne!(opening[&members[0].0].options, first[&members[0].0].options);
    }
}
