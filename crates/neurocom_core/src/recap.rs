//! crates/neurocom_core/src/recap.rs
//!
//! The "list my last N messages" fast path.
//!
//! Detection is a narrow keyword heuristic, not a classifier. A message is a
//! recap request when it mentions "last" + "messages" + a marker that the
//! messages are the user's own, in Portuguese ("últimas mensagens que
//! enviei/mandei", "minhas últimas mensagens") or English ("my last 3
//! messages", "last messages I sent/said"). A possessive alone is not enough:
//! "the last messages my doctor sent" is an ordinary question.

use std::sync::OnceLock;

use regex::Regex;

pub const DEFAULT_RECAP_COUNT: usize = 10;
pub const MAX_RECAP_COUNT: usize = 100;

const LAST_WORDS: [&str; 3] = ["ultimas", "últimas", "last"];
const MESSAGE_WORDS: [&str; 4] = ["mensagens", "messages", "msgs", "mensagem"];
const SELF_MARKERS: [&str; 9] = [
    "enviei",
    "mandei",
    "escrevi",
    "minhas últimas",
    "minhas ultimas",
    "i sent",
    "i said",
    "i wrote",
    "my last",
];

fn count_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d+)\s+(?:mensagens?|msgs?|messages?)").ok())
        .as_ref()
}

/// Returns the number of messages requested when `message` asks for a recap.
pub fn detect_recap_request(message: &str) -> Option<usize> {
    let lower = message.to_lowercase();

    let asks_for_last = LAST_WORDS.iter().any(|w| lower.contains(w));
    let mentions_messages = MESSAGE_WORDS.iter().any(|w| lower.contains(w));
    let about_self = SELF_MARKERS.iter().any(|w| lower.contains(w));
    if !(asks_for_last && mentions_messages && about_self) {
        return None;
    }

    let count = count_pattern()
        .and_then(|p| p.captures(&lower))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .filter(|n| (1..=MAX_RECAP_COUNT).contains(n))
        .unwrap_or(DEFAULT_RECAP_COUNT);

    Some(count)
}

/// Formats the user's own questions, oldest first, as a numbered list.
pub fn format_recap(questions: &[String]) -> String {
    let items: Vec<String> = questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. \"{}\"", i + 1, q))
        .collect();
    format!(
        "Aqui estão as últimas {} mensagens (da mais antiga para a mais recente):\n\n{}",
        questions.len(),
        items.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_english_and_portuguese_phrasings() {
        assert_eq!(detect_recap_request("what were my last 3 messages?"), Some(3));
        assert_eq!(
            detect_recap_request("Quais foram as últimas 5 mensagens que te enviei?"),
            Some(5)
        );
        assert_eq!(
            detect_recap_request("liste as ultimas mensagens que mandei"),
            Some(DEFAULT_RECAP_COUNT)
        );
    }

    #[test]
    fn ignores_ordinary_questions() {
        assert_eq!(detect_recap_request("What is neuroplasticity?"), None);
        assert_eq!(detect_recap_request("last time we talked about sleep"), None);
        assert_eq!(detect_recap_request("send the last messages to the team"), None);
    }

    #[test]
    fn messages_written_by_someone_else_are_not_a_recap() {
        assert_eq!(
            detect_recap_request("summarize the last messages my doctor sent"),
            None
        );
        assert_eq!(
            detect_recap_request("resuma as últimas mensagens que minha médica mandou"),
            None
        );
        assert_eq!(
            detect_recap_request("mostre minhas últimas 4 mensagens"),
            Some(4)
        );
    }

    #[test]
    fn out_of_range_counts_fall_back_to_default() {
        assert_eq!(
            detect_recap_request("my last 500 messages please"),
            Some(DEFAULT_RECAP_COUNT)
        );
        assert_eq!(
            detect_recap_request("my last 0 messages"),
            Some(DEFAULT_RECAP_COUNT)
        );
    }

    #[test]
    fn recap_lists_questions_in_order() {
        let text = format_recap(&["c".to_string(), "d".to_string()]);
        assert!(text.ends_with("1. \"c\"\n2. \"d\""));
        assert!(text.contains("últimas 2 mensagens"));
    }
}
