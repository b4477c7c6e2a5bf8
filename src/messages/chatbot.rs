//! Rule-based chatbot
//!
//! Rules are checked in order against the lowercased input; the first
//! substring match wins.

const RULES: &[(&[&str], &str)] = &[
    (&["hello", "hi"], "Hello! How can I assist you today?"),
    (
        &["help"],
        "Sure, I'm here to help. Please tell me more about what you need.",
    ),
    (
        &["weather"],
        "The weather is sunny with a chance of rainbows!",
    ),
    (
        &["joke"],
        "Why did the developer go broke? Because they used up all their cache!",
    ),
];

const FALLBACK: &str = "I'm sorry, I didn't quite catch that. Could you please elaborate?";

/// Reply to a user message
pub fn generate_reply(input: &str) -> &'static str {
    let input = input.to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| input.contains(k)))
        .map(|(_, reply)| *reply)
        .unwrap_or(FALLBACK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting() {
        assert_eq!(generate_reply("Hello there"), "Hello! How can I assist you today?");
        assert_eq!(generate_reply("HI"), "Hello! How can I assist you today?");
    }

    #[test]
    fn test_first_rule_wins() {
        // "hi" also matches inside "this"
        assert_eq!(
            generate_reply("can this help"),
            "Hello! How can I assist you today?"
        );
        assert_eq!(
            generate_reply("I need help with the weather"),
            "Sure, I'm here to help. Please tell me more about what you need."
        );
    }

    #[test]
    fn test_topics() {
        assert_eq!(
            generate_reply("Weather today?"),
            "The weather is sunny with a chance of rainbows!"
        );
        assert_eq!(
            generate_reply("tell me a joke"),
            "Why did the developer go broke? Because they used up all their cache!"
        );
    }

    #[test]
    fn test_fallback() {
        assert_eq!(generate_reply("qwerty"), FALLBACK);
        assert_eq!(generate_reply(""), FALLBACK);
    }
}
