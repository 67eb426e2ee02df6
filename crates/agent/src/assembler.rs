//! Turn assembly: stored history plus the new message, in model order.
//!
//! No dedup, no token budgeting. The history store's read limit is the only
//! bound on how much conversation reaches the model.

use turnrelay_core::message::Message;
use turnrelay_core::turn::Turn;

/// Inputs for one assembly.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInput<'a> {
    /// Stored turns, oldest first.
    pub history: &'a [Turn],
    /// The literal text the human sent.
    pub query: &'a str,
    /// Opaque retrieved context supplied by the caller.
    pub context: Option<&'a str>,
    /// Heading placed above the query when context is present.
    pub label: &'a str,
}

/// Build the model-facing message list, ending with the new user message.
pub fn assemble(input: &AssemblyInput<'_>) -> Vec<Message> {
    let mut messages: Vec<Message> = input.history.iter().map(Turn::to_message).collect();
    messages.push(Message::user(augment(input.query, input.context, input.label)));
    messages
}

/// The model-facing form of the query. Empty context is treated as absent.
pub fn augment(query: &str, context: Option<&str>, label: &str) -> String {
    match context.filter(|c| !c.is_empty()) {
        Some(context) => format!("{context}\n\n---\n\n**{label}:**\n{query}"),
        None => query.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnrelay_core::message::Role;

    const LABEL: &str = "Paty's message";

    fn history() -> Vec<Turn> {
        vec![
            Turn::user("s", "paty", "T1"),
            Turn::assistant("s", "paty", "T2", "m"),
        ]
    }

    #[test]
    fn history_then_new_message() {
        let history = history();
        let messages = assemble(&AssemblyInput {
            history: &history,
            query: "T3",
            context: None,
            label: LABEL,
        });
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::User]);
        assert_eq!(messages[2].content, "T3");
    }

    #[test]
    fn empty_history_yields_single_message() {
        let messages = assemble(&AssemblyInput {
            history: &[],
            query: "hola",
            context: None,
            label: LABEL,
        });
        assert_eq!(messages, vec![Message::user("hola")]);
    }

    #[test]
    fn context_prefixes_the_query() {
        let messages = assemble(&AssemblyInput {
            history: &[],
            query: "¿Qué dice?",
            context: Some("Doc excerpt"),
            label: LABEL,
        });
        assert_eq!(
            messages[0].content,
            "Doc excerpt\n\n---\n\n**Paty's message:**\n¿Qué dice?"
        );
    }

    #[test]
    fn empty_context_is_ignored() {
        assert_eq!(augment("q", Some(""), LABEL), "q");
    }

    #[test]
    fn whitespace_context_is_still_prepended() {
        assert_eq!(
            augment("q", Some("  "), LABEL),
            "  \n\n---\n\n**Paty's message:**\nq"
        );
    }

    #[test]
    fn label_is_configurable() {
        assert_eq!(augment("q", Some("c"), "Question"), "c\n\n---\n\n**Question:**\nq");
    }
}
