use crate::context::{ConversationContext, Sender};
use chrono::NaiveDate;

/// Fixed instructions at the top of every prompt. Describes the JSON the
/// recovery pipeline expects back.
pub const INSTRUCTIONS: &str = r#"You are a personal productivity coach. You help the user turn what they say into a short, concrete task list and keep it current.

Respond with ONE JSON object and nothing else:
{
  "reply": "what you say to the user (required, never empty)",
  "newItems": [{"title": "short title", "description": "what done looks like"}],
  "deleteIds": ["id of a task to remove"],
  "updateItems": [{"id": "task id", "status": "pending|completed|cancelled", "dueDate": "RFC 3339 or null to clear"}]
}

Only use ids listed under TASKS. Leave a list empty when there is nothing to do. In the reply refer to tasks by title, never by id."#;

/// Everything after the instructions that depends on the context, without
/// the date and user sections. This is what the budgeter measures.
pub fn render_body(ctx: &ConversationContext) -> String {
    let mut prompt = String::new();

    if !ctx.summary.is_empty() {
        prompt.push_str(&format!("--- TOPIC ---\n{}\n\n", ctx.summary));
    }

    if !ctx.key_items.is_empty() {
        prompt.push_str("--- TASKS ---\n");
        for item in &ctx.key_items {
            prompt.push_str(&format!("- {} (id: {}, status: {})\n", item.title, item.id, item.status));
        }
        prompt.push('\n');
    }

    if !ctx.priority_signals.is_empty() {
        prompt.push_str("--- SIGNALS ---\n");
        for signal in &ctx.priority_signals {
            prompt.push_str(&format!("- {}\n", signal));
        }
        prompt.push('\n');
    }

    if !ctx.recent_messages.is_empty() {
        prompt.push_str("--- RECENT ---\n");
        for message in &ctx.recent_messages {
            let who = match message.sender {
                Sender::User => "USER",
                Sender::Assistant => "YOU",
            };
            prompt.push_str(&format!("{}: {}\n", who, message.content));
        }
        prompt.push('\n');
    }

    prompt
}

/// The full prompt for one chat turn.
pub fn render(ctx: &ConversationContext, user_message: &str, date: NaiveDate) -> String {
    format!(
        "{}\n\n--- DATE ---\n{}\n\n{}--- USER ---\n{}",
        INSTRUCTIONS,
        date.format("%Y-%m-%d"),
        render_body(ctx),
        user_message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::msg;
    use crate::context::Item;

    #[test]
    fn test_empty_context_renders_nothing() {
        assert_eq!(render_body(&ConversationContext::default()), "");
    }

    #[test]
    fn test_sections_in_order() {
        let ctx = ConversationContext {
            summary: "Planning a move".into(),
            recent_messages: vec![
                msg(Sender::User, "I need to pack", 0),
                msg(Sender::Assistant, "Let's list rooms", 1),
            ],
            key_items: vec![Item::new("t1", "Buy boxes")],
            priority_signals: vec!["User's dominant mood: stressed".into()],
        };
        let body = render_body(&ctx);
        let topic = body.find("--- TOPIC ---").unwrap();
        let tasks = body.find("--- TASKS ---").unwrap();
        let signals = body.find("--- SIGNALS ---").unwrap();
        let recent = body.find("--- RECENT ---").unwrap();
        assert!(topic < tasks && tasks < signals && signals < recent);
        assert!(body.contains("- Buy boxes (id: t1, status: pending)"));
        assert!(body.contains("USER: I need to pack\nYOU: Let's list rooms\n"));
    }

    #[test]
    fn test_render_wraps_body() {
        let ctx = ConversationContext { summary: "s".into(), ..Default::default() };
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let prompt = render(&ctx, "hello", date);
        assert!(prompt.starts_with(INSTRUCTIONS));
        assert!(prompt.contains("--- DATE ---\n2025-03-09\n"));
        assert!(prompt.contains(&render_body(&ctx)));
        assert!(prompt.ends_with("--- USER ---\nhello"));
    }
}
