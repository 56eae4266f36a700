use crate::command::Command;
use thiserror::Error;

/// Why a decoded command was rejected. Purely structural: nothing here knows
/// whether referenced ids exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("reply is empty")]
    EmptyReply,
    #[error("new item {0} has an empty title")]
    EmptyTitle(usize),
    #[error("new item {0} has an empty description")]
    EmptyDescription(usize),
    #[error("delete entry {0} has an empty id")]
    EmptyDeleteId(usize),
    #[error("update {0} has an empty id")]
    EmptyUpdateId(usize),
}

/// Check the semantic contract of a command, reporting the first violation.
pub fn validate(command: &Command) -> Result<(), ValidationError> {
    if command.reply.trim().is_empty() {
        return Err(ValidationError::EmptyReply);
    }

    for (i, item) in command.new_items.iter().enumerate() {
        if item.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle(i));
        }
        if item.description.trim().is_empty() {
            return Err(ValidationError::EmptyDescription(i));
        }
    }

    if let Some(i) = command.delete_ids.iter().position(|id| id.trim().is_empty()) {
        return Err(ValidationError::EmptyDeleteId(i));
    }

    if let Some(i) = command.update_items.iter().position(|u| u.id.trim().is_empty()) {
        return Err(ValidationError::EmptyUpdateId(i));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Command {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_empty_reply_rejected() {
        assert_eq!(
            validate(&decode(r#"{"reply":"","newItems":[]}"#)),
            Err(ValidationError::EmptyReply)
        );
        assert_eq!(
            validate(&decode(r#"{"reply":"  \n ","newItems":[]}"#)),
            Err(ValidationError::EmptyReply)
        );
    }

    #[test]
    fn test_minimal_accepted() {
        assert_eq!(validate(&decode(r#"{"reply":"ok","newItems":[]}"#)), Ok(()));
    }

    #[test]
    fn test_item_fields_required() {
        let cmd = decode(r#"{"reply":"ok","newItems":[{"title":"a","description":"b"},{"title":" ","description":"c"}]}"#);
        assert_eq!(validate(&cmd), Err(ValidationError::EmptyTitle(1)));

        let cmd = decode(r#"{"reply":"ok","newItems":[{"title":"a"}]}"#);
        assert_eq!(validate(&cmd), Err(ValidationError::EmptyDescription(0)));
    }

    #[test]
    fn test_ids_required() {
        let cmd = decode(r#"{"reply":"ok","deleteIds":["a",""]}"#);
        assert_eq!(validate(&cmd), Err(ValidationError::EmptyDeleteId(1)));

        let cmd = decode(r#"{"reply":"ok","updateItems":[{"status":"completed"}]}"#);
        assert_eq!(validate(&cmd), Err(ValidationError::EmptyUpdateId(0)));
    }

    #[test]
    fn test_unknown_ids_are_not_its_business() {
        let cmd = decode(r#"{"reply":"ok","deleteIds":["does-not-exist"]}"#);
        assert!(validate(&cmd).is_ok());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ValidationError::EmptyTitle(2).to_string(), "new item 2 has an empty title");
    }
}
