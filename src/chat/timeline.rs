//! Merged, time-ordered view of a conversation.
//!
//! User messages and agent actions live in two independently updated
//! collections; rendering wants one sequence. Agent-authored messages are
//! not shown as separate entries, since their content already rides on the
//! corresponding action's natural-language response; the merge takes
//! user-authored messages only, plus every action, ascending by creation
//! time. The output is derived on every call and never stored.

use chrono::{DateTime, Utc};

use crate::api::types::{ChatAction, ChatMessage};

/// One renderable entry of the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineItem {
    Message(ChatMessage),
    Action(ChatAction),
}

impl TimelineItem {
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Message(message) => message.created_at,
            Self::Action(action) => action.created_at,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Message(message) => &message.id,
            Self::Action(action) => &action.id,
        }
    }
}

/// Merge user messages and actions into one ascending sequence.
///
/// The sort is stable, so entries with equal timestamps keep their relative
/// order (messages before actions).
pub fn merge_timeline(messages: &[ChatMessage], actions: &[ChatAction]) -> Vec<TimelineItem> {
    let mut items: Vec<TimelineItem> = messages
        .iter()
        .filter(|message| message.is_user())
        .cloned()
        .map(TimelineItem::Message)
        .chain(actions.iter().cloned().map(TimelineItem::Action))
        .collect();
    items.sort_by_key(|item| item.created_at());
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::ActionState;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 2, 10, 0, secs).unwrap()
    }

    fn message(id: &str, agent_id: Option<&str>, secs: u32) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            chat_id: "chat_1".to_string(),
            agent_id: agent_id.map(String::from),
            content: format!("message {id}"),
            created_at: at(secs),
            updated_at: at(secs),
        }
    }

    fn action(id: &str, secs: u32) -> ChatAction {
        ChatAction {
            id: id.to_string(),
            chat_id: "chat_1".to_string(),
            agent_id: "ag_1".to_string(),
            skill: "transfer".to_string(),
            workflow_index: 0,
            state: ActionState::Generating,
            task: None,
            result: None,
            created_at: at(secs),
            updated_at: at(secs),
        }
    }

    #[test]
    fn orders_ascending_by_creation_time() {
        let messages = vec![message("m1", None, 0), message("m3", None, 20)];
        let actions = vec![action("a1", 10), action("a2", 30)];

        let timeline = merge_timeline(&messages, &actions);
        let ids: Vec<String> = timeline.iter().map(|item| item.id().to_string()).collect();
        assert_eq!(ids, vec!["m1", "a1", "m3", "a2"]);

        assert!(
            timeline
                .windows(2)
                .all(|pair| pair[0].created_at() <= pair[1].created_at())
        );
    }

    #[test]
    fn filters_agent_authored_messages() {
        let messages = vec![
            message("user", None, 0),
            message("agent", Some("ag_1"), 1),
        ];
        let timeline = merge_timeline(&messages, &[]);

        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].id(), "user");
    }

    #[test]
    fn equal_timestamps_keep_stable_order() {
        let messages = vec![message("m1", None, 5)];
        let actions = vec![action("a1", 5)];
        let timeline = merge_timeline(&messages, &actions);

        assert_eq!(timeline[0].id(), "m1");
        assert_eq!(timeline[1].id(), "a1");
    }

    #[test]
    fn merge_is_idempotent_for_unchanged_inputs() {
        let messages = vec![message("m1", None, 0), message("m2", None, 8)];
        let actions = vec![action("a1", 4)];

        let first = merge_timeline(&messages, &actions);
        let second = merge_timeline(&messages, &actions);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_inputs_produce_empty_timeline() {
        assert!(merge_timeline(&[], &[]).is_empty());
    }
}
