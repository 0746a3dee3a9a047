//! Which conversations a requester may list, and in what order.
//!
//! - Group conversations: admins who participate.
//! - Direct conversations, admin requester: any they participate in.
//! - Direct conversations, client requester: only those whose other
//!   participant is an admin. Client-to-client conversations are hidden even
//!   when the data contains them.
//!
//! Conversations with messages come first, most recent first; the rest keep
//! their input order at the end.

use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Conversation, ConversationKind, ConversationSummary, Role, User};
use crate::repository::UserDirectory;

const UNKNOWN_USER: &str = "Unknown user";

/// `counterpart_role` is the role of the other participant of a direct
/// conversation, `None` when the directory does not know them.
pub fn is_visible(
    conversation: &Conversation,
    requester_id: Uuid,
    requester_role: Role,
    counterpart_role: Option<Role>,
) -> bool {
    if !conversation.has_participant(requester_id) {
        return false;
    }
    match (conversation.kind, requester_role) {
        (ConversationKind::Group, Role::Admin) => true,
        (ConversationKind::Group, Role::Client) => false,
        (ConversationKind::Direct, Role::Admin) => true,
        (ConversationKind::Direct, Role::Client) => counterpart_role == Some(Role::Admin),
    }
}

fn by_recent_activity(a: &Conversation, b: &Conversation) -> Ordering {
    match (a.last_activity(), b.last_activity()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub struct VisibilityFilter {
    directory: Arc<dyn UserDirectory>,
}

impl VisibilityFilter {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    async fn lookup(&self, user_id: Uuid) -> AppResult<Option<User>> {
        match self.directory.get_user(user_id).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Filters `candidates` for the requester and orders the result.
    pub async fn apply(
        &self,
        requester_id: Uuid,
        requester_role: Role,
        candidates: Vec<Conversation>,
    ) -> AppResult<Vec<ConversationSummary>> {
        let mut visible = Vec::with_capacity(candidates.len());

        for conversation in candidates {
            let counterpart = match conversation.counterpart(requester_id) {
                Some(id) => self.lookup(id).await?,
                None => None,
            };
            let counterpart_role = counterpart.as_ref().map(|u| u.role);

            if !is_visible(&conversation, requester_id, requester_role, counterpart_role) {
                if conversation.is_direct() && requester_role == Role::Client {
                    tracing::debug!(
                        conversation_id = %conversation.id,
                        requester_id = %requester_id,
                        "Hiding direct conversation without an admin counterpart"
                    );
                }
                continue;
            }
            visible.push((conversation, counterpart));
        }

        visible.sort_by(|(a, _), (b, _)| by_recent_activity(a, b));

        Ok(visible
            .into_iter()
            .map(|(conversation, counterpart)| {
                let title = match (&conversation.group, &counterpart) {
                    (Some(group), _) => group.name.clone(),
                    (None, Some(user)) => user.name.clone(),
                    (None, None) => UNKNOWN_USER.to_string(),
                };
                ConversationSummary {
                    unread_count: conversation.unread_for(requester_id),
                    counterpart_online: counterpart.map(|u| u.is_online),
                    title,
                    conversation,
                }
            })
            .collect())
    }
}
