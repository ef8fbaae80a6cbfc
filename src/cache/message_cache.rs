//! Client-side per-conversation message list with optimistic sends.
//!
//! Locally-originated messages render immediately under a generated
//! correlation id and are reconciled against the server-confirmed row when
//! it arrives, through the send response or a relay event, whichever comes
//! first. Relay delivery may duplicate or reorder, so every insert dedups
//! by id and by correlation id.

use chrono::Utc;
use uuid::Uuid;

use crate::models::Message;
use crate::relay::ChangeEvent;

#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub listing_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct CachedMessage {
    pub message: Message,
    pub optimistic: bool,
}

/// Pre-mutation state captured before an optimistic edit/delete, restored if
/// the server rejects the mutation.
#[derive(Debug, Clone)]
pub struct EditSnapshot {
    previous: Message,
}

pub struct MessageCache {
    entries: Vec<CachedMessage>,
    view_visible: bool,
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCache {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            view_visible: true,
        }
    }

    /// Seeds the cache from a full fetch, dropping local state.
    pub fn reset(&mut self, messages: Vec<Message>) {
        self.entries = messages
            .into_iter()
            .map(|message| CachedMessage {
                message,
                optimistic: false,
            })
            .collect();
        self.sort();
    }

    /// Inserts a locally-rendered message ahead of server confirmation and
    /// returns its correlation id. The temporary id is replaced on confirm.
    pub fn insert_optimistic(&mut self, draft: MessageDraft) -> String {
        let client_ref = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.entries.push(CachedMessage {
            message: Message {
                id: Uuid::new_v4(),
                listing_id: draft.listing_id,
                sender_id: draft.sender_id,
                receiver_id: draft.receiver_id,
                body: draft.body,
                client_ref: Some(client_ref.clone()),
                is_read: false,
                seen_at: None,
                edited: false,
                deleted: false,
                created_at: now,
                updated_at: now,
            },
            optimistic: true,
        });
        client_ref
    }

    /// Replaces the optimistic entry with the server-confirmed row. If a
    /// relay event already reconciled it, this is a no-op insert-dedup.
    pub fn confirm(&mut self, client_ref: &str, confirmed: Message) {
        match self.position_by_ref(client_ref) {
            Some(idx) => {
                self.entries[idx].message = confirmed;
                self.entries[idx].optimistic = false;
                self.sort();
            }
            None => self.upsert(confirmed),
        }
    }

    /// Removes a failed optimistic entry. Never leaves a ghost behind.
    pub fn fail(&mut self, client_ref: &str) {
        self.entries.retain(|e| {
            !(e.optimistic && e.message.client_ref.as_deref() == Some(client_ref))
        });
    }

    /// Applies an optimistic edit, returning the snapshot to restore if the
    /// server rejects it.
    pub fn begin_edit(&mut self, message_id: Uuid, new_body: &str) -> Option<EditSnapshot> {
        let entry = self.entries.iter_mut().find(|e| e.message.id == message_id)?;
        let snapshot = EditSnapshot {
            previous: entry.message.clone(),
        };
        entry.message.body = new_body.to_string();
        entry.message.edited = true;
        Some(snapshot)
    }

    /// Applies an optimistic soft-delete, returning the revert snapshot.
    pub fn begin_delete(&mut self, message_id: Uuid) -> Option<EditSnapshot> {
        let entry = self.entries.iter_mut().find(|e| e.message.id == message_id)?;
        let snapshot = EditSnapshot {
            previous: entry.message.clone(),
        };
        entry.message.deleted = true;
        Some(snapshot)
    }

    pub fn revert(&mut self, snapshot: EditSnapshot) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.message.id == snapshot.previous.id)
        {
            entry.message = snapshot.previous;
        }
    }

    /// Routes a relay event into local state. Insert dedups against known
    /// ids and against optimistic entries by correlation id; update merges
    /// by id; removed drops by id.
    pub fn apply(&mut self, event: &ChangeEvent) {
        match event {
            ChangeEvent::MessageInserted { message } => self.upsert(message.clone()),
            ChangeEvent::MessageUpdated { message } => {
                match self.entries.iter().position(|e| e.message.id == message.id) {
                    Some(idx) => {
                        self.entries[idx].message = message.clone();
                        self.entries[idx].optimistic = false;
                    }
                    // Update delivered before its insert; treat as insert.
                    None => self.upsert(message.clone()),
                }
            }
            ChangeEvent::MessageRemoved { message_id, .. } => {
                self.entries.retain(|e| e.message.id != *message_id);
            }
            ChangeEvent::ConversationChanged { .. } => {}
        }
    }

    /// Messages to render: soft-deleted rows stay cached but are never
    /// shown.
    pub fn visible(&self) -> impl Iterator<Item = &CachedMessage> {
        self.entries.iter().filter(|e| !e.message.deleted)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, message_id: Uuid) -> Option<&CachedMessage> {
        self.entries.iter().find(|e| e.message.id == message_id)
    }

    /// Page-visibility gate for read-marking: while the viewing surface is
    /// backgrounded nothing is marked seen, even though the server operation
    /// itself would be safe to call.
    pub fn set_view_visible(&mut self, visible: bool) {
        self.view_visible = visible;
    }

    pub fn wants_mark_read(&self, incoming: &Message, viewer: Uuid) -> bool {
        self.view_visible && incoming.receiver_id == viewer && !incoming.is_read
    }

    fn upsert(&mut self, message: Message) {
        if self.entries.iter().any(|e| e.message.id == message.id) {
            return;
        }
        let matched = message
            .client_ref
            .as_deref()
            .and_then(|client_ref| self.position_by_ref(client_ref));
        if let Some(idx) = matched {
            self.entries[idx].message = message;
            self.entries[idx].optimistic = false;
        } else {
            self.entries.push(CachedMessage {
                message,
                optimistic: false,
            });
        }
        self.sort();
    }

    fn position_by_ref(&self, client_ref: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.optimistic && e.message.client_ref.as_deref() == Some(client_ref))
    }

    fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| {
                a.message
                    .created_at
                    .cmp(&b.message.created_at)
                    .then(a.message.id.cmp(&b.message.id))
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft(sender: Uuid, receiver: Uuid) -> MessageDraft {
        MessageDraft {
            listing_id: Uuid::new_v4(),
            sender_id: sender,
            receiver_id: receiver,
            body: "is this still available?".into(),
        }
    }

    fn server_message(client_ref: Option<&str>) -> Message {
        Message {
            id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            body: "is this still available?".into(),
            client_ref: client_ref.map(|s| s.to_string()),
            is_read: false,
            seen_at: None,
            edited: false,
            deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn relay_event_reconciles_optimistic_entry_without_duplicate() {
        let mut cache = MessageCache::new();
        let client_ref = cache.insert_optimistic(draft(Uuid::new_v4(), Uuid::new_v4()));
        assert_eq!(cache.len(), 1);

        let confirmed = server_message(Some(&client_ref));
        let server_id = confirmed.id;
        cache.apply(&ChangeEvent::MessageInserted { message: confirmed });

        assert_eq!(cache.len(), 1, "reconciliation must replace, not append");
        let entry = cache.get(server_id).expect("entry carries the server id");
        assert!(!entry.optimistic);
    }

    #[test]
    fn confirm_after_relay_event_does_not_duplicate() {
        let mut cache = MessageCache::new();
        let client_ref = cache.insert_optimistic(draft(Uuid::new_v4(), Uuid::new_v4()));
        let confirmed = server_message(Some(&client_ref));

        // Relay beats the send response.
        cache.apply(&ChangeEvent::MessageInserted {
            message: confirmed.clone(),
        });
        cache.confirm(&client_ref, confirmed);

        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn duplicate_inserts_by_id_are_dropped() {
        let mut cache = MessageCache::new();
        let message = server_message(None);
        cache.apply(&ChangeEvent::MessageInserted {
            message: message.clone(),
        });
        cache.apply(&ChangeEvent::MessageInserted { message });
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_send_leaves_no_ghost() {
        let mut cache = MessageCache::new();
        let client_ref = cache.insert_optimistic(draft(Uuid::new_v4(), Uuid::new_v4()));
        cache.fail(&client_ref);
        assert!(cache.is_empty());
    }

    #[test]
    fn soft_delete_update_hides_but_keeps_the_row() {
        let mut cache = MessageCache::new();
        let mut message = server_message(None);
        cache.apply(&ChangeEvent::MessageInserted {
            message: message.clone(),
        });

        message.deleted = true;
        cache.apply(&ChangeEvent::MessageUpdated {
            message: message.clone(),
        });

        assert_eq!(cache.visible().count(), 0);
        assert!(cache.get(message.id).is_some(), "row stays cached");
    }

    #[test]
    fn hard_remove_drops_the_row() {
        let mut cache = MessageCache::new();
        let message = server_message(None);
        cache.apply(&ChangeEvent::MessageInserted {
            message: message.clone(),
        });
        cache.apply(&ChangeEvent::MessageRemoved {
            message_id: message.id,
            listing_id: message.listing_id,
        });
        assert!(cache.is_empty());
    }

    #[test]
    fn out_of_order_inserts_render_in_creation_order() {
        let mut cache = MessageCache::new();
        let mut older = server_message(None);
        older.created_at = Utc::now() - Duration::minutes(10);
        let newer = server_message(None);

        cache.apply(&ChangeEvent::MessageInserted {
            message: newer.clone(),
        });
        cache.apply(&ChangeEvent::MessageInserted {
            message: older.clone(),
        });

        let ids: Vec<Uuid> = cache.visible().map(|e| e.message.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }

    #[test]
    fn rejected_edit_reverts_to_snapshot() {
        let mut cache = MessageCache::new();
        let message = server_message(None);
        cache.apply(&ChangeEvent::MessageInserted {
            message: message.clone(),
        });

        let snapshot = cache.begin_edit(message.id, "edited body").unwrap();
        assert_eq!(cache.get(message.id).unwrap().message.body, "edited body");

        cache.revert(snapshot);
        let entry = cache.get(message.id).unwrap();
        assert_eq!(entry.message.body, message.body);
        assert!(!entry.message.edited);
    }

    #[test]
    fn rejected_delete_reverts_to_snapshot() {
        let mut cache = MessageCache::new();
        let message = server_message(None);
        cache.apply(&ChangeEvent::MessageInserted {
            message: message.clone(),
        });

        let snapshot = cache.begin_delete(message.id).unwrap();
        assert_eq!(cache.visible().count(), 0);
        cache.revert(snapshot);
        assert_eq!(cache.visible().count(), 1);
    }

    #[test]
    fn hidden_view_suppresses_read_marking() {
        let mut cache = MessageCache::new();
        let viewer = Uuid::new_v4();
        let mut incoming = server_message(None);
        incoming.receiver_id = viewer;

        assert!(cache.wants_mark_read(&incoming, viewer));
        cache.set_view_visible(false);
        assert!(!cache.wants_mark_read(&incoming, viewer));
        cache.set_view_visible(true);
        assert!(!cache.wants_mark_read(&incoming, Uuid::new_v4()));
    }
}
