use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppResult;
use crate::models::{Message, NotificationKind};
use crate::services::conversation_service::ConversationService;
use crate::services::email_budget::DailyEmailBudget;
use crate::services::email_service::{new_message_email, Mailer};
use crate::services::notification_service::{CreateNotification, NotificationService};
use crate::services::presence_service::PresenceService;

/// Everything the email-eligibility rule looks at, snapshotted so the
/// decision itself is a pure function.
#[derive(Debug, Clone)]
pub struct EmailSignals {
    pub now: DateTime<Utc>,
    pub active_window: Duration,
    pub recipient_last_active: DateTime<Utc>,
    pub recipient_email: Option<String>,
    pub conversation_last_email: Option<DateTime<Utc>>,
    pub sent_today: i64,
    pub daily_limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Recipient was active recently; they will see the in-app badge.
    RecipientActive,
    NoEmailOnFile,
    /// A nudge already went out for this conversation since the recipient
    /// was last active; one email per activity cycle.
    AlreadyNotified,
    DailyCapReached,
    /// No SMTP transport configured in this deployment.
    EmailDisabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailDecision {
    Eligible,
    Skip(SkipReason),
}

/// Short-circuits on the first failing condition, in the documented order:
/// recipient-active, has-email, already-notified, daily cap.
pub fn evaluate_email(signals: &EmailSignals) -> EmailDecision {
    let idle_for = signals
        .now
        .signed_duration_since(signals.recipient_last_active);
    if idle_for < signals.active_window {
        return EmailDecision::Skip(SkipReason::RecipientActive);
    }

    match signals.recipient_email.as_deref() {
        Some(email) if !email.trim().is_empty() => {}
        _ => return EmailDecision::Skip(SkipReason::NoEmailOnFile),
    }

    if let Some(last_email) = signals.conversation_last_email {
        if last_email > signals.recipient_last_active {
            return EmailDecision::Skip(SkipReason::AlreadyNotified);
        }
    }

    if signals.sent_today >= signals.daily_limit {
        return EmailDecision::Skip(SkipReason::DailyCapReached);
    }

    EmailDecision::Eligible
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailOutcome {
    Sent,
    Skipped(SkipReason),
    /// Lost the race: the reservation pushed the counter past the cap, so
    /// the send was aborted. The counter is not decremented.
    CapExceededAfterReserve,
    TransportFailed,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchOutcome {
    pub notification_created: bool,
    pub email: EmailOutcome,
}

/// Reacts to each stored message: always writes the in-app notification,
/// then walks the email escalation state machine. Runs off the send path;
/// nothing here can fail a message delivery.
pub struct NotificationDispatcher {
    mailer: Option<Arc<dyn Mailer>>,
    public_url: String,
    daily_limit: i64,
    active_window: Duration,
}

impl NotificationDispatcher {
    pub fn new(config: &Config, mailer: Option<Arc<dyn Mailer>>) -> Self {
        Self {
            mailer,
            public_url: config.public_url.clone(),
            daily_limit: config.email_daily_limit,
            active_window: Duration::minutes(config.presence_active_minutes),
        }
    }

    pub async fn on_new_message(
        &self,
        db: &Pool<Postgres>,
        message: &Message,
    ) -> AppResult<DispatchOutcome> {
        let sender_name = display_name(db, message.sender_id).await;
        let listing_title = listing_title(db, message.listing_id).await;
        let link = format!(
            "{}/messages/{}/{}",
            self.public_url, message.listing_id, message.sender_id
        );

        // Step 1: the in-app notification is unconditional. A failed insert
        // is logged and must not stop the email evaluation.
        let notification_created = match NotificationService::create(
            db,
            CreateNotification {
                user_id: message.receiver_id,
                kind: NotificationKind::NewMessage,
                title: format!("New message from {sender_name}"),
                body: message.body.clone(),
                link: Some(link.clone()),
                listing_id: Some(message.listing_id),
            },
        )
        .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error=%e, receiver=%message.receiver_id, "in-app notification insert failed");
                false
            }
        };

        let email = self
            .escalate_email(db, message, &sender_name, &listing_title, &link)
            .await;

        Ok(DispatchOutcome {
            notification_created,
            email,
        })
    }

    async fn escalate_email(
        &self,
        db: &Pool<Postgres>,
        message: &Message,
        sender_name: &str,
        listing_title: &str,
        link: &str,
    ) -> EmailOutcome {
        let Some(mailer) = self.mailer.as_ref() else {
            return EmailOutcome::Skipped(SkipReason::EmailDisabled);
        };

        let presence = match PresenceService::snapshot(db, message.receiver_id).await {
            Ok(Some(p)) => p,
            Ok(None) => return EmailOutcome::Skipped(SkipReason::NoEmailOnFile),
            Err(e) => {
                tracing::warn!(error=%e, "presence lookup failed; skipping email");
                return EmailOutcome::TransportFailed;
            }
        };

        let conversation = match ConversationService::find(
            db,
            message.listing_id,
            message.sender_id,
            message.receiver_id,
        )
        .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error=%e, "conversation lookup failed; skipping email");
                return EmailOutcome::TransportFailed;
            }
        };

        let sent_today = match DailyEmailBudget::used_today(db).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error=%e, "email counter read failed; skipping email");
                return EmailOutcome::TransportFailed;
            }
        };

        let signals = EmailSignals {
            now: Utc::now(),
            active_window: self.active_window,
            recipient_last_active: presence.last_active_at,
            recipient_email: presence.email.clone(),
            conversation_last_email: conversation.as_ref().and_then(|c| c.last_email_at),
            sent_today,
            daily_limit: self.daily_limit,
        };

        match evaluate_email(&signals) {
            EmailDecision::Skip(reason) => {
                tracing::debug!(?reason, receiver=%message.receiver_id, "email escalation skipped");
                return EmailOutcome::Skipped(reason);
            }
            EmailDecision::Eligible => {}
        }

        // Reserve before sending; re-check after the atomic increment so two
        // racing eligible dispatchers cannot both email past the cap.
        let reserved = match DailyEmailBudget::reserve(db).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error=%e, "email counter reservation failed");
                return EmailOutcome::TransportFailed;
            }
        };
        if reserved > self.daily_limit {
            tracing::warn!(reserved, limit = self.daily_limit, "daily email cap hit under race; aborting send");
            return EmailOutcome::CapExceededAfterReserve;
        }

        let to = presence.email.unwrap_or_default();
        let (subject, html) = new_message_email(sender_name, listing_title, &message.body, link);

        if let Err(e) = mailer.send_email(&to, &subject, &html).await {
            tracing::warn!(error=%e, receiver=%message.receiver_id, "notification email failed");
            return EmailOutcome::TransportFailed;
        }

        if let Some(conversation) = conversation {
            if let Err(e) = ConversationService::record_email_notified(db, conversation.id).await {
                tracing::warn!(error=%e, "failed to stamp last_email_at");
            }
        }

        tracing::info!(receiver=%message.receiver_id, listing=%message.listing_id, "notification email sent");
        EmailOutcome::Sent
    }
}

async fn display_name(db: &Pool<Postgres>, user_id: Uuid) -> String {
    let name: Option<String> = sqlx::query_scalar("SELECT display_name FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await
        .ok()
        .flatten();
    name.unwrap_or_else(|| "Someone".into())
}

async fn listing_title(db: &Pool<Postgres>, listing_id: Uuid) -> String {
    let title: Option<String> = sqlx::query_scalar("SELECT title FROM listings WHERE id = $1")
        .bind(listing_id)
        .fetch_optional(db)
        .await
        .ok()
        .flatten();
    title.unwrap_or_else(|| "your listing".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_signals() -> EmailSignals {
        let now = Utc::now();
        EmailSignals {
            now,
            active_window: Duration::minutes(5),
            recipient_last_active: now - Duration::hours(2),
            recipient_email: Some("b@uni.edu".into()),
            conversation_last_email: None,
            sent_today: 0,
            daily_limit: 280,
        }
    }

    #[test]
    fn idle_recipient_with_email_is_eligible() {
        assert_eq!(evaluate_email(&base_signals()), EmailDecision::Eligible);
    }

    #[test]
    fn active_recipient_short_circuits_everything_else() {
        let mut signals = base_signals();
        signals.recipient_last_active = signals.now - Duration::seconds(30);
        // Even with no email on file, activity is the first check to fire.
        signals.recipient_email = None;
        assert_eq!(
            evaluate_email(&signals),
            EmailDecision::Skip(SkipReason::RecipientActive)
        );
    }

    #[test]
    fn missing_or_blank_email_skips() {
        let mut signals = base_signals();
        signals.recipient_email = None;
        assert_eq!(
            evaluate_email(&signals),
            EmailDecision::Skip(SkipReason::NoEmailOnFile)
        );
        signals.recipient_email = Some("   ".into());
        assert_eq!(
            evaluate_email(&signals),
            EmailDecision::Skip(SkipReason::NoEmailOnFile)
        );
    }

    #[test]
    fn burst_within_suppression_window_sends_once() {
        let mut signals = base_signals();
        // First message of the burst: eligible.
        assert_eq!(evaluate_email(&signals), EmailDecision::Eligible);
        // An email went out after the recipient's last activity; the rest of
        // the burst is suppressed.
        signals.conversation_last_email = Some(signals.now - Duration::minutes(1));
        assert_eq!(
            evaluate_email(&signals),
            EmailDecision::Skip(SkipReason::AlreadyNotified)
        );
    }

    #[test]
    fn recipient_activity_after_last_email_rearms() {
        let mut signals = base_signals();
        signals.conversation_last_email = Some(signals.now - Duration::hours(3));
        // last_active (2h ago) is newer than the last email (3h ago).
        assert_eq!(evaluate_email(&signals), EmailDecision::Eligible);
    }

    #[test]
    fn daily_cap_blocks_at_limit() {
        let mut signals = base_signals();
        signals.sent_today = 280;
        assert_eq!(
            evaluate_email(&signals),
            EmailDecision::Skip(SkipReason::DailyCapReached)
        );
        signals.sent_today = 279;
        assert_eq!(evaluate_email(&signals), EmailDecision::Eligible);
    }
}
