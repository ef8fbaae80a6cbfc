//! Notification dispatcher scenarios against a real Postgres with a
//! recording mail transport. The daily email counter is global state, so
//! every counter-sensitive scenario lives in one sequential test body.
//! Set TEST_DATABASE_URL to run; the test skips otherwise.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use marketplace_messaging::config::Config;
use marketplace_messaging::error::AppError;
use marketplace_messaging::services::conversation_service::ConversationService;
use marketplace_messaging::services::dispatcher::{
    DispatchOutcome, EmailOutcome, NotificationDispatcher, SkipReason,
};
use marketplace_messaging::services::email_service::Mailer;
use marketplace_messaging::services::message_service::MessageService;
use marketplace_messaging::services::notification_service::NotificationService;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn last(&self) -> Option<(String, String)> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_email(&self, to: &str, subject: &str, _html: &str) -> Result<(), AppError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

fn test_config(limit: i64) -> Config {
    Config {
        database_url: String::new(),
        redis_url: String::new(),
        port: 0,
        jwt_secret: "test".into(),
        public_url: "http://test.local".into(),
        smtp: None,
        email_daily_limit: limit,
        presence_active_minutes: 5,
    }
}

/// Mirrors the send route's fan-out: store, refresh the aggregate, dispatch.
async fn send_and_dispatch(
    db: &Pool<Postgres>,
    dispatcher: &NotificationDispatcher,
    listing: Uuid,
    sender: Uuid,
    receiver: Uuid,
    body: &str,
) -> DispatchOutcome {
    let message = MessageService::send(db, listing, sender, receiver, body, None)
        .await
        .expect("send");
    ConversationService::refresh(db, listing, sender, receiver)
        .await
        .expect("refresh");
    dispatcher
        .on_new_message(db, &message)
        .await
        .expect("dispatch")
}

async fn notification_count(db: &Pool<Postgres>, user: Uuid) -> i64 {
    NotificationService::list(db, user, 50, 0)
        .await
        .expect("list notifications")
        .total
}

#[tokio::test]
async fn email_escalation_rules() {
    let Some(db) = common::try_pool().await else { return };

    let limit = 280;
    let mailer = Arc::new(RecordingMailer::default());
    let dispatcher = NotificationDispatcher::new(
        &test_config(limit),
        Some(mailer.clone() as Arc<dyn Mailer>),
    );

    // --- End-to-end: idle recipient with an email on file gets exactly one
    // email whose subject names the sender and the listing.
    common::reset_email_counter(&db, 0).await;
    let sara = common::create_user(&db, "Sara Seller", Some("sara@uni.edu")).await;
    let ben = common::create_user(&db, "Ben Buyer", Some("ben@uni.edu")).await;
    let listing = common::create_listing(&db, "Mini fridge", sara).await;
    common::set_last_active_minutes_ago(&db, sara, 60).await;

    let outcome =
        send_and_dispatch(&db, &dispatcher, listing, ben, sara, "Is this still available?").await;
    assert!(outcome.notification_created);
    assert_eq!(outcome.email, EmailOutcome::Sent);
    assert_eq!(notification_count(&db, sara).await, 1);
    assert_eq!(mailer.sent_count(), 1);
    let (to, subject) = mailer.last().expect("one email");
    assert_eq!(to, "sara@uni.edu");
    assert!(subject.contains("Ben Buyer"));
    assert!(subject.contains("Mini fridge"));

    let conversation = ConversationService::find(&db, listing, ben, sara)
        .await
        .expect("find")
        .expect("exists");
    let stamped = conversation.last_email_at.expect("last_email_at stamped");

    // --- Burst: two more messages inside the suppression window create
    // in-app notifications but no further email, and the stamp is unchanged.
    for body in ["Could you do $40?", "I can pick up today"] {
        let outcome = send_and_dispatch(&db, &dispatcher, listing, ben, sara, body).await;
        assert!(outcome.notification_created);
        assert_eq!(
            outcome.email,
            EmailOutcome::Skipped(SkipReason::AlreadyNotified)
        );
    }
    assert_eq!(mailer.sent_count(), 1, "burst sends exactly one email");
    assert_eq!(notification_count(&db, sara).await, 3);
    let conversation = ConversationService::find(&db, listing, ben, sara)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(conversation.last_email_at, Some(stamped));

    // --- Activity re-arms: recipient came back after the email, went idle
    // again, so the next message may email again.
    sqlx::query(
        "UPDATE conversations SET last_email_at = NOW() - make_interval(mins => 120) WHERE id = $1",
    )
    .bind(conversation.id)
    .execute(&db)
    .await
    .expect("backdate last_email_at");
    common::set_last_active_minutes_ago(&db, sara, 10).await;

    let outcome = send_and_dispatch(&db, &dispatcher, listing, ben, sara, "Still there?").await;
    assert_eq!(outcome.email, EmailOutcome::Sent);
    assert_eq!(mailer.sent_count(), 2);

    // --- Active recipient: in-app notification only.
    common::reset_email_counter(&db, 0).await;
    common::set_last_active_minutes_ago(&db, sara, 0).await;
    let outcome = send_and_dispatch(&db, &dispatcher, listing, ben, sara, "You around?").await;
    assert!(outcome.notification_created);
    assert_eq!(
        outcome.email,
        EmailOutcome::Skipped(SkipReason::RecipientActive)
    );
    assert_eq!(mailer.sent_count(), 2);

    // --- No email on file: skipped after the activity check.
    let no_email = common::create_user(&db, "Nadia NoEmail", None).await;
    common::set_last_active_minutes_ago(&db, no_email, 60).await;
    let listing2 = common::create_listing(&db, "Desk lamp", no_email).await;
    let outcome = send_and_dispatch(&db, &dispatcher, listing2, ben, no_email, "Hello?").await;
    assert!(outcome.notification_created);
    assert_eq!(
        outcome.email,
        EmailOutcome::Skipped(SkipReason::NoEmailOnFile)
    );

    // --- Counter at the cap: otherwise-eligible send is skipped and the
    // counter does not move.
    common::reset_email_counter(&db, limit as i32).await;
    common::set_last_active_minutes_ago(&db, sara, 60).await;
    let listing3 = common::create_listing(&db, "Bookshelf", sara).await;
    let outcome = send_and_dispatch(&db, &dispatcher, listing3, ben, sara, "Free later?").await;
    assert!(outcome.notification_created);
    assert_eq!(
        outcome.email,
        EmailOutcome::Skipped(SkipReason::DailyCapReached)
    );
    let sent: i32 = sqlx::query_scalar("SELECT sent FROM email_daily_counter WHERE day = CURRENT_DATE")
        .fetch_one(&db)
        .await
        .expect("read counter");
    assert_eq!(i64::from(sent), limit);

    // --- Race at limit-1: two concurrent eligible dispatches produce at
    // most one email, and the counter never exceeds limit + 1.
    common::reset_email_counter(&db, (limit - 1) as i32).await;
    let recv_a = common::create_user(&db, "Rita", Some("rita@uni.edu")).await;
    let recv_b = common::create_user(&db, "Remy", Some("remy@uni.edu")).await;
    common::set_last_active_minutes_ago(&db, recv_a, 60).await;
    common::set_last_active_minutes_ago(&db, recv_b, 60).await;
    let listing_a = common::create_listing(&db, "Skates", recv_a).await;
    let listing_b = common::create_listing(&db, "Scooter", recv_b).await;
    let before = mailer.sent_count();

    let (out_a, out_b) = tokio::join!(
        send_and_dispatch(&db, &dispatcher, listing_a, ben, recv_a, "skates?"),
        send_and_dispatch(&db, &dispatcher, listing_b, ben, recv_b, "scooter?"),
    );

    let sent_now = mailer.sent_count() - before;
    assert_eq!(sent_now, 1, "exactly one of the racers may email");
    for outcome in [out_a.email, out_b.email] {
        assert!(matches!(
            outcome,
            EmailOutcome::Sent
                | EmailOutcome::CapExceededAfterReserve
                | EmailOutcome::Skipped(SkipReason::DailyCapReached)
        ));
    }
    let sent: i32 = sqlx::query_scalar("SELECT sent FROM email_daily_counter WHERE day = CURRENT_DATE")
        .fetch_one(&db)
        .await
        .expect("read counter");
    assert!(i64::from(sent) <= limit + 1, "counter may overshoot by at most one");
}

#[tokio::test]
async fn dispatcher_without_mailer_still_notifies_in_app() {
    let Some(db) = common::try_pool().await else { return };

    let dispatcher = NotificationDispatcher::new(&test_config(280), None);
    let sara = common::create_user(&db, "Sara", Some("sara2@uni.edu")).await;
    let ben = common::create_user(&db, "Ben", None).await;
    let listing = common::create_listing(&db, "Kettle", sara).await;
    common::set_last_active_minutes_ago(&db, sara, 60).await;

    let outcome = send_and_dispatch(&db, &dispatcher, listing, ben, sara, "kettle?").await;
    assert!(outcome.notification_created);
    assert_eq!(
        outcome.email,
        EmailOutcome::Skipped(SkipReason::EmailDisabled)
    );
    assert_eq!(notification_count(&db, sara).await, 1);
}
