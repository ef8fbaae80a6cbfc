use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

/// Connects to the test database and applies migrations. Returns `None`
/// (callers skip) when `TEST_DATABASE_URL` is not set.
#[allow(dead_code)]
pub async fn try_pool() -> Option<Pool<Postgres>> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set; skipping database test");
            return None;
        }
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to test database");
    marketplace_messaging::db::run_migrations(&pool)
        .await
        .expect("run migrations");
    Some(pool)
}

#[allow(dead_code)]
pub async fn create_user(db: &Pool<Postgres>, name: &str, email: Option<&str>) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, display_name, email) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(name)
        .bind(email)
        .execute(db)
        .await
        .expect("insert user");
    id
}

#[allow(dead_code)]
pub async fn create_listing(db: &Pool<Postgres>, title: &str, seller_id: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO listings (id, title, seller_id) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(title)
        .bind(seller_id)
        .execute(db)
        .await
        .expect("insert listing");
    id
}

/// Backdates a user's presence signal by `minutes`.
#[allow(dead_code)]
pub async fn set_last_active_minutes_ago(db: &Pool<Postgres>, user_id: Uuid, minutes: i32) {
    sqlx::query("UPDATE users SET last_active_at = NOW() - make_interval(mins => $1) WHERE id = $2")
        .bind(minutes)
        .bind(user_id)
        .execute(db)
        .await
        .expect("set last_active_at");
}

#[allow(dead_code)]
pub async fn reset_email_counter(db: &Pool<Postgres>, sent: i32) {
    sqlx::query(
        "INSERT INTO email_daily_counter (day, sent) VALUES (CURRENT_DATE, $1)
         ON CONFLICT (day) DO UPDATE SET sent = EXCLUDED.sent",
    )
    .bind(sent)
    .execute(db)
    .await
    .expect("reset email counter");
}
