/// Row builders shared by unit tests
use sqlx::SqlitePool;

pub async fn user(pool: &SqlitePool, username: &str) -> i64 {
    user_created_at(pool, username, "2024-01-01 00:00:00").await
}

pub async fn user_created_at(pool: &SqlitePool, username: &str, created_at: &str) -> i64 {
    let id = sqlx::query(
        "INSERT INTO users (username, password_hash, role, created_at) VALUES (?, 'x', 'Regular', ?)",
    )
    .bind(username)
    .bind(created_at)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid();

    sqlx::query(
        "INSERT INTO user_info (user_id, first_name, last_name, email, contact_number) VALUES (?, 'Test', 'User', ?, ?)",
    )
    .bind(id)
    .bind(format!("{}@example.com", username))
    .bind(format!("0917{:07}", id))
    .execute(pool)
    .await
    .unwrap();

    id
}

pub async fn category(pool: &SqlitePool, name: &str) -> i64 {
    sqlx::query("INSERT INTO categories (name, description) VALUES (?, '')")
        .bind(name)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

pub async fn location(pool: &SqlitePool, city: &str, state: &str) -> i64 {
    sqlx::query(
        r#"
        INSERT INTO locations (latitude, longitude, street, district, city, state, country, postal_code)
        VALUES (14.6, 121.0, 'Main Street', 'Central', ?, ?, 'Philippines', '1000')
        "#,
    )
    .bind(city)
    .bind(state)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

pub async fn report(
    pool: &SqlitePool,
    user_id: i64,
    category_id: i64,
    location_id: i64,
    created_at: &str,
) -> i64 {
    sqlx::query(
        r#"
        INSERT INTO reports (title, description, category_id, location_id, user_id, status, created_at, updated_at)
        VALUES ('Broken streetlight', 'Dark corner at night', ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(category_id)
    .bind(location_id)
    .bind(user_id)
    .bind(created_at)
    .bind(created_at)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

pub async fn image(pool: &SqlitePool, report_id: i64, url: &str) -> i64 {
    let is_default = crate::images::is_default_image(url);
    sqlx::query(
        "INSERT INTO images (image_url, report_id, is_default, uploaded_at) VALUES (?, ?, ?, '2024-01-01 00:00:00')",
    )
    .bind(url)
    .bind(report_id)
    .bind(is_default)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

pub async fn vote(pool: &SqlitePool, report_id: i64, user_id: i64, vote_type: &str) {
    sqlx::query(
        "INSERT INTO votes (report_id, user_id, vote_type, created_at) VALUES (?, ?, ?, '2024-01-01 00:00:00')",
    )
    .bind(report_id)
    .bind(user_id)
    .bind(vote_type)
    .execute(pool)
    .await
    .unwrap();
}
