use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    AddressDraft, AddressPatch, AddressRecord, StatRecord, UserChanges, UserDraft, UserRecord,
};

/// Persistence seam for the intake and reporting services. Missing rows are
/// `Ok(None)` / `Ok(false)`; `Err` is reserved for infrastructure failures.
/// Soft-deleted users are invisible through every method.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, draft: UserDraft) -> anyhow::Result<UserRecord>;

    async fn list_users(&self) -> anyhow::Result<Vec<UserRecord>>;

    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<UserRecord>>;

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> anyhow::Result<Option<UserRecord>>;

    async fn soft_delete_user(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn list_addresses(&self, user_id: Uuid) -> anyhow::Result<Vec<AddressRecord>>;

    async fn add_address(
        &self,
        user_id: Uuid,
        draft: AddressDraft,
    ) -> anyhow::Result<Option<AddressRecord>>;

    async fn update_address(
        &self,
        user_id: Uuid,
        address_id: Uuid,
        patch: AddressPatch,
    ) -> anyhow::Result<Option<AddressRecord>>;

    async fn delete_address(&self, user_id: Uuid, address_id: Uuid) -> anyhow::Result<bool>;

    async fn users_in_month(&self, year: i32, month: u32) -> anyhow::Result<Vec<UserRecord>>;

    async fn stat_records(&self) -> anyhow::Result<Vec<StatRecord>>;
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let users = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Sara",
            "Ahmadi",
            "Female",
            "1403/01/15",
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Reza",
            "Karimi",
            "Male",
            "1403/01/15",
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Ali",
            "Rahimi",
            "Male",
            "1403/01/16",
        ),
        (
            Uuid::parse_str("8f3b2c1e-5a4d-4e6f-9b7a-1c2d3e4f5a6b")?,
            "Maryam",
            "Hosseini",
            "Female",
            "1403/02/09",
        ),
    ];

    for (id, first_name, last_name, gender, persian_date) in users {
        sqlx::query(
            r#"
            INSERT INTO forms.users (id, first_name, last_name, gender, persian_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .bind(gender)
        .bind(persian_date)
        .execute(pool)
        .await?;
    }

    let addresses = vec![
        (
            Uuid::parse_str("a1b2c3d4-0001-4000-8000-000000000001")?,
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Home",
            "Tehran, Valiasr St.",
        ),
        (
            Uuid::parse_str("a1b2c3d4-0002-4000-8000-000000000002")?,
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Work",
            "Isfahan, Chaharbagh St.",
        ),
    ];

    for (id, user_id, subject, details) in addresses {
        sqlx::query(
            r#"
            INSERT INTO forms.addresses (id, user_id, subject, details)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(subject)
        .bind(details)
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_addresses(&self, users: &mut [UserRecord]) -> anyhow::Result<()> {
        if users.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = users.iter().map(|user| user.id).collect();
        let rows = sqlx::query(
            "SELECT id, user_id, subject, details FROM forms.addresses \
             WHERE user_id = ANY($1) ORDER BY subject, id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .context("failed to load addresses")?;

        let mut by_user: HashMap<Uuid, Vec<AddressRecord>> = HashMap::new();
        for row in rows {
            let address = address_from_row(&row);
            by_user.entry(address.user_id).or_default().push(address);
        }
        for user in users.iter_mut() {
            user.addresses = by_user.remove(&user.id).unwrap_or_default();
        }

        Ok(())
    }

    async fn fetch_users(&self, filter: &str, pattern: Option<String>) -> anyhow::Result<Vec<UserRecord>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM forms.users WHERE deleted_at IS NULL{filter} ORDER BY created_at, id"
        );

        let mut rows = sqlx::query(&query);
        if let Some(value) = pattern {
            rows = rows.bind(value);
        }

        let mut users: Vec<UserRecord> = rows
            .fetch_all(&self.pool)
            .await
            .context("failed to load users")?
            .iter()
            .map(user_from_row)
            .collect();
        self.attach_addresses(&mut users).await?;
        Ok(users)
    }
}

const USER_COLUMNS: &str =
    "id, first_name, last_name, phone_number, gender, persian_date, created_at, deleted_at";

fn user_from_row(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        phone_number: row.get("phone_number"),
        gender: row.get("gender"),
        persian_date: row.get("persian_date"),
        created_at: row.get("created_at"),
        deleted_at: row.get("deleted_at"),
        addresses: Vec::new(),
    }
}

fn address_from_row(row: &PgRow) -> AddressRecord {
    AddressRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        subject: row.get("subject"),
        details: row.get("details"),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(&self, draft: UserDraft) -> anyhow::Result<UserRecord> {
        let mut tx = self.pool.begin().await?;
        let user_id = Uuid::new_v4();

        let row = sqlx::query(&format!(
            "INSERT INTO forms.users (id, first_name, last_name, phone_number, gender, persian_date) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(&draft.first_name)
        .bind(&draft.last_name)
        .bind(&draft.phone_number)
        .bind(draft.gender.as_str())
        .bind(&draft.persian_date)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert user")?;

        let mut user = user_from_row(&row);
        for address in draft.addresses {
            let row = sqlx::query(
                "INSERT INTO forms.addresses (id, user_id, subject, details) \
                 VALUES ($1, $2, $3, $4) RETURNING id, user_id, subject, details",
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&address.subject)
            .bind(&address.details)
            .fetch_one(&mut *tx)
            .await
            .context("failed to insert address")?;
            user.addresses.push(address_from_row(&row));
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn list_users(&self) -> anyhow::Result<Vec<UserRecord>> {
        self.fetch_users("", None).await
    }

    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<UserRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM forms.users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load user")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut users = vec![user_from_row(&row)];
        self.attach_addresses(&mut users).await?;
        Ok(users.pop())
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> anyhow::Result<Option<UserRecord>> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT id FROM forms.users WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_none() {
            return Ok(None);
        }

        sqlx::query(
            r#"
            UPDATE forms.users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                phone_number = COALESCE($4, phone_number),
                gender = COALESCE($5, gender),
                persian_date = COALESCE($6, persian_date)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.phone_number)
        .bind(changes.gender.map(|gender| gender.as_str()))
        .bind(changes.persian_date)
        .execute(&mut *tx)
        .await
        .context("failed to update user")?;

        if let Some(addresses) = changes.addresses {
            sqlx::query("DELETE FROM forms.addresses WHERE user_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            for address in addresses {
                sqlx::query(
                    "INSERT INTO forms.addresses (id, user_id, subject, details) VALUES ($1, $2, $3, $4)",
                )
                .bind(Uuid::new_v4())
                .bind(id)
                .bind(&address.subject)
                .bind(&address.details)
                .execute(&mut *tx)
                .await
                .context("failed to replace addresses")?;
            }
        }

        tx.commit().await?;
        self.get_user(id).await
    }

    async fn soft_delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
        let now: DateTime<Utc> = Utc::now();
        let result = sqlx::query(
            "UPDATE forms.users SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_addresses(&self, user_id: Uuid) -> anyhow::Result<Vec<AddressRecord>> {
        let rows = sqlx::query(
            "SELECT a.id, a.user_id, a.subject, a.details FROM forms.addresses a \
             JOIN forms.users u ON u.id = a.user_id \
             WHERE a.user_id = $1 AND u.deleted_at IS NULL ORDER BY a.subject, a.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(address_from_row).collect())
    }

    async fn add_address(
        &self,
        user_id: Uuid,
        draft: AddressDraft,
    ) -> anyhow::Result<Option<AddressRecord>> {
        let row = sqlx::query(
            "INSERT INTO forms.addresses (id, user_id, subject, details) \
             SELECT $1, u.id, $3, $4 FROM forms.users u WHERE u.id = $2 AND u.deleted_at IS NULL \
             RETURNING id, user_id, subject, details",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&draft.subject)
        .bind(&draft.details)
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert address")?;
        Ok(row.as_ref().map(address_from_row))
    }

    async fn update_address(
        &self,
        user_id: Uuid,
        address_id: Uuid,
        patch: AddressPatch,
    ) -> anyhow::Result<Option<AddressRecord>> {
        let row = sqlx::query(
            "UPDATE forms.addresses SET subject = COALESCE($3, subject), details = COALESCE($4, details) \
             WHERE id = $1 AND user_id = $2 \
               AND EXISTS (SELECT 1 FROM forms.users u WHERE u.id = $2 AND u.deleted_at IS NULL) \
             RETURNING id, user_id, subject, details",
        )
        .bind(address_id)
        .bind(user_id)
        .bind(patch.subject)
        .bind(patch.details)
        .fetch_optional(&self.pool)
        .await
        .context("failed to update address")?;
        Ok(row.as_ref().map(address_from_row))
    }

    async fn delete_address(&self, user_id: Uuid, address_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "DELETE FROM forms.addresses WHERE id = $1 AND user_id = $2 \
               AND EXISTS (SELECT 1 FROM forms.users u WHERE u.id = $2 AND u.deleted_at IS NULL)",
        )
        .bind(address_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("failed to delete address")?;
        Ok(result.rows_affected() > 0)
    }

    async fn users_in_month(&self, year: i32, month: u32) -> anyhow::Result<Vec<UserRecord>> {
        self.fetch_users(
            " AND persian_date LIKE $1",
            Some(format!("{year:04}/{month:02}/%")),
        )
        .await
    }

    async fn stat_records(&self) -> anyhow::Result<Vec<StatRecord>> {
        let rows = sqlx::query(
            "SELECT persian_date, gender, created_at FROM forms.users WHERE deleted_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load statistics snapshot")?;

        Ok(rows
            .iter()
            .map(|row| StatRecord {
                persian_date: row.get("persian_date"),
                created_at: Some(row.get("created_at")),
                gender: row.get("gender"),
            })
            .collect())
    }
}
