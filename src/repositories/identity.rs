//! C1 Identity Store: principals and the profile/contact/address rows they own.
//!
//! Every query is hand-written sqlx, bound positionally and mapped with
//! `query_as`/`FromRow`, matching how the rest of the kernel talks to Postgres --
//! no query builder, no ORM.

use chrono::Utc;
use sqlx::PgPool;

use crate::error::AppError;
use crate::ids;
use crate::models::{
    Address, Contact, CreateUserInput, DeleteReceipt, Principal, PrincipalKind, Profile,
    UpdateUserInput, UserStatus,
};

#[derive(Clone)]
pub struct IdentityRepository {
    db: PgPool,
}

impl IdentityRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn exists(&self, id: &str) -> Result<bool, AppError> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM principals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.is_some())
    }

    pub async fn create(&self, input: CreateUserInput, password_hash: String) -> Result<Principal, AppError> {
        if self.get_by_phone(&input.country_code, &input.phone_number).await?.is_some() {
            return Err(AppError::AlreadyExists(
                "a principal with this phone number already exists".to_string(),
            ));
        }

        let id = ids::generate_unique("USR", |candidate| {
            let db = self.db.clone();
            async move {
                let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM principals WHERE id = $1")
                    .bind(&candidate)
                    .fetch_optional(&db)
                    .await?;
                Ok(row.is_some())
            }
        })
        .await?;

        let now = Utc::now();
        let principal = sqlx::query_as::<_, Principal>(
            r#"
            INSERT INTO principals (
                id, kind, phone_number, country_code, aadhaar_number, password_hash, mpin_hash, mfa_secret,
                status, is_validated, username, tokens, created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, NULL, NULL, $7, false, $8, 0, $9, $9, 1)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(PrincipalKind::User)
        .bind(&input.phone_number)
        .bind(&input.country_code)
        .bind(&input.aadhaar_number)
        .bind(&password_hash)
        .bind(UserStatus::Pending)
        .bind(&input.username)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        Ok(principal)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Principal>, AppError> {
        let principal = sqlx::query_as::<_, Principal>(
            "SELECT * FROM principals WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(principal)
    }

    pub async fn require_by_id(&self, id: &str) -> Result<Principal, AppError> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("principal {id} not found")))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<Principal>, AppError> {
        let principal = sqlx::query_as::<_, Principal>(
            "SELECT * FROM principals WHERE username = $1 AND deleted_at IS NULL",
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(principal)
    }

    pub async fn get_by_aadhaar(&self, aadhaar_number: &str) -> Result<Option<Principal>, AppError> {
        let principal = sqlx::query_as::<_, Principal>(
            "SELECT * FROM principals WHERE aadhaar_number = $1 AND deleted_at IS NULL",
        )
        .bind(aadhaar_number)
        .fetch_optional(&self.db)
        .await?;
        Ok(principal)
    }

    pub async fn get_by_phone(
        &self,
        country_code: &str,
        phone_number: &str,
    ) -> Result<Option<Principal>, AppError> {
        let principal = sqlx::query_as::<_, Principal>(
            "SELECT * FROM principals WHERE country_code = $1 AND phone_number = $2 AND deleted_at IS NULL",
        )
        .bind(country_code)
        .bind(phone_number)
        .fetch_optional(&self.db)
        .await?;
        Ok(principal)
    }

    pub async fn update(&self, id: &str, input: UpdateUserInput, expected_version: i64) -> Result<Principal, AppError> {
        let current = self.require_by_id(id).await?;
        if current.version != expected_version {
            return Err(AppError::Conflict(
                "principal was modified by another request".to_string(),
            ));
        }

        let username = input.username.unwrap_or(current.username.clone().unwrap_or_default());
        let status = input.status.unwrap_or(current.status);
        let is_validated = input.is_validated.unwrap_or(current.is_validated);

        let updated = sqlx::query_as::<_, Principal>(
            r#"
            UPDATE principals
            SET username = $1, status = $2, is_validated = $3, updated_at = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(status)
        .bind(is_validated)
        .bind(Utc::now())
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::Conflict("principal was modified concurrently".to_string()))?;

        Ok(updated)
    }

    pub async fn soft_delete(&self, id: &str, deleted_by: Option<String>) -> Result<DeleteReceipt, AppError> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let row: Option<(String, chrono::DateTime<Utc>)> = sqlx::query_as(
            "UPDATE principals SET deleted_at = $1, updated_at = $1 WHERE id = $2 AND deleted_at IS NULL RETURNING id, deleted_at",
        )
        .bind(now)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let (id, deleted_at) = row.ok_or_else(|| AppError::NotFound(format!("principal {id} not found")))?;

        // cascade soft-delete owned profile/contact/address rows (§3 ownership invariant).
        sqlx::query("UPDATE profiles SET deleted_at = $1 WHERE principal_id = $2 AND deleted_at IS NULL")
            .bind(now)
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE contacts SET deleted_at = $1 WHERE principal_id = $2 AND deleted_at IS NULL")
            .bind(now)
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE addresses SET deleted_at = $1 WHERE principal_id = $2 AND deleted_at IS NULL")
            .bind(now)
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(DeleteReceipt {
            id,
            deleted_at,
            deleted_by,
        })
    }

    pub async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Principal>, AppError> {
        let rows = sqlx::query_as::<_, Principal>(
            "SELECT * FROM principals WHERE deleted_at IS NULL ORDER BY created_at DESC OFFSET $1 LIMIT $2",
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn list_active(&self, offset: i64, limit: i64) -> Result<Vec<Principal>, AppError> {
        let rows = sqlx::query_as::<_, Principal>(
            "SELECT * FROM principals WHERE deleted_at IS NULL AND status = $1 ORDER BY created_at DESC OFFSET $2 LIMIT $3",
        )
        .bind(UserStatus::Active)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<Principal>, AppError> {
        let pattern = format!("%{query}%");
        let rows = sqlx::query_as::<_, Principal>(
            r#"
            SELECT * FROM principals
            WHERE deleted_at IS NULL
              AND (username ILIKE $1 OR phone_number ILIKE $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn count(&self) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM principals WHERE deleted_at IS NULL")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    pub async fn add_tokens(&self, id: &str, amount: i64) -> Result<Principal, AppError> {
        if amount < 0 {
            return Err(AppError::InvalidInput("amount must not be negative".to_string()));
        }
        let principal = sqlx::query_as::<_, Principal>(
            "UPDATE principals SET tokens = tokens + $1, updated_at = $2, version = version + 1 WHERE id = $3 AND deleted_at IS NULL RETURNING *",
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("principal {id} not found")))?;
        Ok(principal)
    }

    pub async fn deduct_tokens(&self, id: &str, amount: i64) -> Result<Principal, AppError> {
        if amount < 0 {
            return Err(AppError::InvalidInput("amount must not be negative".to_string()));
        }
        let principal = sqlx::query_as::<_, Principal>(
            "UPDATE principals SET tokens = tokens - $1, updated_at = $2, version = version + 1 WHERE id = $3 AND deleted_at IS NULL AND tokens >= $1 RETURNING *",
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InsufficientTokens)?;
        Ok(principal)
    }

    pub async fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE principals SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn set_mpin_hash(&self, id: &str, mpin_hash: Option<&str>) -> Result<(), AppError> {
        sqlx::query("UPDATE principals SET mpin_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(mpin_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn set_mfa_secret(&self, id: &str, mfa_secret: Option<&str>) -> Result<(), AppError> {
        sqlx::query("UPDATE principals SET mfa_secret = $1, updated_at = $2 WHERE id = $3")
            .bind(mfa_secret)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn get_profile(&self, principal_id: &str) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT * FROM profiles WHERE principal_id = $1 AND deleted_at IS NULL",
        )
        .bind(principal_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(profile)
    }

    pub async fn upsert_profile(&self, principal_id: &str, full_name: &str, display_name: Option<&str>) -> Result<Profile, AppError> {
        let existing = self.get_profile(principal_id).await?;
        let now = Utc::now();

        if let Some(existing) = existing {
            let profile = sqlx::query_as::<_, Profile>(
                "UPDATE profiles SET full_name = $1, display_name = $2, updated_at = $3, version = version + 1 WHERE id = $4 RETURNING *",
            )
            .bind(full_name)
            .bind(display_name)
            .bind(now)
            .bind(&existing.id)
            .fetch_one(&self.db)
            .await?;
            return Ok(profile);
        }

        let id = ids::generate("PRF");
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, principal_id, full_name, display_name, avatar_url, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, NULL, $5, $5, 1)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(principal_id)
        .bind(full_name)
        .bind(display_name)
        .bind(now)
        .fetch_one(&self.db)
        .await?;
        Ok(profile)
    }

    pub async fn get_contact(&self, principal_id: &str) -> Result<Option<Contact>, AppError> {
        let contact = sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE principal_id = $1 AND deleted_at IS NULL",
        )
        .bind(principal_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(contact)
    }

    pub async fn list_addresses(&self, principal_id: &str) -> Result<Vec<Address>, AppError> {
        let rows = sqlx::query_as::<_, Address>(
            "SELECT * FROM addresses WHERE principal_id = $1 AND deleted_at IS NULL ORDER BY created_at",
        )
        .bind(principal_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
