use anyhow::Result;
use libsql::Value;
use serde::Serialize;

use crate::api::{Attributes, JsonApiResource, Page, is_blank, require_present};
use crate::db::{Database, Filter, NOW, like_pattern};
use crate::error::ValidationErrors;
use crate::sort::SortOrder;

pub const USER_SORT_KEYS: &[(&str, &str)] = &[("email", "email"), ("username", "username")];

#[derive(Debug, Clone, Serialize)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    pub email: String,
    pub username: String,
    pub admin: bool,
    pub avatar: Option<String>,
    /// Filled from the avatar upload when the user is rendered.
    pub avatar_url: Option<String>,
    pub avatar_checksum: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JsonApiResource for User {
    const TYPE: &'static str = "users";

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserForm {
    pub email: Option<String>,
    pub username: Option<String>,
    pub admin: bool,
}

/// Loose shape check: one `@`, something on both sides, a dot in the domain.
pub fn looks_like_email(raw: &str) -> bool {
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !raw.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
}

impl UserForm {
    pub fn assign(&mut self, attrs: &Attributes, errors: &mut ValidationErrors) {
        if let Some(v) = attrs.string("email", errors) {
            self.email = v.map(|s| s.trim().to_string());
        }
        if let Some(v) = attrs.string("username", errors) {
            self.username = v.map(|s| s.trim().to_string());
        }
        if let Some(v) = attrs.boolean("admin", errors) {
            self.admin = v;
        }
    }

    pub fn validate(&self, errors: &mut ValidationErrors) {
        require_present(errors, "email", !is_blank(&self.email));
        if let Some(email) = self.email.as_deref().filter(|s| !s.is_empty()) {
            if !looks_like_email(email) {
                errors.add("email", "is invalid");
            }
        }
        require_present(errors, "username", !is_blank(&self.username));
    }
}

#[derive(Debug, Default)]
pub struct UserFilter {
    pub search: Option<String>,
}

impl UserFilter {
    fn to_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(term) = &self.search {
            let pattern = like_pattern(term);
            filter.push(
                r"(LOWER(users.email) LIKE ? ESCAPE '\' OR LOWER(users.username) LIKE ? ESCAPE '\')",
                [pattern.clone(), pattern],
            );
        }
        filter
    }
}

const USER_COLUMNS: &str =
    "users.id, users.email, users.username, users.admin, users.avatar, users.created_at, users.updated_at";

pub struct Users<'a> {
    db: &'a Database,
}

impl<'a> Users<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn username_taken(&self, username: &str, except: Option<i64>) -> Result<ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT 1 FROM users WHERE LOWER(username) = LOWER(?) AND id != ? LIMIT 1",
                libsql::params![username, except.unwrap_or(0)],
            )
            .await?;

        if rows.next().await?.is_some() {
            errors.add("username", "has already been taken");
        }
        Ok(errors)
    }

    pub async fn list_users(&self, filter: &UserFilter, order: SortOrder, page: &Page) -> Result<(Vec<User>, i64)> {
        let filter = filter.to_filter();
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users {} {} LIMIT ? OFFSET ?",
            filter.where_sql(),
            order.to_sql("users")
        );

        let mut params = filter.params();
        params.push(Value::Integer(page.limit as i64));
        params.push(Value::Integer(page.offset as i64));

        let mut rows = self.db.connection().query(&query, params).await?;
        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            users.push(row_to_user(&row)?);
        }

        let total = self
            .db
            .count(
                &format!("SELECT COUNT(*) FROM users {}", filter.where_sql()),
                filter.params(),
            )
            .await?;

        Ok((users, total))
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE users.id = ?");
        let mut rows = self.db.connection().query(&query, libsql::params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn create_user(&self, form: &UserForm) -> Result<User> {
        let query = format!(
            "INSERT INTO users (email, username, admin) VALUES (?, ?, ?)
             RETURNING {USER_COLUMNS}"
        );

        let mut rows = self
            .db
            .connection()
            .query(
                &query,
                libsql::params![form.email.clone(), form.username.clone(), form.admin as i64],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_user(&row),
            None => anyhow::bail!("Failed to create user"),
        }
    }

    pub async fn set_avatar(&self, id: i64, identifier: Option<&str>) -> Result<bool> {
        let query = format!("UPDATE users SET avatar = ?, updated_at = {NOW} WHERE id = ?");
        let changed = self
            .db
            .connection()
            .execute(&query, libsql::params![identifier, id])
            .await?;
        Ok(changed > 0)
    }

    /// Clears the avatar only while it still points at `identifier`.
    pub async fn clear_avatar(&self, id: i64, identifier: &str) -> Result<bool> {
        let query = format!("UPDATE users SET avatar = NULL, updated_at = {NOW} WHERE id = ? AND avatar = ?");
        let changed = self
            .db
            .connection()
            .execute(&query, libsql::params![id, identifier])
            .await?;
        Ok(changed > 0)
    }

    pub async fn delete_user(&self, id: i64) -> Result<bool> {
        let result = self
            .db
            .connection()
            .execute("DELETE FROM users WHERE id = ?", libsql::params![id])
            .await?;
        Ok(result > 0)
    }
}

fn row_to_user(row: &libsql::Row) -> Result<User> {
    let admin: i64 = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        admin: admin != 0,
        avatar: row.get(4)?,
        avatar_url: None,
        avatar_checksum: None,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(email: &str, username: &str) -> UserForm {
        UserForm {
            email: Some(email.to_string()),
            username: Some(username.to_string()),
            admin: false,
        }
    }

    #[test]
    fn checks_email_shape() {
        assert!(looks_like_email("ada@example.com"));
        assert!(!looks_like_email("ada"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("ada@localhost"));
        assert!(!looks_like_email("ada lovelace@example.com"));
        assert!(!looks_like_email("ada@@example.com"));
    }

    #[test]
    fn validates_presence() {
        let mut errors = ValidationErrors::new();
        UserForm::default().validate(&mut errors);
        assert_eq!(errors.on("email"), ["can't be blank"]);
        assert_eq!(errors.on("username"), ["can't be blank"]);

        let mut errors = ValidationErrors::new();
        form("nope", "ada").validate(&mut errors);
        assert_eq!(errors.on("email"), ["is invalid"]);
    }

    #[tokio::test]
    async fn usernames_are_unique_ignoring_case() {
        let db = Database::in_memory().await.unwrap();
        let users = Users::new(&db);

        let ada = users.create_user(&form("ada@example.com", "Ada")).await.unwrap();
        assert!(!ada.admin);

        assert!(users.username_taken("ada", None).await.unwrap().has("username"));
        assert!(users.username_taken("ADA", Some(ada.id)).await.unwrap().is_empty());
        assert!(users.username_taken("grace", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clears_only_the_current_avatar() {
        let db = Database::in_memory().await.unwrap();
        let users = Users::new(&db);
        let ada = users.create_user(&form("ada@example.com", "ada")).await.unwrap();

        users.set_avatar(ada.id, Some("me.png")).await.unwrap();
        assert!(!users.clear_avatar(ada.id, "old.png").await.unwrap());
        assert!(users.clear_avatar(ada.id, "me.png").await.unwrap());

        let ada = users.get_user(ada.id).await.unwrap().unwrap();
        assert!(ada.avatar.is_none());
    }
}
