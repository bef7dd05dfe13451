//! Staff user database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{column_enum, Database, DbResult};
use crate::models::{Role, User};

const USER_COLUMNS: &str =
    "user_id, username, display_name, role, active, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        role: column_enum(3, row.get(3)?, Role::parse)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl Database {
    /// Insert a new user.
    pub fn insert_user(&self, user: &User) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO users (
                user_id, username, display_name, role, active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                user.user_id,
                user.username,
                user.display_name,
                user.role.as_str(),
                user.active,
                user.created_at,
                user.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update name, role and active flag.
    pub fn update_user(&self, user: &User) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE users SET
                display_name = ?2,
                role = ?3,
                active = ?4,
                updated_at = ?5
            WHERE user_id = ?1
            "#,
            params![
                user.user_id,
                user.display_name,
                user.role.as_str(),
                user.active,
                user.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a user by ID.
    pub fn get_user(&self, user_id: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE user_id = ?", USER_COLUMNS);
        self.conn
            .query_row(&sql, [user_id], user_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Get a user by login name.
    pub fn get_user_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
        self.conn
            .query_row(&sql, [username], user_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// List users, active first then by name.
    pub fn list_users(&self) -> DbResult<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY active DESC, display_name",
            USER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], user_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Number of active admins (the last one cannot be demoted).
    pub fn count_active_admins(&self) -> DbResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE role = 'admin' AND active = 1",
                [],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let db = Database::open_in_memory().unwrap();
        let user = User::new("wanjiru".into(), "Wanjiru M".into(), Role::Cashier);
        db.insert_user(&user).unwrap();

        let retrieved = db.get_user(&user.user_id).unwrap().unwrap();
        assert_eq!(retrieved, user);

        let by_name = db.get_user_by_username("wanjiru").unwrap().unwrap();
        assert_eq!(by_name.user_id, user.user_id);
    }

    #[test]
    fn test_username_unique() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&User::new("sam".into(), "Sam".into(), Role::Nurse))
            .unwrap();
        let result = db.insert_user(&User::new("sam".into(), "Other Sam".into(), Role::Doctor));
        assert!(result.is_err());
    }

    #[test]
    fn test_update_role_and_count_admins() {
        let db = Database::open_in_memory().unwrap();
        let mut user = User::new("root".into(), "Root".into(), Role::Admin);
        db.insert_user(&user).unwrap();
        assert_eq!(db.count_active_admins().unwrap(), 1);

        user.role = Role::Manager;
        assert!(db.update_user(&user).unwrap());
        assert_eq!(db.count_active_admins().unwrap(), 0);
        assert_eq!(db.get_user(&user.user_id).unwrap().unwrap().role, Role::Manager);
    }
}
