//! Process-wide settings

use turso::Database;

use crate::error::Result;

/// Key/value settings with upsert semantics.
pub struct SettingsRepo<'a> {
    db: &'a Database,
}

impl<'a> SettingsRepo<'a> {
    /// Create a new settings repository.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Get a setting. An unset key is `None`, not an error.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query("SELECT value FROM settings WHERE key = ?1", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Set a setting, overwriting any previous value.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.db.connect()?;

        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )
        .await?;

        Ok(())
    }
}
