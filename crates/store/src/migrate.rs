//! Schema creation and evolution
//!
//! Tables are created with `IF NOT EXISTS`; column evolution is driven
//! by `PRAGMA table_info`, so every step is a no-op when already
//! applied. The one structural change (dropping the obsolete
//! `destination_channel_id` from collectors) rebuilds the table inside
//! a transaction.
//!
//! Optional references (route destination/transformation/integration,
//! collector integration) are stored as empty strings rather than SQL
//! NULL; repos translate at the boundary. Referential cleanup is done
//! explicitly in the repos, which also keeps `collector-output:<id>`
//! route sources (not channel ids) legal.

use tracing::info;
use turso::{Connection, Database};

use crate::error::Result;

// =============================================================================
// Schema
// =============================================================================

// Creation order matters: channels reference applications.
const SCHEMA_APPLICATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS applications (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    client_secret TEXT NOT NULL,
    id_token TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

const SCHEMA_CHANNELS: &str = r#"
CREATE TABLE IF NOT EXISTS channels (
    id TEXT PRIMARY KEY,
    application_id TEXT NOT NULL,
    name TEXT NOT NULL,
    direction TEXT NOT NULL,
    destination TEXT NOT NULL,
    fanout_mode INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    FOREIGN KEY (application_id) REFERENCES applications(id),
    UNIQUE(application_id, name)
)
"#;

const SCHEMA_TRANSFORMATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS transformations (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    engine TEXT NOT NULL,
    script TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

const SCHEMA_INTEGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS integrations (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

const SCHEMA_COLLECTORS: &str = r#"
CREATE TABLE IF NOT EXISTS collectors (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    schedule TEXT NOT NULL,
    engine TEXT NOT NULL,
    script TEXT NOT NULL,
    integration_id TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

const SCHEMA_ROUTES: &str = r#"
CREATE TABLE IF NOT EXISTS routes (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    source_channel_id TEXT NOT NULL DEFAULT '',
    destination_channel_id TEXT NOT NULL DEFAULT '',
    route_type TEXT NOT NULL DEFAULT 'direct',
    transformation_id TEXT NOT NULL DEFAULT '',
    integration_id TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT ''
)
"#;

const SCHEMA_SETTINGS: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

// =============================================================================
// Migration entry point
// =============================================================================

/// Create missing tables and apply column evolutions. Idempotent.
pub(crate) async fn run(db: &Database) -> Result<()> {
    let conn = db.connect()?;

    for schema in [
        SCHEMA_APPLICATIONS,
        SCHEMA_CHANNELS,
        SCHEMA_TRANSFORMATIONS,
        SCHEMA_INTEGRATIONS,
        SCHEMA_COLLECTORS,
        SCHEMA_ROUTES,
        SCHEMA_SETTINGS,
    ] {
        conn.execute(schema, ()).await?;
    }

    migrate_channels(&conn).await?;
    migrate_routes(&conn).await?;
    migrate_collectors(&conn).await?;

    Ok(())
}

/// Column names of a table, via `PRAGMA table_info`.
async fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut rows = conn
        .query(&format!("PRAGMA table_info({table})"), ())
        .await?;

    let mut columns = Vec::new();
    while let Some(row) = rows.next().await? {
        let name: String = row.get(1)?;
        columns.push(name);
    }
    Ok(columns)
}

/// Add `fanout_mode` to channels created before per-route fanout existed.
async fn migrate_channels(conn: &Connection) -> Result<()> {
    let columns = table_columns(conn, "channels").await?;
    if !columns.iter().any(|c| c == "fanout_mode") {
        info!("migrating channels: adding fanout_mode column");
        conn.execute(
            "ALTER TABLE channels ADD COLUMN fanout_mode INTEGER NOT NULL DEFAULT 0",
            (),
        )
        .await?;
    }
    Ok(())
}

/// Add the columns the routes table has grown over time.
async fn migrate_routes(conn: &Connection) -> Result<()> {
    let columns = table_columns(conn, "routes").await?;
    let missing = |name: &str| !columns.iter().any(|c| c == name);

    let additions: [(&str, &str); 7] = [
        ("name", "ALTER TABLE routes ADD COLUMN name TEXT NOT NULL DEFAULT ''"),
        (
            "source_channel_id",
            "ALTER TABLE routes ADD COLUMN source_channel_id TEXT NOT NULL DEFAULT ''",
        ),
        (
            "destination_channel_id",
            "ALTER TABLE routes ADD COLUMN destination_channel_id TEXT NOT NULL DEFAULT ''",
        ),
        (
            "route_type",
            "ALTER TABLE routes ADD COLUMN route_type TEXT NOT NULL DEFAULT 'direct'",
        ),
        (
            "transformation_id",
            "ALTER TABLE routes ADD COLUMN transformation_id TEXT NOT NULL DEFAULT ''",
        ),
        (
            "integration_id",
            "ALTER TABLE routes ADD COLUMN integration_id TEXT NOT NULL DEFAULT ''",
        ),
        (
            "created_at",
            "ALTER TABLE routes ADD COLUMN created_at TEXT NOT NULL DEFAULT ''",
        ),
    ];

    for (column, alter) in additions {
        if missing(column) {
            info!(column, "migrating routes: adding column");
            conn.execute(alter, ()).await?;
        }
    }
    Ok(())
}

/// Drop the obsolete `destination_channel_id` from collectors.
///
/// Collectors stopped carrying a destination when routes learned to
/// subscribe to `collector-output:<id>` exchanges. SQLite cannot drop a
/// column in place, so the table is rebuilt and the surviving columns
/// copied, all inside one transaction.
async fn migrate_collectors(conn: &Connection) -> Result<()> {
    let columns = table_columns(conn, "collectors").await?;
    if !columns.iter().any(|c| c == "destination_channel_id") {
        return Ok(());
    }

    info!("migrating collectors: removing destination_channel_id");
    conn.execute("BEGIN", ()).await?;

    let rebuild = async {
        conn.execute("ALTER TABLE collectors RENAME TO old_collectors", ())
            .await?;
        conn.execute(
            r#"
            CREATE TABLE collectors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                schedule TEXT NOT NULL,
                engine TEXT NOT NULL,
                script TEXT NOT NULL,
                integration_id TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            (),
        )
        .await?;
        conn.execute(
            r#"
            INSERT INTO collectors (id, name, schedule, engine, script, integration_id, created_at, updated_at)
            SELECT id, name, schedule, engine, script, integration_id, created_at, updated_at
            FROM old_collectors
            "#,
            (),
        )
        .await?;
        conn.execute("DROP TABLE old_collectors", ()).await?;
        Ok::<(), crate::StoreError>(())
    };

    if let Err(e) = rebuild.await {
        let _ = conn.execute("ROLLBACK", ()).await;
        return Err(e);
    }

    conn.execute("COMMIT", ()).await?;
    info!("collectors table rebuilt");
    Ok(())
}
