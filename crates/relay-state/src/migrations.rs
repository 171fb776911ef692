use sqlx::SqlitePool;

/// Create every table `SqliteConfigStore` needs if it doesn't already
/// exist. Idempotent, safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            provider TEXT NOT NULL,
            auth_kind TEXT NOT NULL,
            encrypted_credential TEXT NOT NULL,
            encrypted_refresh_token TEXT,
            refresh_client_id TEXT,
            expires_at TEXT,
            base_url TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            rpm_cap INTEGER NOT NULL DEFAULT 0,
            monthly_budget_usd REAL,
            enabled INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'unknown',
            error_count INTEGER NOT NULL DEFAULT 0,
            last_used_at TEXT,
            chatgpt_account_id TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS routing_configs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            strategy TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tier_bindings (
            config_id TEXT NOT NULL,
            tier TEXT NOT NULL,
            account_id TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            target_model TEXT,
            PRIMARY KEY (config_id, tier, account_id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tenants (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            key_hash TEXT NOT NULL UNIQUE,
            pinned_config_id TEXT,
            rate_cap INTEGER,
            settings TEXT NOT NULL DEFAULT '{}',
            enabled INTEGER NOT NULL DEFAULT 1
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS model_limits (
            model_prefix TEXT PRIMARY KEY,
            max_output_tokens INTEGER NOT NULL,
            supports_tool_calling INTEGER NOT NULL DEFAULT 0,
            supports_reasoning INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS usage_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT NOT NULL,
            config_id TEXT,
            tenant_id TEXT,
            tier TEXT,
            original_model TEXT NOT NULL,
            routed_model TEXT NOT NULL,
            input_tokens INTEGER NOT NULL,
            output_tokens INTEGER NOT NULL,
            cache_read_tokens INTEGER NOT NULL,
            cache_write_tokens INTEGER NOT NULL,
            cost_usd REAL NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS usage_records_account_created_idx ON usage_records (account_id, created_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS request_log (
            id TEXT PRIMARY KEY,
            tenant_id TEXT,
            account_id TEXT,
            path TEXT NOT NULL,
            status INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
