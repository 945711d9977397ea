use crate::model::{AuditHistory, AuditStatus, BundleSummary, Operation, QueueEntry, Status};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{instrument, warn};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Insert every asset of a bundle into the queue in one transaction.
#[instrument(skip_all, fields(bundle_id = %bundle_id))]
pub async fn enqueue_bundle(
    pool: &Pool,
    bundle_id: &str,
    assets: &[String],
    operation: Operation,
    publish_date: DateTime<Utc>,
) -> Result<()> {
    if assets.is_empty() {
        return Err(anyhow!("bundle {} has no assets", bundle_id));
    }
    let mut tx = pool.begin().await?;
    for asset in assets {
        sqlx::query(
            "INSERT INTO publish_queue (bundle_id, asset_id, operation, publish_date) VALUES (?, ?, ?, ?)",
        )
        .bind(bundle_id)
        .bind(asset)
        .bind(operation.code())
        .bind(publish_date)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Aggregated queue view: one row per bundle id, excluding bundles that
/// already have an audit row (those are already dispatched).
#[instrument(skip_all)]
pub async fn bundle_summaries(pool: &Pool) -> Result<Vec<BundleSummary>> {
    let rows = sqlx::query(
        "SELECT bundle_id, MIN(operation) AS operation, MIN(publish_date) AS publish_date \
         FROM publish_queue \
         WHERE bundle_id NOT IN (SELECT bundle_id FROM publish_audit) \
         GROUP BY bundle_id \
         ORDER BY publish_date ASC",
    )
    .fetch_all(pool)
    .await?;

    let summaries = rows
        .into_iter()
        .map(|row| BundleSummary {
            bundle_id: row.get("bundle_id"),
            operation: row.get("operation"),
            publish_date: row.get("publish_date"),
        })
        .collect();
    Ok(summaries)
}

#[instrument(skip_all, fields(bundle_id = %bundle_id))]
pub async fn queue_entries_by_bundle(pool: &Pool, bundle_id: &str) -> Result<Vec<QueueEntry>> {
    let rows = sqlx::query(
        "SELECT bundle_id, asset_id, operation, publish_date FROM publish_queue \
         WHERE bundle_id = ? ORDER BY asset_id ASC",
    )
    .bind(bundle_id)
    .fetch_all(pool)
    .await?;

    let entries = rows
        .into_iter()
        .map(|row| QueueEntry {
            bundle_id: row.get("bundle_id"),
            asset_id: row.get("asset_id"),
            operation: row.get("operation"),
            publish_date: row.get("publish_date"),
        })
        .collect();
    Ok(entries)
}

#[instrument(skip_all, fields(bundle_id = %bundle_id))]
pub async fn delete_queue_entries(pool: &Pool, bundle_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM publish_queue WHERE bundle_id = ?")
        .bind(bundle_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn queue_len(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM publish_queue")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Insert the initial audit row for a freshly dispatched bundle. Fails if a
/// row already exists: exactly one audit row per bundle id.
#[instrument(skip_all, fields(bundle_id = %audit.bundle_id))]
pub async fn insert_audit(pool: &Pool, audit: &AuditStatus) -> Result<()> {
    let history =
        serde_json::to_string(&audit.history).context("failed to serialize audit history")?;
    sqlx::query(
        "INSERT INTO publish_audit (bundle_id, status, num_tries, history) VALUES (?, ?, ?, ?)",
    )
    .bind(&audit.bundle_id)
    .bind(audit.status.code())
    .bind(audit.history.num_tries)
    .bind(history)
    .execute(pool)
    .await?;
    Ok(())
}

/// Commit a reconciliation pass for one bundle: status, try counter and
/// endpoint map land in a single row update, so a reader never sees a merged
/// map without its matching decision.
#[instrument(skip_all, fields(bundle_id = %bundle_id))]
pub async fn update_audit(
    pool: &Pool,
    bundle_id: &str,
    status: Status,
    history: &AuditHistory,
) -> Result<()> {
    let payload = serde_json::to_string(history).context("failed to serialize audit history")?;
    let result = sqlx::query(
        "UPDATE publish_audit SET status = ?, num_tries = ?, history = ?, \
         updated_at = CURRENT_TIMESTAMP WHERE bundle_id = ?",
    )
    .bind(status.code())
    .bind(history.num_tries)
    .bind(payload)
    .bind(bundle_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(anyhow!("no audit row for bundle {}", bundle_id));
    }
    Ok(())
}

#[instrument(skip_all, fields(bundle_id = %bundle_id))]
pub async fn get_audit(pool: &Pool, bundle_id: &str) -> Result<Option<AuditStatus>> {
    let row = sqlx::query("SELECT bundle_id, status, history FROM publish_audit WHERE bundle_id = ?")
        .bind(bundle_id)
        .fetch_optional(pool)
        .await?;
    row.map(audit_from_row).transpose()
}

/// Every audit row whose status is non-terminal, for the reconciliation scan.
/// A malformed row is logged and skipped so it cannot stall the other bundles.
#[instrument(skip_all)]
pub async fn pending_audits(pool: &Pool) -> Result<Vec<AuditStatus>> {
    let rows = sqlx::query(
        "SELECT bundle_id, status, history FROM publish_audit WHERE status NOT IN (?, ?) \
         ORDER BY bundle_id ASC",
    )
    .bind(Status::Success.code())
    .bind(Status::FailedToPublish.code())
    .fetch_all(pool)
    .await?;

    let mut audits = Vec::with_capacity(rows.len());
    for row in rows {
        match audit_from_row(row) {
            Ok(audit) => audits.push(audit),
            Err(err) => warn!(?err, "skipping malformed audit row"),
        }
    }
    Ok(audits)
}

fn audit_from_row(row: sqlx::sqlite::SqliteRow) -> Result<AuditStatus> {
    let bundle_id: String = row.get("bundle_id");
    let code: i32 = row.get("status");
    let status = Status::from_code(code)
        .ok_or_else(|| anyhow!("audit row {} has unknown status code {}", bundle_id, code))?;
    let history: String = row.get("history");
    let history: AuditHistory = serde_json::from_str(&history)
        .with_context(|| format!("audit row {} has malformed history", bundle_id))?;
    Ok(AuditStatus {
        bundle_id,
        status,
        history,
    })
}
