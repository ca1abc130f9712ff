/// Roster import
///
/// Loads resources, their skills and weekly availability from a JSON
/// fixture. Re-importing a resource replaces its skills and the weeks the
/// fixture lists; other weeks are kept.
use anyhow::{Context, Result};
use sdk::types::{AvailabilityRecord, Resource};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{debug, info};

/// One resource in a fixture file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureResource {
    #[serde(flatten)]
    pub resource: Resource,
    #[serde(default)]
    pub availability: Vec<AvailabilityRecord>,
}

/// Top-level fixture document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterFixture {
    pub resources: Vec<FixtureResource>,
}

impl RosterFixture {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid roster fixture")
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read roster fixture {}", path.display()))?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub resources: usize,
    pub skills: usize,
    pub availability: usize,
}

pub struct RosterRepository {
    pool: SqlitePool,
}

impl RosterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Import a fixture in one transaction
    pub async fn import(&self, fixture: &RosterFixture) -> Result<ImportSummary> {
        let mut tx = self.pool.begin().await.context("Failed to start import")?;
        let mut summary = ImportSummary::default();

        for entry in &fixture.resources {
            let r = &entry.resource;
            if r.id.trim().is_empty() {
                anyhow::bail!("Resource '{}' has an empty id", r.name);
            }

            sqlx::query(
                "INSERT INTO resources (id, name, employee_number, location, rank_name)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    employee_number = excluded.employee_number,
                    location = excluded.location,
                    rank_name = excluded.rank_name",
            )
            .bind(&r.id)
            .bind(&r.name)
            .bind(&r.employee_number)
            .bind(&r.location)
            .bind(&r.rank_name)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to import resource {}", r.id))?;
            summary.resources += 1;

            sqlx::query("DELETE FROM resource_skills WHERE resource_id = ?")
                .bind(&r.id)
                .execute(&mut *tx)
                .await
                .context("Failed to reset skills")?;

            for skill in &r.skills {
                sqlx::query(
                    "INSERT OR IGNORE INTO resource_skills (resource_id, skill) VALUES (?, ?)",
                )
                .bind(&r.id)
                .bind(skill)
                .execute(&mut *tx)
                .await
                .context("Failed to import skill")?;
                summary.skills += 1;
            }

            for record in &entry.availability {
                sqlx::query(
                    "INSERT INTO availability (resource_id, week_number, status, hours, notes)
                     VALUES (?, ?, ?, ?, ?)
                     ON CONFLICT(resource_id, week_number) DO UPDATE SET
                        status = excluded.status,
                        hours = excluded.hours,
                        notes = excluded.notes",
                )
                .bind(&r.id)
                .bind(i64::from(record.week_number))
                .bind(record.status.as_str())
                .bind(record.hours)
                .bind(&record.notes)
                .execute(&mut *tx)
                .await
                .with_context(|| {
                    format!(
                        "Failed to import availability for {} week {}",
                        r.id, record.week_number
                    )
                })?;
                summary.availability += 1;
            }

            debug!("Imported resource {}", r.id);
        }

        tx.commit().await.context("Failed to commit import")?;

        info!(
            "Imported {} resources, {} skills, {} availability records",
            summary.resources, summary.skills, summary.availability
        );
        Ok(summary)
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM resources")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count resources")
    }
}
