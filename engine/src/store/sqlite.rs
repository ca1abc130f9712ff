//! SQLite-backed resource store

use super::{AvailabilityMap, ResourceQuery, ResourceStore, StoreError};
use async_trait::async_trait;
use sdk::types::{AvailabilityRecord, AvailabilityStatus, Resource};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Separator for the concatenated skill column (ASCII unit separator)
const SKILL_SEPARATOR: char = '\u{1f}';

pub struct SqliteResourceStore {
    pool: SqlitePool,
}

impl SqliteResourceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceStore for SqliteResourceStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn find_resources(&self, query: &ResourceQuery) -> Result<Vec<Resource>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT r.id, r.name, r.employee_number, r.location, r.rank_name,
                (SELECT GROUP_CONCAT(s.skill, char(31)) FROM resource_skills s
                 WHERE s.resource_id = r.id) AS skills
             FROM resources r WHERE 1 = 1",
        );

        if !query.locations.is_empty() {
            qb.push(" AND lower(r.location) IN (");
            let mut list = qb.separated(", ");
            for location in &query.locations {
                list.push_bind(location.clone());
            }
            list.push_unseparated(")");
        }

        if !query.ranks.is_empty() {
            qb.push(" AND lower(r.rank_name) IN (");
            let mut list = qb.separated(", ");
            for rank in &query.ranks {
                list.push_bind(rank.clone());
            }
            list.push_unseparated(")");
        }

        for skill in &query.skills {
            qb.push(
                " AND EXISTS (SELECT 1 FROM resource_skills s
                   WHERE s.resource_id = r.id AND lower(s.skill) = ",
            );
            qb.push_bind(skill.clone());
            qb.push(")");
        }

        qb.push(" ORDER BY r.name, r.id LIMIT ");
        qb.push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX));

        let rows = qb.build().fetch_all(&self.pool).await?;

        let resources: Vec<Resource> = rows
            .iter()
            .map(|row| {
                let mut skills: Vec<String> = row
                    .get::<Option<String>, _>("skills")
                    .map(|s| s.split(SKILL_SEPARATOR).map(str::to_string).collect())
                    .unwrap_or_default();
                skills.sort();

                Resource {
                    id: row.get("id"),
                    name: row.get("name"),
                    employee_number: row.get("employee_number"),
                    location: row.get("location"),
                    rank_name: row.get("rank_name"),
                    skills,
                }
            })
            .collect();

        debug!("SQLite store returned {} resources", resources.len());
        Ok(resources)
    }

    async fn availability(
        &self,
        ids: &[String],
        weeks: &BTreeSet<u32>,
    ) -> Result<AvailabilityMap, StoreError> {
        let mut map = AvailabilityMap::new();
        if ids.is_empty() {
            return Ok(map);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT resource_id, week_number, status, hours, notes
             FROM availability WHERE resource_id IN (",
        );
        let mut list = qb.separated(", ");
        for id in ids {
            list.push_bind(id.clone());
        }
        list.push_unseparated(")");

        if !weeks.is_empty() {
            qb.push(" AND week_number IN (");
            let mut list = qb.separated(", ");
            for week in weeks {
                list.push_bind(i64::from(*week));
            }
            list.push_unseparated(")");
        }

        qb.push(" ORDER BY resource_id, week_number");

        let rows = qb.build().fetch_all(&self.pool).await?;

        for row in rows {
            let resource_id: String = row.get("resource_id");
            let raw_status: String = row.get("status");
            let status = match raw_status.parse::<AvailabilityStatus>() {
                Ok(status) => status,
                Err(e) => {
                    warn!("Skipping availability row for {}: {}", resource_id, e);
                    continue;
                }
            };
            let week: i64 = row.get("week_number");
            let week_number = u32::try_from(week)
                .map_err(|_| StoreError::InvalidData(format!("week number {}", week)))?;

            map.entry(resource_id).or_default().push(AvailabilityRecord {
                week_number,
                status,
                hours: row.get("hours"),
                notes: row.get("notes"),
            });
        }

        Ok(map)
    }
}
