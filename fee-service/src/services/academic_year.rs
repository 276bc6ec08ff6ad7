use super::store::FeeStore;
use crate::error::FeeError;
use crate::models::AcademicYear;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct CachedYear {
    year: AcademicYear,
    fetched_at: Instant,
}

/// Resolves a school's active academic year, caching it for `ttl`.
///
/// Handlers resolve once per request and pass the id down; nothing below
/// the handler layer looks the year up on its own.
#[derive(Clone)]
pub struct AcademicYearResolver {
    store: Arc<dyn FeeStore>,
    cache: Arc<DashMap<String, CachedYear>>,
    ttl: Duration,
}

impl AcademicYearResolver {
    pub fn new(store: Arc<dyn FeeStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub async fn resolve(&self, school_id: &str) -> Result<AcademicYear, FeeError> {
        let cached = self
            .cache
            .get(school_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.year.clone());
        if let Some(year) = cached {
            return Ok(year);
        }

        let year = self
            .store
            .find_active_academic_year(school_id)
            .await?
            .ok_or_else(|| FeeError::not_found("Active academic year for school", school_id))?;

        tracing::debug!(
            school_id = %school_id,
            academic_year_id = %year.id,
            "Resolved active academic year"
        );
        self.cache.insert(
            school_id.to_string(),
            CachedYear {
                year: year.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(year)
    }

    pub fn invalidate(&self, school_id: &str) {
        self.cache.remove(school_id);
    }
}
