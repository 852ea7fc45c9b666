//! Season resolution with local fallback.
//!
//! [`SeasonResolver::resolve`] asks the external [`SeasonSource`] first. When that fails
//! or answers empty, the most recent season recorded locally for the region is returned
//! instead, tagged [`SeasonResolution::Stale`].

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use laddertrack_warehouse::SeasonRecord;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::client::{with_deadline, ProviderClient};
use crate::error::{ClientError, StoreError, ValidationError};

/// Battle.net ladder region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    Us,
    Eu,
    Kr,
    Cn,
}

impl Region {
    pub const ALL: [Self; 4] = [Self::Us, Self::Eu, Self::Kr, Self::Cn];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Us => "US",
            Self::Eu => "EU",
            Self::Kr => "KR",
            Self::Cn => "CN",
        }
    }

    /// Numeric region id used in Battle.net API paths.
    pub const fn battlenet_id(self) -> u8 {
        match self {
            Self::Us => 1,
            Self::Eu => 2,
            Self::Kr => 3,
            Self::Cn => 5,
        }
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = ValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|region| region.as_str() == normalized)
            .ok_or_else(|| ValidationError::InvalidRegion {
                value: input.to_owned(),
            })
    }
}

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub region: Region,
    pub battlenet_id: i32,
    pub year: i32,
    pub number: i32,
    #[serde(with = "iso_date")]
    pub start: Date,
    #[serde(with = "iso_date")]
    pub end: Date,
}

impl Season {
    /// Ordering key: later end, then later start, then higher season id.
    pub fn recency_key(&self) -> (Date, Date, i32) {
        (self.end, self.start, self.battlenet_id)
    }

    pub fn to_record(&self) -> SeasonRecord {
        SeasonRecord {
            region: self.region.as_str().to_owned(),
            battlenet_id: self.battlenet_id,
            year: self.year,
            number: self.number,
            start_date: format_date(self.start),
            end_date: format_date(self.end),
        }
    }

    pub fn from_record(record: &SeasonRecord) -> Result<Self, ValidationError> {
        Ok(Self {
            region: record.region.parse()?,
            battlenet_id: record.battlenet_id,
            year: record.year,
            number: record.number,
            start: parse_date(&record.start_date)?,
            end: parse_date(&record.end_date)?,
        })
    }
}

fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

fn parse_date(value: &str) -> Result<Date, ValidationError> {
    Date::parse(value, format_description!("[year]-[month]-[day]")).map_err(|_| {
        ValidationError::InvalidDate {
            value: value.to_owned(),
        }
    })
}

/// The most recent season of `seasons`, if any.
pub fn most_recent(seasons: impl IntoIterator<Item = Season>) -> Option<Season> {
    seasons.into_iter().max_by_key(Season::recency_key)
}

/// Resolved season tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "season", rename_all = "snake_case")]
pub enum SeasonResolution {
    /// Fetched from the external source during this call.
    Fresh(Season),
    /// Taken from local storage because the external source was unavailable.
    Stale(Season),
}

impl SeasonResolution {
    pub fn season(&self) -> &Season {
        match self {
            Self::Fresh(season) | Self::Stale(season) => season,
        }
    }

    pub fn into_season(self) -> Season {
        match self {
            Self::Fresh(season) | Self::Stale(season) => season,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

/// External authority for season data.
pub trait SeasonSource: Send + Sync {
    fn fetch_season<'a>(
        &'a self,
        region: Region,
        battlenet_id: i32,
    ) -> BoxFuture<'a, Result<Option<Season>, ClientError>>;
}

/// Locally recorded seasons. Implementations may block.
pub trait SeasonStore: Send + Sync {
    fn seasons_for_region(&self, region: Region) -> Result<Vec<Season>, StoreError>;
    fn save_season(&self, season: &Season) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySeasonStore {
    seasons: Mutex<BTreeMap<(Region, i32), Season>>,
}

impl InMemorySeasonStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seasons(seasons: impl IntoIterator<Item = Season>) -> Self {
        let store = Self::new();
        {
            let mut map = store
                .seasons
                .lock()
                .expect("season store lock is not poisoned");
            for season in seasons {
                map.insert((season.region, season.battlenet_id), season);
            }
        }
        store
    }
}

impl SeasonStore for InMemorySeasonStore {
    fn seasons_for_region(&self, region: Region) -> Result<Vec<Season>, StoreError> {
        let seasons = self
            .seasons
            .lock()
            .map_err(|_| StoreError::new("in-memory season store lock poisoned"))?;
        Ok(seasons
            .values()
            .filter(|season| season.region == region)
            .cloned()
            .collect())
    }

    fn save_season(&self, season: &Season) -> Result<(), StoreError> {
        let mut seasons = self
            .seasons
            .lock()
            .map_err(|_| StoreError::new("in-memory season store lock poisoned"))?;
        seasons.insert((season.region, season.battlenet_id), season.clone());
        Ok(())
    }
}

pub struct SeasonResolver {
    source: Arc<dyn SeasonSource>,
    store: Arc<dyn SeasonStore>,
    fetch_deadline: Option<Duration>,
}

impl SeasonResolver {
    pub fn new(source: Arc<dyn SeasonSource>, store: Arc<dyn SeasonStore>) -> Self {
        Self {
            source,
            store,
            fetch_deadline: None,
        }
    }

    /// Bound the external fetch, retries included. An elapsed deadline falls back to
    /// local data like any other failure.
    pub fn with_fetch_deadline(mut self, deadline: Duration) -> Self {
        self.fetch_deadline = Some(deadline);
        self
    }

    /// Resolve `battlenet_id` for `region`, preferring the external source.
    ///
    /// A freshly fetched season is recorded locally; failing to record it is logged and
    /// does not affect the result.
    pub async fn resolve(
        &self,
        region: Region,
        battlenet_id: i32,
    ) -> Result<SeasonResolution, ClientError> {
        let fetch = self.source.fetch_season(region, battlenet_id);
        let fetched = match self.fetch_deadline {
            Some(deadline) => with_deadline(deadline, fetch).await,
            None => fetch.await,
        };

        match fetched {
            Ok(Some(season)) => {
                let store = Arc::clone(&self.store);
                let saved = season.clone();
                let written = tokio::task::spawn_blocking(move || store.save_season(&saved))
                    .await
                    .map_err(|error| StoreError::new(error.to_string()))
                    .and_then(|result| result);
                if let Err(error) = written {
                    tracing::warn!(%region, battlenet_id, %error, "failed to record fetched season");
                }
                Ok(SeasonResolution::Fresh(season))
            }
            Ok(None) => {
                tracing::warn!(%region, battlenet_id, "season source returned nothing, using local season");
                self.local(region, battlenet_id).await
            }
            Err(error) => {
                tracing::warn!(%region, battlenet_id, %error, "season fetch failed, using local season");
                self.local(region, battlenet_id).await
            }
        }
    }

    async fn local(&self, region: Region, battlenet_id: i32) -> Result<SeasonResolution, ClientError> {
        let store = Arc::clone(&self.store);
        let seasons = tokio::task::spawn_blocking(move || store.seasons_for_region(region))
            .await
            .map_err(|error| StoreError::new(error.to_string()))??;

        most_recent(seasons)
            .map(SeasonResolution::Stale)
            .ok_or(ClientError::SeasonNotFound {
                region,
                season: battlenet_id,
            })
    }
}

/// Battle.net ladder season payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeasonPayload {
    season_id: i32,
    number: i32,
    year: i32,
    start_date: String,
    end_date: String,
}

/// [`SeasonSource`] reading the current ladder season from the Battle.net API.
///
/// The endpoint only knows the current season; asking for any other id yields `None`.
/// With a store attached, a current season that was not the one asked for is still
/// recorded locally.
pub struct BattleNetSeasonSource {
    client: Arc<ProviderClient>,
    store: Option<Arc<dyn SeasonStore>>,
}

impl BattleNetSeasonSource {
    pub fn new(client: Arc<ProviderClient>) -> Self {
        Self {
            client,
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SeasonStore>) -> Self {
        self.store = Some(store);
        self
    }

    async fn record_current(&self, season: Season) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let (region, battlenet_id) = (season.region, season.battlenet_id);
        let written = tokio::task::spawn_blocking(move || store.save_season(&season))
            .await
            .map_err(|error| StoreError::new(error.to_string()))
            .and_then(|result| result);
        if let Err(error) = written {
            tracing::warn!(%region, battlenet_id, %error, "failed to record current season");
        }
    }
}

/// Decode a Battle.net season body, dates included.
fn decode_season(region: Region, body: &str) -> Result<Season, String> {
    let payload: SeasonPayload = serde_json::from_str(body).map_err(|error| error.to_string())?;
    let date = |raw: &str| {
        raw.trim()
            .parse::<i64>()
            .ok()
            .and_then(|seconds| OffsetDateTime::from_unix_timestamp(seconds).ok())
            .map(OffsetDateTime::date)
            .ok_or_else(|| format!("season date is not an epoch timestamp: '{raw}'"))
    };

    Ok(Season {
        region,
        battlenet_id: payload.season_id,
        year: payload.year,
        number: payload.number,
        start: date(&payload.start_date)?,
        end: date(&payload.end_date)?,
    })
}

impl SeasonSource for BattleNetSeasonSource {
    fn fetch_season<'a>(
        &'a self,
        region: Region,
        battlenet_id: i32,
    ) -> BoxFuture<'a, Result<Option<Season>, ClientError>> {
        Box::pin(async move {
            let path = format!("sc2/ladder/season/{}", region.battlenet_id());
            let request = self.client.request(&path);
            let Some(current) = self
                .client
                .execute(request, |body| decode_season(region, body))
                .await?
            else {
                return Ok(None);
            };
            if current.battlenet_id != battlenet_id {
                tracing::debug!(
                    %region,
                    requested = battlenet_id,
                    current = current.battlenet_id,
                    "requested season is not current"
                );
                self.record_current(current).await;
                return Ok(None);
            }
            Ok(Some(current))
        })
    }
}
