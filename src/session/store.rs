use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Session, SESSION_TYPE};
use crate::clock::SharedClock;
use crate::codec::EntityCodec;
use crate::config::{RegionConfig, SessionConfig};
use crate::error::Result;
use crate::region::RegionStore;
use crate::types::{Identity, Record};

/// Session persistence over a region of the shared [`RegionStore`].
pub struct SessionStore {
    store: Arc<RegionStore>,
    region: String,
    max_inactive: Duration,
    codec: EntityCodec,
    clock: SharedClock,
}

impl SessionStore {
    pub fn new(
        store: Arc<RegionStore>,
        config: &SessionConfig,
        codec: EntityCodec,
        clock: SharedClock,
    ) -> Result<Self> {
        store.create_region(RegionConfig::new(&config.region_name).record_type(SESSION_TYPE))?;
        Ok(Self {
            store,
            region: config.region_name.clone(),
            max_inactive: config.max_inactive(),
            codec,
            clock,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Starts and stores a fresh session with the default inactivity interval.
    pub fn create(&self) -> Result<Session> {
        let session = Session::new(self.clock.now(), self.max_inactive);
        self.save(&session)?;
        debug!(session = session.id(), "created session");
        Ok(session)
    }

    /// The live session under `id`. An expired session is removed and
    /// reported as absent.
    pub fn get(&self, id: &str) -> Result<Option<Session>> {
        let key = Identity::from(id);
        let Some(record) = self.store.get(&self.region, &key) else {
            return Ok(None);
        };
        let session = Session::from_record(&record)?;
        if session.is_expired(self.clock.now()) {
            self.remove_if_expired(&key)?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        self.store.put(
            &self.region,
            Identity::from(session.id()),
            session.to_record(&self.region),
        )
    }

    /// Marks the session as accessed now, sliding its expiry forward.
    /// Returns the refreshed session, or `None` when it is gone or expired.
    /// Only the access time is rewritten, in place under the region lock.
    pub fn touch(&self, id: &str) -> Result<Option<Session>> {
        let key = Identity::from(id);
        let now = self.clock.now();
        let touched = self.store.update_if(&self.region, &key, |record| {
            match is_expired(record, now) {
                Ok(false) => Some(Session::touched(record, now)),
                _ => None,
            }
        })?;

        match touched {
            Some(record) => Ok(Some(Session::from_record(&record)?)),
            None => {
                self.remove_if_expired(&key)?;
                Ok(None)
            }
        }
    }

    pub fn invalidate(&self, id: &str) -> Result<bool> {
        let removed = self.store.delete(&self.region, &Identity::from(id))?;
        Ok(removed.is_some())
    }

    /// Encodes `value` with the entity codec and stores it on `session`.
    /// The change is kept in memory until [`save`](Self::save).
    pub fn set_attribute<T: Serialize>(
        &self,
        session: &mut Session,
        name: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        let frame = self.codec.encode(value)?;
        session.set_raw_attribute(name, frame.to_vec());
        Ok(())
    }

    pub fn attribute<T: DeserializeOwned>(&self, session: &Session, name: &str) -> Result<Option<T>> {
        match session.raw_attribute(name) {
            Some(frame) => Ok(Some(self.codec.decode(frame)?)),
            None => Ok(None),
        }
    }

    /// Deletes every expired session and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut purged = 0;
        for record in self.store.scan(&self.region) {
            match is_expired(&record, now) {
                Ok(false) => {}
                Ok(true) => match self.remove_if_expired(record.key()) {
                    Ok(true) => purged += 1,
                    Ok(false) => {}
                    Err(e) => warn!(session = %record.key(), error = %e, "failed to purge session"),
                },
                Err(e) => warn!(session = %record.key(), error = %e, "unreadable session record"),
            }
        }
        purged
    }

    /// Live sessions.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.store
            .scan(&self.region)
            .filter(|record| matches!(is_expired(record, now), Ok(false)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-checks expiry under the region lock so a concurrent touch wins.
    fn remove_if_expired(&self, key: &Identity) -> Result<bool> {
        let now = self.clock.now();
        let removed = self.store.delete_if(&self.region, key, |record| {
            is_expired(record, now).unwrap_or(false)
        })?;
        if removed.is_some() {
            debug!(session = %key, "expired session removed");
        }
        Ok(removed.is_some())
    }
}

fn is_expired(record: &Record, now: chrono::DateTime<chrono::Utc>) -> Result<bool> {
    Ok(Session::from_record(record)?.is_expired(now))
}
