//! Open laps of a session

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::Result;
use crate::model::{CarId, Lap, SessionId, TrackId};
use crate::repository::Repository;

/// Opens laps of one session through the repository.
pub(crate) struct LapFactory<'a> {
    pub repository: &'a dyn Repository,
    pub session: SessionId,
    pub track: Option<TrackId>,
    pub car: Option<CarId>,
}

impl LapFactory<'_> {
    pub fn open(&self, number: i64, now: DateTime<Utc>) -> Result<Lap> {
        let fetched =
            self.repository.get_or_create_lap(self.session, number, self.track, self.car, now)?;
        if fetched.created {
            debug!(session = %self.session, lap = number, "Created new lap");
        } else {
            debug!(session = %self.session, lap = number, "Found existing lap");
        }
        Ok(fetched.record)
    }
}

/// The current and previous lap of a session.
///
/// The previous lap stays around because its authoritative time arrives after
/// the next lap has started. Laps pushed out of the book while still dirty are
/// kept as retired until a save succeeds.
#[derive(Debug, Clone, Default)]
pub struct LapBook {
    current: Option<Lap>,
    previous: Option<Lap>,
    retired: Vec<Lap>,
}

impl LapBook {
    pub fn current(&self) -> Option<&Lap> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&Lap> {
        self.previous.as_ref()
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut Lap> {
        self.current.as_mut()
    }

    pub(crate) fn previous_mut(&mut self) -> Option<&mut Lap> {
        self.previous.as_mut()
    }

    /// Make `lap` current. The former current lap ends at `now` and becomes
    /// the previous lap.
    pub(crate) fn rotate(&mut self, lap: Lap, now: DateTime<Utc>) {
        if let Some(mut finished) = self.current.take() {
            finished.set_end(now);
            if let Some(displaced) = self.previous.replace(finished) {
                if displaced.is_dirty() {
                    self.retired.push(displaced);
                }
            }
        }
        self.current = Some(lap);
    }

    /// Save the previous lap if it has unsaved changes.
    pub(crate) fn save_previous(&mut self, repository: &dyn Repository) -> Result<()> {
        save_if_dirty(self.previous.as_mut(), repository)
    }

    /// Save every dirty lap. All saves are attempted; the first error is returned.
    pub(crate) fn save(&mut self, repository: &dyn Repository) -> Result<()> {
        let mut first_error = None;
        self.retired.retain(|lap| match repository.save_lap(lap) {
            Ok(()) => false,
            Err(e) => {
                first_error.get_or_insert(e);
                true
            }
        });

        let results = [
            save_if_dirty(self.previous.as_mut(), repository),
            save_if_dirty(self.current.as_mut(), repository),
        ];
        match first_error {
            Some(e) => Err(e),
            None => results.into_iter().collect(),
        }
    }

    /// Longest distance covered by a lap still in the book.
    pub fn longest(&self) -> f64 {
        self.current.iter().chain(self.previous.iter()).map(|lap| lap.length).fold(0.0, f64::max)
    }

    pub fn has_unsaved(&self) -> bool {
        !self.retired.is_empty()
            || self.current.iter().chain(self.previous.iter()).any(Lap::is_dirty)
    }
}

fn save_if_dirty(lap: Option<&mut Lap>, repository: &dyn Repository) -> Result<()> {
    match lap {
        Some(lap) if lap.is_dirty() => {
            repository.save_lap(lap)?;
            lap.mark_clean();
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LapId;
    use crate::repository::InMemoryRepository;
    use crate::test_utils::{registered_session, timestamp};

    fn lap(id: u64, number: i64) -> Lap {
        Lap::new(LapId(id), SessionId(1), number, None, None, timestamp(0))
    }

    #[test]
    fn rotate_shifts_current_into_previous() {
        let mut book = LapBook::default();
        book.rotate(lap(1, 1), timestamp(0));
        book.rotate(lap(2, 2), timestamp(90_000));

        assert_eq!(book.current().map(|l| l.number), Some(2));
        let previous = book.previous().unwrap();
        assert_eq!(previous.number, 1);
        assert_eq!(previous.end, timestamp(90_000));
        assert!(previous.is_dirty());
    }

    #[test]
    fn dirty_displaced_laps_are_kept_until_saved() {
        let repo = InMemoryRepository::new();
        let session = registered_session(&repo);
        let factory =
            LapFactory { repository: &repo, session: session.id, track: None, car: None };

        let mut book = LapBook::default();
        for number in 1..=3 {
            let opened = factory.open(number, timestamp(number * 1000)).unwrap();
            book.rotate(opened, timestamp(number * 1000));
        }
        assert!(book.has_unsaved());

        book.save(&repo).unwrap();
        assert!(!book.has_unsaved());
        // lap 1 was retired, lap 2 is previous; lap 3 is untouched
        assert_eq!(repo.stats().lap_saves, 2);
        assert_eq!(repo.laps(&Default::default()).unwrap().len(), 3);
    }

    #[test]
    fn failed_saves_stay_pending() {
        let repo = InMemoryRepository::new();
        let session = registered_session(&repo);
        let factory =
            LapFactory { repository: &repo, session: session.id, track: None, car: None };

        let mut book = LapBook::default();
        let mut first = factory.open(1, timestamp(0)).unwrap();
        first.extend_length(120.0);
        book.rotate(first, timestamp(0));

        repo.set_unavailable(Some("locked"));
        assert!(book.save(&repo).is_err());
        assert!(book.has_unsaved());

        repo.set_unavailable(None);
        book.save(&repo).unwrap();
        assert!(!book.has_unsaved());
    }

    #[test]
    fn longest_covers_current_and_previous() {
        let mut book = LapBook::default();
        let mut first = lap(1, 1);
        first.extend_length(4010.0);
        book.rotate(first, timestamp(0));
        let mut second = lap(2, 2);
        second.extend_length(300.0);
        book.rotate(second, timestamp(1));
        assert_eq!(book.longest(), 4010.0);
    }
}
