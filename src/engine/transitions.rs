use tracing::debug;

use crate::model::*;

use super::{Engine, EngineError, Entity, Invalid};

/// What a status change does to the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Target equals the current status, including a repeated cancel.
    Unchanged,
    Confirm,
    /// Cancel and release the blocked ranges inside the reservation window.
    Cancel,
}

pub(crate) fn plan(from: ReservationStatus, to: ReservationStatus) -> Result<Transition, Invalid> {
    use ReservationStatus::*;
    match (from, to) {
        _ if from == to => Ok(Transition::Unchanged),
        (Pending, Confirmed) => Ok(Transition::Confirm),
        (Pending | Confirmed, Cancelled) => Ok(Transition::Cancel),
        _ => Err(Invalid::Transition { from, to }),
    }
}

impl Engine {
    pub async fn set_reservation_status(
        &self,
        id: ReservationId,
        status: ReservationStatus,
    ) -> Result<Reservation, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let (property_id, mut guard) = self.resolve_entity_write(Entity::Reservation, &id).await?;
        let current = guard
            .reservation(id)
            .cloned()
            .ok_or(EngineError::NotFound(Entity::Reservation, id))?;

        let event = match plan(current.status, status)? {
            Transition::Unchanged => {
                debug!("reservation {id} already {status}");
                return Ok(current);
            }
            Transition::Confirm => Event::ReservationStatusSet {
                id,
                property_id,
                status,
            },
            Transition::Cancel => {
                let released = guard
                    .blocked
                    .iter()
                    .filter(|b| current.interval.contains(&b.interval))
                    .map(|b| b.id)
                    .collect();
                Event::ReservationCancelled {
                    id,
                    property_id,
                    released,
                }
            }
        };
        self.persist_and_apply(&mut guard, event).await?;
        metrics::counter!(crate::observability::STATUS_TRANSITIONS_TOTAL, "to" => status.as_str())
            .increment(1);

        Ok(Reservation { status, ..current })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReservationStatus::*;

    #[test]
    fn transition_table() {
        assert_eq!(plan(Pending, Pending), Ok(Transition::Unchanged));
        assert_eq!(plan(Confirmed, Confirmed), Ok(Transition::Unchanged));
        assert_eq!(plan(Cancelled, Cancelled), Ok(Transition::Unchanged));
        assert_eq!(plan(Pending, Confirmed), Ok(Transition::Confirm));
        assert_eq!(plan(Pending, Cancelled), Ok(Transition::Cancel));
        assert_eq!(plan(Confirmed, Cancelled), Ok(Transition::Cancel));
    }

    #[test]
    fn no_way_back() {
        for (from, to) in [(Cancelled, Pending), (Cancelled, Confirmed), (Confirmed, Pending)] {
            assert_eq!(plan(from, to), Err(Invalid::Transition { from, to }));
        }
    }
}
