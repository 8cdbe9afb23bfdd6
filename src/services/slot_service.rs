use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Timelike, Utc};

use crate::{
    error::{AppError, AppResult},
    models::{DeliverySlot, SlotWindow},
    state::AppState,
};

/// Maximum number of orders one delivery window accepts.
pub const PER_SLOT_CAPACITY: u32 = 10;
pub const FIRST_SLOT_HOUR: u32 = 10;
pub const SLOTS_PER_DAY: u32 = 8;

/// The fixed daily delivery timetable, anchored to the store's local offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSchedule {
    offset: FixedOffset,
}

impl Default for SlotSchedule {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl SlotSchedule {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp (its local date is used).
    pub fn parse_date(&self, raw: Option<&str>) -> AppResult<NaiveDate> {
        let raw = raw
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::validation("date is required"))?;

        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(date);
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&self.offset).date_naive())
            .map_err(|_| AppError::validation("invalid date"))
    }

    /// The day's windows in ascending order, each one hour wide and contiguous.
    pub fn windows_for(&self, date: NaiveDate) -> AppResult<Vec<SlotWindow>> {
        (FIRST_SLOT_HOUR..FIRST_SLOT_HOUR + SLOTS_PER_DAY)
            .map(|hour| {
                let start = date
                    .and_hms_opt(hour, 0, 0)
                    .and_then(|local| local.and_local_timezone(self.offset).single())
                    .ok_or_else(|| AppError::validation("invalid date"))?
                    .with_timezone(&Utc);
                Ok(SlotWindow {
                    start,
                    end: start + Duration::hours(1),
                })
            })
            .collect()
    }

    /// The span from the first window's start to the last window's end.
    pub fn day_span(&self, date: NaiveDate) -> AppResult<SlotWindow> {
        let windows = self.windows_for(date)?;
        match (windows.first(), windows.last()) {
            (Some(first), Some(last)) => Ok(SlotWindow {
                start: first.start,
                end: last.end,
            }),
            _ => Err(AppError::validation("invalid date")),
        }
    }

    /// Match a requested `[start, end)` against the timetable.
    pub fn resolve_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<SlotWindow> {
        let local = start.with_timezone(&self.offset);
        let on_the_hour = local.minute() == 0 && local.second() == 0 && local.nanosecond() == 0;
        let in_hours = (FIRST_SLOT_HOUR..FIRST_SLOT_HOUR + SLOTS_PER_DAY).contains(&local.hour());

        if !on_the_hour || !in_hours || end != start + Duration::hours(1) {
            return Err(AppError::validation("invalid delivery slot"));
        }
        Ok(SlotWindow { start, end })
    }
}

/// Remaining capacity of each window given the slot starts already booked.
pub fn annotate_capacity(windows: &[SlotWindow], booked: &[DateTime<Utc>]) -> Vec<DeliverySlot> {
    windows
        .iter()
        .map(|window| {
            let taken = booked.iter().filter(|start| window.contains(**start)).count();
            let taken = u32::try_from(taken).unwrap_or(u32::MAX);
            DeliverySlot {
                slot_start: window.start,
                slot_end: window.end,
                remaining: PER_SLOT_CAPACITY.saturating_sub(taken),
            }
        })
        .collect()
}

/// All eight windows of `date`, full ones included with `remaining == 0`.
/// Nothing is reserved; capacity is enforced again when an order is placed.
pub async fn get_slots(state: &AppState, date: Option<&str>) -> AppResult<Vec<DeliverySlot>> {
    let date = state.schedule.parse_date(date)?;
    let windows = state.schedule.windows_for(date)?;
    let span = state.schedule.day_span(date)?;

    let booked = state.store.slot_starts_within(span).await.map_err(|err| {
        tracing::warn!(error = %err, %date, "slot availability query failed");
        AppError::Unavailable("availability check failed".into())
    })?;

    let slots = annotate_capacity(&windows, &booked);
    tracing::debug!(
        %date,
        booked = booked.len(),
        open = slots.iter().filter(|s| s.remaining > 0).count(),
        "computed delivery slots"
    );
    Ok(slots)
}
