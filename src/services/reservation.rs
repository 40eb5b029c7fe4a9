//! Reservation countdown derived from the server-issued timestamp.
//!
//! Nothing here talks to the network: the timestamp is authoritative and the
//! client only counts down from it.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};

use crate::{clock::Clock, models::CartItem};

pub const RESERVATION_TTL_SECS: i64 = 300;
pub const WARNING_THRESHOLD_SECS: i64 = 60;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReservationState {
    pub remaining_seconds: i64,
    pub has_expired: bool,
    pub is_warning: bool,
}

impl ReservationState {
    /// No timestamp means no reservation: nothing remains, but nothing expired either.
    pub fn at(reserved_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let Some(reserved_at) = reserved_at else {
            return Self {
                remaining_seconds: 0,
                has_expired: false,
                is_warning: false,
            };
        };
        let elapsed = (now - reserved_at).num_seconds();
        let remaining_seconds = (RESERVATION_TTL_SECS - elapsed).max(0);
        Self {
            remaining_seconds,
            has_expired: remaining_seconds == 0,
            is_warning: remaining_seconds > 0 && remaining_seconds <= WARNING_THRESHOLD_SECS,
        }
    }

    pub fn for_item(item: &CartItem, now: DateTime<Utc>) -> Self {
        if item.is_preorder {
            return Self::at(None, now);
        }
        Self::at(item.reserved_at, now)
    }

    /// `M:SS`
    pub fn formatted_time(&self) -> String {
        format!(
            "{}:{:02}",
            self.remaining_seconds / 60,
            self.remaining_seconds % 60
        )
    }
}

/// What the cart line shows next to a reserved item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "remaining_seconds", rename_all = "snake_case")]
pub enum ReservationBadge {
    None,
    Active(i64),
    Warning(i64),
    Expired,
}

impl ReservationBadge {
    pub fn for_item(item: &CartItem, now: DateTime<Utc>) -> Self {
        if !item.is_reserved() {
            return ReservationBadge::None;
        }
        let state = ReservationState::for_item(item, now);
        if state.has_expired {
            ReservationBadge::Expired
        } else if state.is_warning {
            ReservationBadge::Warning(state.remaining_seconds)
        } else {
            ReservationBadge::Active(state.remaining_seconds)
        }
    }
}

/// Parses a reservation timestamp, reading zone-less values as UTC.
/// Returns `None` for anything that still cannot be parsed.
pub fn parse_reserved_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    let normalized = raw.replacen(' ', "T", 1);
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Recomputes a [`ReservationState`] every tick and publishes it on a watch
/// channel. The task ends as soon as the countdown reaches zero.
#[derive(Debug)]
pub struct ReservationTicker {
    state: watch::Receiver<ReservationState>,
    handle: JoinHandle<()>,
}

impl ReservationTicker {
    pub fn spawn(
        reserved_at: Option<DateTime<Utc>>,
        clock: Arc<dyn Clock>,
        tick: Duration,
    ) -> Self {
        let initial = ReservationState::at(reserved_at, clock.now());
        let (tx, rx) = watch::channel(initial);
        let live = reserved_at.is_some() && initial.remaining_seconds > 0;

        let handle = tokio::spawn(async move {
            if !live {
                return;
            }
            let mut interval = tokio::time::interval(tick);
            interval.tick().await;
            loop {
                interval.tick().await;
                let state = ReservationState::at(reserved_at, clock.now());
                tx.send_replace(state);
                if state.remaining_seconds == 0 {
                    break;
                }
            }
        });

        Self { state: rx, handle }
    }

    pub fn state(&self) -> ReservationState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReservationState> {
        self.state.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for ReservationTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
