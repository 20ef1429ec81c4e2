use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sword_action_primitives::{ActionError, ElementSnapshot};
use sword_core_types::{AutomationError, ElementHandle, ErrorKind, SeatRef, StateId};
use sword_site_config::SeatPreferences;

use crate::handler::{HandlerCx, Next, StateHandler};

/// Picks and verifies the requested number of seats.
///
/// Seats whose click does not register are marked unavailable in the run
/// context and never tried again; the next round re-reads the seat map
/// without leaving this state.
#[derive(Debug, Default)]
pub struct SelectSeatHandler;

#[derive(Debug, Clone, PartialEq)]
struct SeatCandidate {
    handle: ElementHandle,
    seat: SeatRef,
    center_x: f64,
}

enum GroupOutcome {
    Selected(Vec<SeatRef>),
    Conflict(String),
}

fn seat_ref(snapshot: &ElementSnapshot) -> SeatRef {
    let row = snapshot.data("row").unwrap_or("0").to_string();
    let position = snapshot
        .data("col")
        .or_else(|| snapshot.data("position"))
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(0);
    let id = snapshot
        .data("seat-id")
        .map(str::to_string)
        .or_else(|| snapshot.id.clone().filter(|id| !id.is_empty()))
        .unwrap_or_else(|| format!("{row}-{position}"));
    SeatRef { id, row, position }
}

fn is_selected(snapshot: &ElementSnapshot) -> bool {
    snapshot.has_class("selected")
        || snapshot.attr("data-seat-status") == Some("selected")
        || snapshot.attr("aria-selected") == Some("true")
}

fn distance(candidate: &SeatCandidate, center: f64) -> f64 {
    (candidate.center_x - center).abs()
}

/// `count` seats closest to `center`, page order breaking ties.
fn nearest(candidates: &[SeatCandidate], count: usize, center: Option<f64>) -> Vec<SeatCandidate> {
    let mut ordered = candidates.to_vec();
    if let Some(center) = center {
        ordered.sort_by(|a, b| distance(a, center).total_cmp(&distance(b, center)));
    }
    ordered.truncate(count);
    ordered
}

/// Best window of `count` seats in one row whose neighbours are at most
/// `max_gap` positions apart.
fn consecutive(
    candidates: &[SeatCandidate],
    count: usize,
    max_gap: i64,
    center: Option<f64>,
) -> Option<Vec<SeatCandidate>> {
    let mut rows: Vec<(String, Vec<SeatCandidate>)> = Vec::new();
    for candidate in candidates {
        match rows.iter_mut().find(|(row, _)| *row == candidate.seat.row) {
            Some((_, seats)) => seats.push(candidate.clone()),
            None => rows.push((candidate.seat.row.clone(), vec![candidate.clone()])),
        }
    }

    let mut best: Option<(f64, Vec<SeatCandidate>)> = None;
    for (_, mut seats) in rows {
        seats.sort_by_key(|seat| seat.seat.position);
        let mut start = 0;
        for end in 1..=seats.len() {
            let breaks = end == seats.len() || {
                let gap = seats[end].seat.position - seats[end - 1].seat.position;
                gap <= 0 || gap > max_gap
            };
            if !breaks {
                continue;
            }
            let run = &seats[start..end];
            for window in run.windows(count) {
                let score = center.map_or(0.0, |center| {
                    let mid = window.iter().map(|seat| seat.center_x).sum::<f64>() / count as f64;
                    (mid - center).abs()
                });
                if best.as_ref().map_or(true, |(current, _)| score < *current) {
                    best = Some((score, window.to_vec()));
                }
            }
            start = end;
        }
    }
    best.map(|(_, window)| window)
}

fn plan(
    candidates: &[SeatCandidate],
    count: usize,
    preferences: &SeatPreferences,
    multi_seat: bool,
    center: f64,
) -> Vec<SeatCandidate> {
    let center = preferences.prefer_center.then_some(center);
    if count <= 1 || !multi_seat {
        return nearest(candidates, count.max(1), center);
    }
    consecutive(candidates, count, preferences.max_seats_distance.max(1), center)
        .unwrap_or_else(|| nearest(candidates, count, center))
}

impl SelectSeatHandler {
    async fn reference_center(&self, cx: &HandlerCx<'_>) -> Result<f64, ActionError> {
        if let Some(container) = cx.env.find_first(&cx.site.selectors.seat_container).await? {
            if let Some(snapshot) = cx.env.inspect(&container).await? {
                if snapshot.rect.width > 0.0 {
                    return Ok(snapshot.rect.center_x());
                }
            }
        }
        Ok(cx.env.viewport_width().await? / 2.0)
    }

    async fn available(&self, cx: &HandlerCx<'_>) -> Result<Vec<SeatCandidate>, ActionError> {
        let mut seats = Vec::new();
        for handle in cx.env.find_all_interactable(&cx.site.selectors.seats).await? {
            let Some(snapshot) = cx.env.inspect(&handle).await? else {
                continue;
            };
            let seat = seat_ref(&snapshot);
            if cx.context.is_unavailable(&seat.id) {
                continue;
            }
            seats.push(SeatCandidate {
                center_x: snapshot.rect.center_x(),
                handle,
                seat,
            });
        }
        Ok(seats)
    }

    /// Undo a selection left over from an earlier visit.
    async fn release_previous(&self, cx: &mut HandlerCx<'_>) -> Result<(), ActionError> {
        if cx.context.selected_seats().is_empty() {
            return Ok(());
        }
        let previous: Vec<String> = cx
            .context
            .selected_seats()
            .iter()
            .map(|seat| seat.id.clone())
            .collect();
        for handle in cx.env.find_all_interactable(&cx.site.selectors.seats).await? {
            let Some(snapshot) = cx.env.inspect(&handle).await? else {
                continue;
            };
            if is_selected(&snapshot) && previous.contains(&seat_ref(&snapshot).id) {
                cx.env.click(&handle, Duration::ZERO).await?;
            }
        }
        cx.context.set_selected(Vec::new());
        Ok(())
    }

    async fn select_group(
        &self,
        cx: &mut HandlerCx<'_>,
        group: &[SeatCandidate],
    ) -> Result<GroupOutcome, ActionError> {
        let delay = cx.site.timing.seat_select_delay();
        let mut clicked: Vec<&SeatCandidate> = Vec::with_capacity(group.len());
        for candidate in group {
            cx.env.scroll_into_view(&candidate.handle).await?;
            let registered = match cx.env.click(&candidate.handle, delay).await {
                Ok(()) => cx
                    .env
                    .inspect(&candidate.handle)
                    .await?
                    .map_or(false, |snapshot| is_selected(&snapshot)),
                Err(err) if err.is_interrupted() => return Err(err),
                Err(_) => false,
            };
            if !registered {
                cx.context.mark_unavailable(&candidate.seat.id);
                for member in clicked {
                    match cx.env.click(&member.handle, Duration::ZERO).await {
                        Err(err) if err.is_interrupted() => return Err(err),
                        _ => {}
                    }
                }
                return Ok(GroupOutcome::Conflict(candidate.seat.id.clone()));
            }
            clicked.push(candidate);
        }
        Ok(GroupOutcome::Selected(
            group.iter().map(|candidate| candidate.seat.clone()).collect(),
        ))
    }
}

#[async_trait]
impl StateHandler for SelectSeatHandler {
    fn id(&self) -> StateId {
        StateId::SelectSeat
    }

    fn allowed(&self) -> &'static [StateId] {
        &[StateId::Confirm]
    }

    async fn execute(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<Next>, AutomationError> {
        self.release_previous(cx).await?;
        let wanted = cx.context.seat_count().max(1) as usize;
        let center = self.reference_center(cx).await?;
        let rounds = cx.site.retry.max_attempts.select_seat.max(1);
        let mut last_conflict = None;

        for round in 0..rounds {
            let candidates = self.available(cx).await?;
            if candidates.len() < wanted {
                cx.warn(
                    "SEATS_INSUFFICIENT",
                    json!({ "available": candidates.len(), "wanted": wanted }),
                );
                let error = AutomationError::recoverable(
                    ErrorKind::SeatConflict,
                    format!("only {} seats available, {wanted} requested", candidates.len()),
                )
                .with_selector(cx.site.selectors.seats.joined());
                return Err(match last_conflict {
                    Some(seat) => error.with_seat(seat),
                    None => error,
                });
            }

            let group = plan(
                &candidates,
                wanted,
                &cx.site.seat_preferences,
                cx.site.features.multi_seat_select,
                center,
            );
            match self.select_group(cx, &group).await? {
                GroupOutcome::Selected(seats) => {
                    cx.info("SEATS_SELECTED", json!({ "seats": seats, "round": round + 1 }));
                    cx.context.set_selected(seats.clone());
                    return Ok(Some(
                        Next::to(StateId::Confirm, format!("{} seat(s) selected", seats.len()))
                            .with_data(json!({ "seats": seats })),
                    ));
                }
                GroupOutcome::Conflict(seat) => {
                    cx.warn("SEAT_SELECT_FAILED", json!({ "seat": seat, "round": round + 1 }));
                    last_conflict = Some(seat);
                }
            }
        }

        let error = AutomationError::recoverable(
            ErrorKind::SeatConflict,
            format!("seat selection failed after {rounds} rounds"),
        );
        Err(match last_conflict {
            Some(seat) => error.with_seat(seat),
            None => error,
        })
    }
}
