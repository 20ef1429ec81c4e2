use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sword_action_primitives::{ActionError, ElementSnapshot};
use sword_core_types::{AutomationError, ElementHandle, ErrorKind, StateId};

use crate::handler::{HandlerCx, Next, StateHandler};

const SEAT_MAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Picks a seating section and waits for its seat map.
#[derive(Debug, Default)]
pub struct SelectZoneHandler;

#[derive(Debug, Clone)]
struct Zone {
    handle: ElementHandle,
    name: String,
}

/// Visible label, then the data attributes sites use to name a zone.
fn zone_name(snapshot: &ElementSnapshot) -> String {
    let text = snapshot.text.trim();
    if !text.is_empty() {
        return text.to_string();
    }
    snapshot
        .data("zone-name")
        .or_else(|| snapshot.data("zone-id"))
        .or_else(|| snapshot.attr("aria-label").filter(|label| !label.is_empty()))
        .unwrap_or("Unknown")
        .to_string()
}

/// Preferred zones first in preference order, then the rest in page order.
/// A preference matches when either name contains the other.
fn order_by_preference<T: Clone>(zones: &[(String, T)], preferences: &[String]) -> Vec<(String, T)> {
    let mut ordered: Vec<(String, T)> = Vec::with_capacity(zones.len());
    let mut taken = vec![false; zones.len()];
    for preference in preferences {
        for (index, (name, item)) in zones.iter().enumerate() {
            if taken[index] {
                continue;
            }
            if name.contains(preference.as_str()) || preference.contains(name.as_str()) {
                taken[index] = true;
                ordered.push((name.clone(), item.clone()));
                break;
            }
        }
    }
    for (index, zone) in zones.iter().enumerate() {
        if !taken[index] {
            ordered.push(zone.clone());
        }
    }
    ordered
}

impl SelectZoneHandler {
    async fn candidates(&self, cx: &HandlerCx<'_>) -> Result<Vec<Zone>, ActionError> {
        let mut named = Vec::new();
        for handle in cx.env.find_all_interactable(&cx.site.selectors.zones).await? {
            if let Some(snapshot) = cx.env.inspect(&handle).await? {
                named.push((zone_name(&snapshot), handle));
            }
        }
        Ok(order_by_preference(&named, &cx.site.seat_preferences.zones)
            .into_iter()
            .map(|(name, handle)| Zone { handle, name })
            .collect())
    }

    async fn pick(&self, cx: &HandlerCx<'_>, zone: &Zone) -> Result<(), ActionError> {
        cx.env.scroll_into_view(&zone.handle).await?;
        cx.env.click(&zone.handle, cx.site.timing.click_delay()).await?;
        cx.env.sleep(cx.site.timing.click_delay()).await?;
        if let Some(next) = cx
            .env
            .find_first_interactable(&cx.site.selectors.next_button)
            .await?
        {
            cx.env.click(&next, cx.site.timing.click_delay()).await?;
            cx.debug("ZONE_NEXT_CLICKED", json!({ "zone": zone.name }));
        }
        Ok(())
    }
}

#[async_trait]
impl StateHandler for SelectZoneHandler {
    fn id(&self) -> StateId {
        StateId::SelectZone
    }

    fn allowed(&self) -> &'static [StateId] {
        &[StateId::SelectSeat]
    }

    async fn execute(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<Next>, AutomationError> {
        match cx
            .env
            .wait_for_appearance(&cx.site.selectors.zones, cx.site.timing.page_load_timeout())
            .await
        {
            Ok(_) => {}
            Err(ActionError::WaitTimeout(_)) => {
                cx.info("NO_ZONE_SELECTION", json!({}));
                return Ok(Some(Next::to(StateId::SelectSeat, "no zone selection")));
            }
            Err(err) => return Err(err.into()),
        }

        let zones = self.candidates(cx).await?;
        if zones.is_empty() {
            return Ok(Some(Next::to(StateId::SelectSeat, "no zone selection")));
        }

        let max = cx.site.retry.max_attempts.select_zone.max(1);
        for attempt in 0..max {
            let zone = &zones[attempt as usize % zones.len()];
            match self.pick(cx, zone).await {
                Ok(()) => {}
                Err(err) if err.is_interrupted() => return Err(err.into()),
                Err(err) => {
                    cx.warn(
                        "ZONE_CLICK_FAILED",
                        json!({ "zone": zone.name, "error": err.to_string() }),
                    );
                    continue;
                }
            }
            cx.info("ZONE_SELECTED", json!({ "zone": zone.name, "attempt": attempt + 1 }));

            match cx
                .env
                .wait_for_appearance(&cx.site.selectors.seats, SEAT_MAP_TIMEOUT)
                .await
            {
                Ok(_) => {
                    return Ok(Some(
                        Next::to(StateId::SelectSeat, "zone selected")
                            .with_data(json!({ "zone": zone.name })),
                    ))
                }
                Err(ActionError::WaitTimeout(_)) => {
                    cx.warn("ZONE_SEATS_MISSING", json!({ "zone": zone.name }));
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AutomationError::recoverable(
            ErrorKind::ElementNotFound,
            format!("seat map did not load after {max} zone attempts"),
        )
        .with_selector(cx.site.selectors.seats.joined()))
    }
}
