//! A complete mock ticket page matching the `mocktest` site table.

use super::dom::{SimDom, SimElement};
use super::effects::{self, effect};
use super::SimulatedPage;

pub const MOCK_URL: &str = "http://localhost:8080/mock-ticket-page/index.html";
pub const MOCK_PAYMENT_URL: &str = "http://localhost:8080/mock-ticket-page/payment";
pub const MOCK_COMPLETE_URL: &str = "http://localhost:8080/mock-ticket-page/complete";

const SEAT_WIDTH: f64 = 30.0;
const SEAT_PITCH: f64 = 40.0;
const CONTAINER_WIDTH: f64 = 1000.0;

/// Builder for the booking page the offline demo and the flow tests run on.
///
/// Layout, top to bottom: an optional CAPTCHA layer hiding the reserve
/// button, the reserve button, a queue of popups shown one at a time after
/// reserving, a zone list, the seat grid revealed by picking a zone, the
/// confirm button revealed by picking a seat, and a payment form.
#[derive(Debug, Clone)]
pub struct MockTicketPage {
    rows: Vec<String>,
    cols: usize,
    zones: Vec<String>,
    popups: usize,
    sticky_popup: bool,
    taken: Vec<String>,
    sold: Vec<String>,
    captcha: bool,
}

impl Default for MockTicketPage {
    fn default() -> Self {
        Self {
            rows: vec!["A".into(), "B".into(), "C".into()],
            cols: 10,
            zones: vec!["VIP석".into(), "R석".into(), "S석".into()],
            popups: 0,
            sticky_popup: false,
            taken: Vec::new(),
            sold: Vec::new(),
            captcha: false,
        }
    }
}

impl MockTicketPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(mut self, rows: &[&str]) -> Self {
        self.rows = rows.iter().map(|row| row.to_string()).collect();
        self
    }

    pub fn cols(mut self, cols: usize) -> Self {
        self.cols = cols.max(1);
        self
    }

    pub fn zones(mut self, zones: &[&str]) -> Self {
        self.zones = zones.iter().map(|zone| zone.to_string()).collect();
        self
    }

    /// Number of distinct popups queued behind the reserve button.
    pub fn popups(mut self, popups: usize) -> Self {
        self.popups = popups;
        self
    }

    /// Append a popup whose close button does nothing.
    pub fn sticky_popup(mut self) -> Self {
        self.sticky_popup = true;
        self
    }

    /// Seats a competitor grabs: clicking them never registers.
    pub fn taken(mut self, seats: &[&str]) -> Self {
        self.taken = seats.iter().map(|seat| seat.to_string()).collect();
        self
    }

    /// Seats already marked sold on the map.
    pub fn sold(mut self, seats: &[&str]) -> Self {
        self.sold = seats.iter().map(|seat| seat.to_string()).collect();
        self
    }

    /// Start behind a CAPTCHA the user has to solve.
    pub fn captcha(mut self, captcha: bool) -> Self {
        self.captcha = captcha;
        self
    }

    /// Id of the seat nearest the grid's horizontal center in `row`.
    pub fn center_seat(&self, row: &str) -> String {
        let center = CONTAINER_WIDTH / 2.0;
        let col = (1..=self.cols)
            .min_by(|a, b| {
                let da = (seat_x(*a) + SEAT_WIDTH / 2.0 - center).abs();
                let db = (seat_x(*b) + SEAT_WIDTH / 2.0 - center).abs();
                da.total_cmp(&db)
            })
            .unwrap_or(1);
        format!("{row}-{col}")
    }

    pub fn build(self) -> SimulatedPage {
        let mut dom = SimDom::new(MOCK_URL);
        let mut body = SimElement::new("body").rect(0.0, 0.0, 1280.0, 2400.0);

        if self.captcha {
            body = body.child(captcha_layer());
        }

        let mut reserve = SimElement::new("button")
            .id("btnReserve")
            .class("reserve-btn")
            .text("예매하기")
            .rect(540.0, 120.0, 200.0, 48.0)
            .on_click(effects::chain(vec![
                effects::show("#popup-0"),
                effects::show(".zone-list"),
            ]));
        if self.captcha {
            reserve = reserve.hidden();
        }
        body = body.child(reserve);

        let popup_total = self.popups + usize::from(self.sticky_popup);
        for index in 0..popup_total {
            let sticky = self.sticky_popup && index == self.popups;
            body = body.child(popup(index, sticky));
        }

        body = body
            .child(self.zone_list())
            .child(self.seat_grid())
            .child(confirm_button())
            .child(payment_form());

        dom.append(body);
        SimulatedPage::from_dom(dom)
    }

    fn zone_list(&self) -> SimElement {
        let zones = self.zones.iter().enumerate().map(|(index, name)| {
            SimElement::new("div")
                .class("zone")
                .attr("data-zone-name", name)
                .text(name)
                .rect(140.0 + index as f64 * 220.0, 300.0, 200.0, 60.0)
                .on_click(effects::chain(vec![
                    effects::add_class("selected"),
                    effects::show(".seat-container"),
                ]))
        });
        SimElement::new("div")
            .class("zone-list")
            .rect(140.0, 300.0, 1000.0, 80.0)
            .hidden()
            .children(zones)
    }

    fn seat_grid(&self) -> SimElement {
        let rows = self.rows.iter().enumerate().map(|(row_index, row)| {
            let seats = (1..=self.cols).map(|col| {
                let id = format!("{row}-{col}");
                let sold = self.sold.contains(&id);
                let taken = self.taken.contains(&id);
                let mut seat = SimElement::new("div")
                    .class(if sold { "seat sold" } else { "seat" })
                    .attr("data-seat-id", &id)
                    .attr("data-row", row)
                    .attr("data-col", &col.to_string())
                    .text(&col.to_string())
                    .rect(seat_x(col), 620.0 + row_index as f64 * SEAT_PITCH, SEAT_WIDTH, SEAT_WIDTH);
                if !sold && !taken {
                    seat = seat.on_click(effects::chain(vec![
                        effects::toggle_class("selected"),
                        effects::show("#btnConfirm"),
                    ]));
                }
                seat
            });
            SimElement::new("div")
                .class("seat-row")
                .attr("data-row", row)
                .rect(0.0, 620.0 + row_index as f64 * SEAT_PITCH, CONTAINER_WIDTH, SEAT_WIDTH)
                .children(seats)
        });
        SimElement::new("div")
            .class("seat-container")
            .rect(0.0, 600.0, CONTAINER_WIDTH, 400.0)
            .hidden()
            .children(rows)
    }
}

fn seat_x(col: usize) -> f64 {
    50.0 + (col as f64 - 1.0) * SEAT_PITCH * 2.0
}

fn captcha_layer() -> SimElement {
    SimElement::new("div")
        .id("captcha_layer")
        .class("captcha-wrap")
        .rect(340.0, 100.0, 600.0, 400.0)
        .child(SimElement::new("div").id("captcha").text("보안문자 입력").rect(360.0, 120.0, 560.0, 120.0))
        .child(
            SimElement::new("input")
                .attr("name", "captcha")
                .attr("placeholder", "문자 입력")
                .rect(360.0, 260.0, 300.0, 40.0),
        )
        .child(
            SimElement::new("button")
                .id("btnCaptcha")
                .text("입력완료")
                .rect(680.0, 260.0, 120.0, 40.0)
                .on_click(effects::chain(vec![
                    effects::remove("#captcha_layer"),
                    effects::show("#btnReserve"),
                ])),
        )
}

fn popup(index: usize, sticky: bool) -> SimElement {
    let close = if sticky {
        effects::noop()
    } else {
        let next = format!("#popup-{}", index + 1);
        effects::chain(vec![effects::remove_closest(".popup"), effects::show(&next)])
    };
    SimElement::new("div")
        .id(&format!("popup-{index}"))
        .class("popup")
        .rect(340.0, 200.0, 400.0 + index as f64 * 40.0, 300.0)
        .hidden()
        .child(SimElement::new("p").text(&format!("공지사항 {}", index + 1)))
        .child(SimElement::new("button").class("popup-close").text("닫기").on_click(close))
}

fn confirm_button() -> SimElement {
    SimElement::new("button")
        .id("btnConfirm")
        .text("좌석 선택 완료")
        .rect(540.0, 1040.0, 200.0, 48.0)
        .hidden()
        .on_click(effects::chain(vec![
            effects::navigate(MOCK_PAYMENT_URL),
            effects::hide(".seat-container"),
            effects::hide(".zone-list"),
            effects::hide("#btnConfirm"),
            effects::show(".payment-form"),
        ]))
}

fn payment_form() -> SimElement {
    SimElement::new("div")
        .class("payment-form")
        .rect(140.0, 1100.0, 1000.0, 600.0)
        .hidden()
        .child(SimElement::new("h3").text("결제 수단 선택").rect(160.0, 1120.0, 300.0, 30.0))
        .child(
            SimElement::new("button")
                .class("pay-method")
                .text("계좌이체")
                .rect(160.0, 1170.0, 160.0, 40.0)
                .on_click(effects::add_class("selected")),
        )
        .child(
            SimElement::new("button")
                .id("btnPay")
                .text("결제하기")
                .rect(160.0, 1240.0, 200.0, 48.0)
                .on_click(effects::show("#payDialog")),
        )
        .child(
            SimElement::new("div")
                .id("payDialog")
                .rect(440.0, 1200.0, 400.0, 200.0)
                .hidden()
                .child(
                    SimElement::new("button")
                        .text("확인")
                        .rect(580.0, 1340.0, 120.0, 40.0)
                        .on_click(effect(|dom, _| {
                            dom.navigate(MOCK_COMPLETE_URL);
                            dom.hide("#payDialog");
                        })),
                ),
        )
}
