use actix_web::{web, HttpResponse, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::{
    models::Customer,
    queue::{QueueSnapshot, WaitEstimate},
    state::AppState,
};

/// Display-board row. Contact details never leave the staff surface.
#[derive(Debug, Serialize)]
struct BoardEntry {
    id: i64,
    name: String,
    service_id: Option<i64>,
    barber_id: Option<i64>,
    enqueued_at: Option<DateTime<Utc>>,
    position: Option<usize>,
    estimate: Option<WaitEstimate>,
}

impl BoardEntry {
    fn from_customer(customer: Customer) -> Self {
        Self {
            id: customer.id,
            name: customer.name,
            service_id: customer.service_id,
            barber_id: customer.barber_id,
            enqueued_at: customer.enqueued_at,
            position: None,
            estimate: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct Board {
    branch: String,
    name: Option<String>,
    waiting: Vec<BoardEntry>,
    in_service: Vec<BoardEntry>,
}

impl Board {
    fn new(code: String, snapshot: QueueSnapshot) -> Self {
        let waiting = snapshot
            .waiting
            .into_iter()
            .map(|entry| BoardEntry {
                position: Some(entry.position),
                estimate: Some(entry.estimate),
                ..BoardEntry::from_customer(entry.customer)
            })
            .collect();
        Self {
            branch: code,
            name: snapshot.branch.map(|branch| branch.name),
            waiting,
            in_service: snapshot
                .assigned
                .into_iter()
                .map(BoardEntry::from_customer)
                .collect(),
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/queue/{branch}").route(web::get().to(queue_board)))
        .service(web::resource("/customers/{id}/wait").route(web::get().to(customer_wait)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn queue_board(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let code = path.into_inner();
    let snapshot = state.engine.snapshot(&code).await?;
    Ok(HttpResponse::Ok().json(Board::new(code, snapshot)))
}

async fn customer_wait(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    let customer_id = path.into_inner();
    let position = state.engine.position_of(customer_id).await?;
    let estimate = state.engine.estimate_wait(customer_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "customer_id": customer_id,
        "queued": position.is_some(),
        "position": position,
        "estimate": estimate,
    })))
}

#[cfg(test)]
mod tests {
    use actix_web::test;
    use serde_json::Value;

    use crate::routes::tests::{app, login, test_state};

    #[actix_web::test]
    async fn board_lists_queue_without_phone_numbers() {
        let app = test::init_service(app(test_state().await)).await;

        let req = test::TestRequest::post()
            .uri("/admin/services")
            .insert_header(login("boss", "secret1"))
            .set_form([("name", "Classic Cut"), ("duration_minutes", "30"), ("price", "35")])
            .to_request();
        let service: Value = test::call_and_read_body_json(&app, req).await;
        let service_id = service["id"].to_string();

        for (name, phone) in [("Ama", "0244000001"), ("Kojo", "0244000002")] {
            let req = test::TestRequest::post()
                .uri("/staff/queue")
                .insert_header(login("desk", "secret2"))
                .set_form([
                    ("name", name),
                    ("phone", phone),
                    ("service_id", service_id.as_str()),
                ])
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status().as_u16(), 201);
        }

        let req = test::TestRequest::get().uri("/queue/main").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8_lossy(&body);
        assert!(!text.contains("0244000001"));

        let board: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(board["name"], "Main");
        assert_eq!(board["waiting"][0]["name"], "Ama");
        assert_eq!(board["waiting"][0]["estimate"]["label"], "Up next");
        assert_eq!(board["waiting"][1]["name"], "Kojo");
        assert_eq!(board["waiting"][1]["estimate"]["minutes"], 30);

        let kojo = board["waiting"][1]["id"].as_i64().unwrap();
        let req = test::TestRequest::get()
            .uri(&format!("/customers/{kojo}/wait"))
            .to_request();
        let wait: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(wait["position"], 2);
        assert_eq!(wait["estimate"]["label"], "~30 min");
    }

    #[actix_web::test]
    async fn unknown_customer_wait_is_not_found() {
        let app = test::init_service(app(test_state().await)).await;
        let req = test::TestRequest::get().uri("/customers/99/wait").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 404);
    }
}
