use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::clock::ManualClock;
use super::store::MemoryStore;
use super::*;
use crate::models::Role;

struct Shop {
    engine: QueueEngine,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    cut: i64,
    trim: i64,
    joe: i64,
    staff: ActorScope,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

async fn shop() -> Shop {
    let store = Arc::new(MemoryStore::new());
    store.add_branch("main", true).await;
    store.add_branch("downtown", true).await;
    let cut = store.add_service("Classic Cut", Some(30), 35.0).await;
    let trim = store.add_service("Quick Trim", Some(15), 20.0).await;
    let joe = store.add_barber("Joe", "main").await;
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = QueueEngine::new(store.clone(), clock.clone(), WaitPolicy::default());
    Shop {
        engine,
        store,
        clock,
        cut,
        trim,
        joe,
        staff: ActorScope::new(Role::Staff, "main"),
    }
}

fn walk_in(name: &str, phone: &str) -> CustomerRef {
    CustomerRef::New(NewCustomer {
        name: name.to_string(),
        phone: phone.to_string(),
        ..NewCustomer::default()
    })
}

fn request(customer: CustomerRef, service_id: i64, branch: &str) -> EnqueueRequest {
    EnqueueRequest {
        customer,
        service_id,
        branch: branch.to_string(),
        notes: None,
    }
}

fn master() -> ActorScope {
    ActorScope::new(Role::MasterAdmin, "main")
}

impl Shop {
    async fn queue(&self, name: &str, phone: &str, service_id: i64) -> Customer {
        self.engine
            .enqueue(request(walk_in(name, phone), service_id, "main"), &self.staff)
            .await
            .unwrap()
    }

    async fn waiting_names(&self) -> Vec<String> {
        self.engine
            .list_waiting("main")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect()
    }
}

#[tokio::test]
async fn ama_and_kojo_wait_in_arrival_order() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;
    shop.clock.advance(Duration::minutes(1));
    let kojo = shop.queue("Kojo", "055-000-0002", shop.trim).await;

    assert_eq!(shop.waiting_names().await, vec!["Ama", "Kojo"]);

    let kojo_wait = shop.engine.estimate_wait(kojo.id).await.unwrap().unwrap();
    assert_eq!(kojo_wait.minutes, 30);
    assert_eq!(kojo_wait.label, "~30 min");

    let ama_wait = shop.engine.estimate_wait(ama.id).await.unwrap().unwrap();
    assert_eq!(ama_wait.minutes, 0);
    assert_eq!(ama_wait.label, "Up next");

    assert_eq!(shop.engine.position_of(ama.id).await.unwrap(), Some(1));
    assert_eq!(shop.engine.position_of(kojo.id).await.unwrap(), Some(2));
}

#[tokio::test]
async fn assignment_moves_customer_to_assigned_list() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;
    shop.clock.advance(Duration::minutes(2));

    let assigned = shop.engine.assign(ama.id, shop.joe, &shop.staff).await.unwrap();
    assert_eq!(assigned.status, VisitStatus::Assigned);
    assert_eq!(assigned.barber_id, Some(shop.joe));
    assert_eq!(assigned.assigned_at, Some(t0() + Duration::minutes(2)));

    assert!(shop.waiting_names().await.is_empty());
    let in_chair = shop.engine.list_assigned("main").await.unwrap();
    assert_eq!(in_chair.len(), 1);
    assert_eq!(in_chair[0].id, ama.id);

    assert_eq!(shop.engine.position_of(ama.id).await.unwrap(), None);
    assert_eq!(shop.engine.estimate_wait(ama.id).await.unwrap(), None);
}

#[tokio::test]
async fn customer_cannot_queue_at_two_branches() {
    let shop = shop().await;
    shop.queue("Ama", "055-000-0001", shop.cut).await;

    let err = shop
        .engine
        .enqueue(
            request(walk_in("Ama", "055-000-0001"), shop.cut, "downtown"),
            &master(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::State(QueueStateError::AlreadyQueued { branch: Some(ref b) }) if b == "main"
    ));
    assert!(shop.engine.list_waiting("downtown").await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_queue_error_hides_foreign_branch() {
    let shop = shop().await;
    shop.queue("Ama", "055-000-0001", shop.cut).await;

    let downtown_staff = ActorScope::new(Role::Staff, "downtown");
    let err = shop
        .engine
        .enqueue(
            request(walk_in("Ama", "055-000-0001"), shop.cut, "downtown"),
            &downtown_staff,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueueError::State(QueueStateError::AlreadyQueued { branch: None })
    ));
    assert!(!err.to_string().contains("main"));
}

#[tokio::test]
async fn cancel_restores_original_position() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;
    shop.clock.advance(Duration::minutes(1));
    let kojo = shop.queue("Kojo", "055-000-0002", shop.trim).await;
    shop.clock.advance(Duration::minutes(1));
    shop.queue("Esi", "055-000-0003", shop.trim).await;

    assert_eq!(shop.engine.position_of(kojo.id).await.unwrap(), Some(2));
    shop.engine.assign(kojo.id, shop.joe, &shop.staff).await.unwrap();
    shop.clock.advance(Duration::minutes(10));
    let back = shop.engine.cancel(kojo.id, &shop.staff).await.unwrap();

    assert_eq!(back.status, VisitStatus::Waiting);
    assert_eq!(back.barber_id, None);
    assert_eq!(shop.engine.position_of(kojo.id).await.unwrap(), Some(2));
    assert_eq!(shop.waiting_names().await, vec!["Ama", "Kojo", "Esi"]);
    assert_eq!(shop.engine.position_of(ama.id).await.unwrap(), Some(1));

    let visits = shop.engine.history(kojo.id, &shop.staff).await.unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].barber_id, None);
}

#[tokio::test]
async fn second_complete_is_rejected_without_new_history() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;
    shop.engine.assign(ama.id, shop.joe, &shop.staff).await.unwrap();
    shop.clock.advance(Duration::minutes(30));

    let done = shop.engine.complete(ama.id, &shop.staff).await.unwrap();
    assert_eq!(done.status, VisitStatus::Completed);
    assert_eq!(done.total_visits, 1);

    let err = shop.engine.complete(ama.id, &shop.staff).await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::State(QueueStateError::NotAssigned {
            actual: VisitStatus::Completed
        })
    ));

    let visits = shop.engine.history(ama.id, &shop.staff).await.unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].completed_at, Some(t0() + Duration::minutes(30)));
    assert_eq!(visits[0].price, Some(35.0));
    assert_eq!(visits[0].barber_id, Some(shop.joe));
}

#[tokio::test]
async fn returning_customer_opens_a_new_visit() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;
    shop.engine.assign(ama.id, shop.joe, &shop.staff).await.unwrap();
    shop.engine.complete(ama.id, &shop.staff).await.unwrap();
    shop.clock.advance(Duration::days(7));

    let again = shop
        .engine
        .enqueue(
            request(CustomerRef::Existing(ama.id), shop.trim, "downtown"),
            &master(),
        )
        .await
        .unwrap();
    assert_eq!(again.id, ama.id);
    assert_eq!(again.branch.as_deref(), Some("downtown"));
    assert_eq!(again.total_visits, 1);
    assert_eq!(shop.engine.history(ama.id, &master()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn barber_deletion_waits_for_completion() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;
    shop.engine.assign(ama.id, shop.joe, &shop.staff).await.unwrap();

    let err = shop.engine.delete_barber(shop.joe, &master()).await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::State(QueueStateError::BarberBusy { customers: 1, .. })
    ));

    shop.engine.complete(ama.id, &shop.staff).await.unwrap();
    let deleted = shop.engine.delete_barber(shop.joe, &master()).await.unwrap();
    assert_eq!(deleted.name, "Joe");
    assert!(matches!(
        shop.engine.delete_barber(shop.joe, &master()).await,
        Err(QueueError::NotFound { .. })
    ));
}

#[tokio::test]
async fn staff_cannot_delete_barbers() {
    let shop = shop().await;
    let err = shop.engine.delete_barber(shop.joe, &shop.staff).await.unwrap_err();
    assert!(matches!(err, QueueError::Authorization(_)));
}

#[tokio::test]
async fn remove_only_from_waiting_and_keeps_identity() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;
    shop.engine.remove(ama.id, &shop.staff).await.unwrap();

    assert!(shop.waiting_names().await.is_empty());
    let again = shop.engine.remove(ama.id, &shop.staff).await.unwrap_err();
    assert!(matches!(
        again,
        QueueError::State(QueueStateError::NotWaiting {
            actual: VisitStatus::Registered
        })
    ));

    let known = shop
        .engine
        .register(
            NewCustomer {
                name: "Ama Mensah".to_string(),
                phone: "055-000-0001".to_string(),
                ..NewCustomer::default()
            },
            &shop.staff,
        )
        .await
        .unwrap();
    assert_eq!(known.id, ama.id);
    assert_eq!(known.name, "Ama");
}

#[tokio::test]
async fn guards_reject_inactive_and_foreign_barbers() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;

    let kofi = shop.store.add_barber("Kofi", "downtown").await;
    let err = shop.engine.assign(ama.id, kofi, &shop.staff).await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::State(QueueStateError::BarberNotInBranch { .. })
    ));

    shop.store.set_barber_active(shop.joe, false).await;
    let err = shop.engine.assign(ama.id, shop.joe, &shop.staff).await.unwrap_err();
    assert!(matches!(err, QueueError::State(QueueStateError::BarberInactive(_))));

    let still = shop.engine.list_waiting("main").await.unwrap();
    assert_eq!(still[0].status, VisitStatus::Waiting);
    assert_eq!(still[0].barber_id, None);
}

#[tokio::test]
async fn inactive_service_and_branch_refuse_enqueue() {
    let shop = shop().await;
    shop.store.set_service_active(shop.trim, false).await;
    let err = shop
        .engine
        .enqueue(request(walk_in("Ama", "055-000-0001"), shop.trim, "main"), &shop.staff)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::State(QueueStateError::ServiceInactive(_))));

    shop.store.add_branch("uptown", false).await;
    let err = shop
        .engine
        .enqueue(request(walk_in("Ama", "055-000-0001"), shop.cut, "uptown"), &master())
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::State(QueueStateError::BranchInactive(_))));

    // Rejections happen before a new identity is stored.
    let phone_lookup = shop.engine.register(
        NewCustomer {
            name: "Someone".to_string(),
            phone: "055-000-0001".to_string(),
            ..NewCustomer::default()
        },
        &shop.staff,
    );
    assert_eq!(phone_lookup.await.unwrap().name, "Someone");
}

#[tokio::test]
async fn staff_are_scoped_to_home_branch() {
    let shop = shop().await;
    let err = shop
        .engine
        .enqueue(request(walk_in("Ama", "055-000-0001"), shop.cut, "downtown"), &shop.staff)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Authorization(_)));

    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;
    let outsider = ActorScope::new(Role::BranchAdmin, "downtown");
    for result in [
        shop.engine.assign(ama.id, shop.joe, &outsider).await.map(|_| ()),
        shop.engine.remove(ama.id, &outsider).await,
    ] {
        assert!(matches!(result, Err(QueueError::Authorization(_))));
    }
    assert!(matches!(
        shop.engine.branch_summary("main", &outsider).await,
        Err(QueueError::Authorization(_))
    ));
}

#[tokio::test]
async fn invalid_identity_is_a_validation_error() {
    let shop = shop().await;
    let err = shop
        .engine
        .enqueue(request(walk_in("  ", "055-000-0001"), shop.cut, "main"), &shop.staff)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));

    let long_phone = "0".repeat(21);
    let err = shop
        .engine
        .register(
            NewCustomer {
                name: "Ama".to_string(),
                phone: long_phone,
                ..NewCustomer::default()
            },
            &shop.staff,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));
}

#[tokio::test]
async fn stale_write_surfaces_conflict_and_leaves_state() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;

    // Another writer gets in between our read and our write.
    let stale = shop.engine.store.customer(ama.id).await.unwrap().unwrap();
    shop.store.touch_customer(ama.id).await;
    let next = visit::assign(&stale, shop.joe, t0()).unwrap();
    let err = shop
        .engine
        .commit(&stale, next, LedgerChange::SetBarber(Some(shop.joe)))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Persistence(ref e) if e.is_conflict()));

    let current = shop.engine.store.customer(ama.id).await.unwrap().unwrap();
    assert_eq!(current.status, VisitStatus::Waiting);

    // A fresh read succeeds.
    shop.engine.assign(ama.id, shop.joe, &shop.staff).await.unwrap();
}

#[tokio::test]
async fn snapshot_and_summary_agree_with_queue() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;
    shop.clock.advance(Duration::minutes(1));
    shop.queue("Kojo", "055-000-0002", shop.trim).await;
    shop.clock.advance(Duration::minutes(1));
    let esi = shop.queue("Esi", "055-000-0003", shop.cut).await;

    let snapshot = shop.engine.snapshot("main").await.unwrap();
    assert_eq!(snapshot.branch.as_ref().map(|b| b.code.as_str()), Some("main"));
    let minutes: Vec<u32> = snapshot.waiting.iter().map(|e| e.estimate.minutes).collect();
    assert_eq!(minutes, vec![0, 30, 45]);
    let esi_estimate = shop.engine.estimate_wait(esi.id).await.unwrap().unwrap();
    assert_eq!(snapshot.waiting[2].estimate, esi_estimate);
    assert_eq!(snapshot.waiting[2].position, 3);

    shop.engine.assign(ama.id, shop.joe, &shop.staff).await.unwrap();
    shop.engine.complete(ama.id, &shop.staff).await.unwrap();
    let summary = shop.engine.branch_summary("main", &shop.staff).await.unwrap();
    assert_eq!(
        summary,
        BranchSummary {
            branch: "main".to_string(),
            waiting: 2,
            assigned: 0,
            completed_today: 1,
        }
    );
}

#[tokio::test]
async fn waiting_list_stays_sorted_under_same_instant_inserts() {
    let shop = shop().await;
    let mut ids = Vec::new();
    for n in 0..6 {
        let customer = shop
            .queue(&format!("Guest {n}"), &format!("055-100-{n:04}"), shop.trim)
            .await;
        ids.push(customer.id);
    }
    let waiting = shop.engine.list_waiting("main").await.unwrap();
    let listed: Vec<i64> = waiting.iter().map(|c| c.id).collect();
    assert_eq!(listed, ids);

    let mut previous = 0;
    for customer in &waiting {
        let wait = shop.engine.estimate_wait(customer.id).await.unwrap().unwrap();
        assert!(wait.minutes >= previous);
        previous = wait.minutes;
    }
    assert_eq!(previous, 75);
}

#[tokio::test]
async fn purge_requires_admin_and_idle_customer() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;

    let err = shop.engine.purge_customer(ama.id, &master()).await.unwrap_err();
    assert!(matches!(err, QueueError::State(QueueStateError::ActiveVisit)));

    shop.engine.assign(ama.id, shop.joe, &shop.staff).await.unwrap();
    shop.engine.complete(ama.id, &shop.staff).await.unwrap();

    let err = shop.engine.purge_customer(ama.id, &shop.staff).await.unwrap_err();
    assert!(matches!(err, QueueError::Authorization(_)));

    let branch_admin = ActorScope::new(Role::BranchAdmin, "main");
    shop.engine.purge_customer(ama.id, &branch_admin).await.unwrap();
    assert!(matches!(
        shop.engine.position_of(ama.id).await,
        Err(QueueError::NotFound { .. })
    ));
}

#[tokio::test]
async fn phone_lookup_hides_a_visit_at_another_branch() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;
    let outsider = ActorScope::new(Role::Staff, "downtown");

    let seen = shop
        .engine
        .register(
            NewCustomer {
                name: "Ama".to_string(),
                phone: "055-000-0001".to_string(),
                ..NewCustomer::default()
            },
            &outsider,
        )
        .await
        .unwrap();
    assert_eq!(seen.id, ama.id);
    assert_eq!(seen.branch, None);
    assert_eq!(seen.service_id, None);
    assert_eq!(seen.visit_id, None);
    let json = serde_json::to_string(&seen).unwrap();
    assert!(!json.contains("\"main\""));

    let local = shop
        .engine
        .register(
            NewCustomer {
                name: "Ama".to_string(),
                phone: "055-000-0001".to_string(),
                ..NewCustomer::default()
            },
            &shop.staff,
        )
        .await
        .unwrap();
    assert_eq!(local.branch.as_deref(), Some("main"));
}

#[tokio::test]
async fn history_lists_only_branches_the_actor_works() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;
    shop.engine.assign(ama.id, shop.joe, &shop.staff).await.unwrap();
    shop.engine.complete(ama.id, &shop.staff).await.unwrap();
    shop.clock.advance(Duration::days(1));
    shop.engine
        .enqueue(
            request(CustomerRef::Existing(ama.id), shop.trim, "downtown"),
            &master(),
        )
        .await
        .unwrap();

    let outsider = ActorScope::new(Role::Staff, "downtown");
    let theirs = shop.engine.history(ama.id, &outsider).await.unwrap();
    assert_eq!(theirs.len(), 1);
    assert!(theirs.iter().all(|visit| visit.branch == "downtown"));

    let ours = shop.engine.history(ama.id, &shop.staff).await.unwrap();
    assert_eq!(ours.len(), 1);
    assert_eq!(ours[0].branch, "main");

    assert_eq!(shop.engine.history(ama.id, &master()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn oversized_service_durations_do_not_overflow() {
    let shop = shop().await;
    let marathon = shop.store.add_service("Marathon", Some(u32::MAX), 0.0).await;
    shop.queue("Ama", "055-000-0001", marathon).await;
    shop.clock.advance(Duration::minutes(1));
    shop.queue("Kojo", "055-000-0002", marathon).await;
    shop.clock.advance(Duration::minutes(1));
    let esi = shop.queue("Esi", "055-000-0003", marathon).await;
    shop.clock.advance(Duration::minutes(1));
    shop.queue("Yaw", "055-000-0004", marathon).await;

    let wait = shop.engine.estimate_wait(esi.id).await.unwrap().unwrap();
    assert_eq!(wait.minutes, u32::MAX);

    let board = shop.engine.snapshot("main").await.unwrap();
    let minutes: Vec<u32> = board.waiting.iter().map(|e| e.estimate.minutes).collect();
    assert_eq!(minutes, vec![0, u32::MAX, u32::MAX, u32::MAX]);
}

#[tokio::test]
async fn removed_visit_is_marked_in_history() {
    let shop = shop().await;
    let ama = shop.queue("Ama", "055-000-0001", shop.cut).await;
    shop.clock.advance(Duration::minutes(5));
    shop.engine.remove(ama.id, &shop.staff).await.unwrap();

    let visits = shop.engine.history(ama.id, &shop.staff).await.unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].completed_at, None);
    assert_eq!(visits[0].removed_at, Some(t0() + Duration::minutes(5)));
}
