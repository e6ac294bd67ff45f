use dialer_core::domain::{LeadPriority, LeadStatus};
use dialer_store::error::StoreErrorKind;
use dialer_store::repo::{LeadFilter, LeadNew, LeadUpdate};
use dialer_store::Store;

const NOW: i64 = 1_700_000_000;

fn store() -> Store {
    let store = Store::open_in_memory().expect("open in memory");
    store.migrate().expect("migrate");
    store
}

fn lead(phone: &str, priority: LeadPriority) -> LeadNew {
    LeadNew {
        phone: phone.to_string(),
        name: None,
        priority,
        notes: None,
        next_eligible_at: None,
    }
}

#[test]
fn create_normalizes_phone_and_starts_pending() {
    let store = store();
    let created = store
        .leads()
        .create(
            NOW,
            LeadNew {
                name: Some("  Grace Hopper ".to_string()),
                ..lead("+1 (555) 010-2000", LeadPriority::High)
            },
        )
        .expect("create lead");

    assert_eq!(created.phone, "+15550102000");
    assert_eq!(created.name.as_deref(), Some("Grace Hopper"));
    assert_eq!(created.status, LeadStatus::Pending);
    assert_eq!(created.attempt_count, 0);
    assert!(created.active);

    let fetched = store
        .leads()
        .get_by_phone("+1 555 010 2000")
        .expect("get by phone")
        .expect("lead exists");
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.priority, LeadPriority::High);
}

#[test]
fn duplicate_phone_is_rejected() {
    let store = store();
    store
        .leads()
        .create(NOW, lead("555-010-3000", LeadPriority::Low))
        .expect("create lead");
    let err = store
        .leads()
        .create(NOW + 1, lead("(555) 010 3000", LeadPriority::Urgent))
        .expect_err("duplicate phone");
    assert_eq!(err.kind(), StoreErrorKind::DuplicatePhone);
}

#[test]
fn invalid_phone_is_rejected() {
    let store = store();
    let err = store
        .leads()
        .create(NOW, lead("12", LeadPriority::Low))
        .expect_err("short phone");
    assert_eq!(err.kind(), StoreErrorKind::Core);
}

#[test]
fn claim_orders_by_rank_not_label() {
    let store = store();
    let low = store
        .leads()
        .create(NOW, lead("5550100001", LeadPriority::Low))
        .expect("low");
    let high = store
        .leads()
        .create(NOW + 1, lead("5550100002", LeadPriority::High))
        .expect("high");
    let medium = store
        .leads()
        .create(NOW + 2, lead("5550100003", LeadPriority::Medium))
        .expect("medium");
    let urgent = store
        .leads()
        .create(NOW + 3, lead("5550100004", LeadPriority::Urgent))
        .expect("urgent");

    let mut order = Vec::new();
    while let Some(claimed) = store
        .leads()
        .claim_next_eligible(NOW + 10)
        .expect("claim")
    {
        assert_eq!(claimed.status, LeadStatus::Claimed);
        order.push(claimed.id);
    }
    assert_eq!(order, vec![urgent.id, high.id, medium.id, low.id]);
}

#[test]
fn claim_breaks_ties_by_age() {
    let store = store();
    let older = store
        .leads()
        .create(NOW, lead("5550100011", LeadPriority::Medium))
        .expect("older");
    store
        .leads()
        .create(NOW + 5, lead("5550100012", LeadPriority::Medium))
        .expect("newer");

    let claimed = store
        .leads()
        .claim_next_eligible(NOW + 10)
        .expect("claim")
        .expect("lead available");
    assert_eq!(claimed.id, older.id);
}

#[test]
fn claim_skips_future_retired_and_claimed_leads() {
    let store = store();
    store
        .leads()
        .create(
            NOW,
            LeadNew {
                next_eligible_at: Some(NOW + 600),
                ..lead("5550100021", LeadPriority::Urgent)
            },
        )
        .expect("future");
    let retired = store
        .leads()
        .create(NOW, lead("5550100022", LeadPriority::Urgent))
        .expect("retired");
    store.leads().retire(NOW, retired.id).expect("retire");
    let ready = store
        .leads()
        .create(NOW, lead("5550100023", LeadPriority::Low))
        .expect("ready");

    let first = store
        .leads()
        .claim_next_eligible(NOW + 1)
        .expect("claim")
        .expect("lead available");
    assert_eq!(first.id, ready.id);
    assert!(store
        .leads()
        .claim_next_eligible(NOW + 2)
        .expect("claim")
        .is_none());

    let later = store
        .leads()
        .claim_next_eligible(NOW + 600)
        .expect("claim")
        .expect("future lead now eligible");
    assert_eq!(later.phone, "5550100021");
}

#[test]
fn release_claim_returns_lead_to_pending() {
    let store = store();
    let created = store
        .leads()
        .create(NOW, lead("5550100031", LeadPriority::Medium))
        .expect("create");
    store
        .leads()
        .claim_next_eligible(NOW + 1)
        .expect("claim")
        .expect("claimed");

    assert!(store.leads().release_claim(NOW + 2, created.id).expect("release"));
    assert!(!store
        .leads()
        .release_claim(NOW + 3, created.id)
        .expect("release again"));

    let fetched = store
        .leads()
        .get(created.id)
        .expect("get")
        .expect("exists");
    assert_eq!(fetched.status, LeadStatus::Pending);
    assert_eq!(fetched.attempt_count, 0);
}

#[test]
fn update_touches_only_allowed_fields() {
    let store = store();
    let created = store
        .leads()
        .create(
            NOW,
            LeadNew {
                notes: Some("call after lunch".to_string()),
                ..lead("5550100041", LeadPriority::Low)
            },
        )
        .expect("create");

    let updated = store
        .leads()
        .update(
            NOW + 60,
            created.id,
            LeadUpdate {
                priority: Some(LeadPriority::Urgent),
                notes: Some(None),
                ..Default::default()
            },
        )
        .expect("update");
    assert_eq!(updated.priority, LeadPriority::Urgent);
    assert!(updated.notes.is_none());
    assert_eq!(updated.status, LeadStatus::Pending);
    assert_eq!(updated.updated_at, NOW + 60);

    let err = store
        .leads()
        .update(NOW, dialer_core::domain::LeadId::new(), LeadUpdate::default())
        .expect_err("missing lead");
    assert_eq!(err.kind(), StoreErrorKind::NotFound);
}

#[test]
fn list_filters_and_counts() {
    let store = store();
    let first = store
        .leads()
        .create(NOW, lead("5550100051", LeadPriority::Low))
        .expect("first");
    store
        .leads()
        .create(NOW, lead("5550100052", LeadPriority::High))
        .expect("second");
    store.leads().retire(NOW + 1, first.id).expect("retire");

    let active = store.leads().list(&LeadFilter::default()).expect("list");
    assert_eq!(active.len(), 1);

    let all = store
        .leads()
        .list(&LeadFilter {
            include_retired: true,
            ..Default::default()
        })
        .expect("list all");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].priority, LeadPriority::High);

    let pending = store
        .leads()
        .list(&LeadFilter {
            status: Some(LeadStatus::Pending),
            include_retired: true,
            limit: Some(1),
        })
        .expect("list pending");
    assert_eq!(pending.len(), 1);

    let counts = store.leads().count_by_status().expect("counts");
    assert_eq!(counts, vec![(LeadStatus::Pending, 2)]);
}
