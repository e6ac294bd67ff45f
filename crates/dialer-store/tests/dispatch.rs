use dialer_core::domain::{Agent, CallStatus, Lead, LeadPriority, LeadStatus};
use dialer_core::rules::{LeadEffect, RetryPolicy};
use dialer_store::error::StoreErrorKind;
use dialer_store::repo::{
    AgentNew, LeadNew, StatusUpdateResult, StuckThresholds, ORPHANED_ERROR_CODE,
};
use dialer_store::Store;

const NOW: i64 = 1_700_000_000;
const THRESHOLDS: StuckThresholds = StuckThresholds {
    calling_secs: 300,
    answered_secs: 2 * 60 * 60,
};

fn store() -> Store {
    let store = Store::open_in_memory().expect("open in memory");
    store.migrate().expect("migrate");
    store
}

fn seed(store: &Store, phone: &str) -> (Lead, Agent) {
    let lead = store
        .leads()
        .create(
            NOW,
            LeadNew {
                phone: phone.to_string(),
                name: None,
                priority: LeadPriority::Medium,
                notes: None,
                next_eligible_at: None,
            },
        )
        .expect("create lead");
    let agent = store
        .agents()
        .create(
            NOW,
            AgentNew {
                name: format!("Agent {phone}"),
                phone: "5550199999".to_string(),
                available: true,
            },
        )
        .expect("create agent");
    (lead, agent)
}

fn start_call(store: &Store, now: i64, provider_call_id: &str) -> dialer_core::domain::CallAttempt {
    let lead = store
        .leads()
        .claim_next_eligible(now)
        .expect("claim lead")
        .expect("lead available");
    let agent = store
        .agents()
        .claim_available(now)
        .expect("claim agent")
        .expect("agent available");
    let attempt = store
        .dispatch()
        .begin_call(now, lead.id, agent.id)
        .expect("begin call");
    store
        .dispatch()
        .record_placement(now, attempt.id, provider_call_id)
        .expect("record placement")
}

fn apply(store: &Store, now: i64, provider_call_id: &str, status: CallStatus) -> StatusUpdateResult {
    let attempt = store
        .call_attempts()
        .find_by_provider_call_id(provider_call_id)
        .expect("find attempt")
        .expect("attempt exists");
    store
        .dispatch()
        .apply_call_status(now, attempt.id, status, None, &RetryPolicy::default())
        .expect("apply status")
}

#[test]
fn begin_call_moves_lead_to_calling() {
    let store = store();
    let (lead, agent) = seed(&store, "5550101001");
    let attempt = start_call(&store, NOW + 1, "CA-1");

    assert_eq!(attempt.status, CallStatus::Initiated);
    assert_eq!(attempt.agent_id, Some(agent.id));
    assert_eq!(attempt.provider_call_id.as_deref(), Some("CA-1"));

    let fetched = store.leads().get(lead.id).expect("get").expect("exists");
    assert_eq!(fetched.status, LeadStatus::Calling);
    assert_eq!(fetched.assigned_agent_id, Some(agent.id));
    let outstanding = store
        .call_attempts()
        .outstanding_for_lead(lead.id)
        .expect("outstanding")
        .expect("one outstanding attempt");
    assert_eq!(outstanding.id, attempt.id);
}

#[test]
fn begin_call_requires_a_claimed_lead() {
    let store = store();
    let (lead, agent) = seed(&store, "5550101011");
    let err = store
        .dispatch()
        .begin_call(NOW, lead.id, agent.id)
        .expect_err("pending lead");
    assert_eq!(err.kind(), StoreErrorKind::Conflict);
}

#[test]
fn provider_call_ids_are_unique() {
    let store = store();
    seed(&store, "5550101021");
    seed(&store, "5550101022");
    start_call(&store, NOW + 1, "CA-dup");

    let lead = store
        .leads()
        .claim_next_eligible(NOW + 2)
        .expect("claim")
        .expect("second lead");
    let agent = store
        .agents()
        .claim_available(NOW + 2)
        .expect("claim agent")
        .expect("second agent");
    let attempt = store
        .dispatch()
        .begin_call(NOW + 2, lead.id, agent.id)
        .expect("begin call");
    let err = store
        .dispatch()
        .record_placement(NOW + 2, attempt.id, "CA-dup")
        .expect_err("duplicate provider id");
    assert_eq!(err.kind(), StoreErrorKind::DuplicateProviderCallId);
}

#[test]
fn abort_placement_does_not_spend_an_attempt() {
    let store = store();
    let (lead, agent) = seed(&store, "5550101031");
    let claimed = store
        .leads()
        .claim_next_eligible(NOW)
        .expect("claim")
        .expect("lead");
    store
        .agents()
        .claim_available(NOW)
        .expect("claim agent")
        .expect("agent");
    let attempt = store
        .dispatch()
        .begin_call(NOW, claimed.id, agent.id)
        .expect("begin call");

    let failed = store
        .dispatch()
        .abort_placement(NOW + 1, attempt.id, "gateway_error", "connection refused")
        .expect("abort");
    assert_eq!(failed.status, CallStatus::Failed);
    assert_eq!(failed.error_code.as_deref(), Some("gateway_error"));

    let fetched = store.leads().get(lead.id).expect("get").expect("exists");
    assert_eq!(fetched.status, LeadStatus::Pending);
    assert_eq!(fetched.attempt_count, 0);
    assert!(fetched.assigned_agent_id.is_none());
    assert!(fetched.attempt_history.is_empty());

    let agent = store.agents().get(agent.id).expect("get").expect("exists");
    assert!(!agent.on_call);
    assert_eq!(agent.total_calls, 0);

    let again = store
        .leads()
        .claim_next_eligible(NOW + 1)
        .expect("claim")
        .expect("eligible immediately");
    assert_eq!(again.id, lead.id);
}

#[test]
fn answered_then_completed_transfers_and_credits_agent() {
    let store = store();
    let (lead, agent) = seed(&store, "5550101041");
    start_call(&store, NOW, "CA-ok");

    assert!(matches!(
        apply(&store, NOW + 5, "CA-ok", CallStatus::Ringing),
        StatusUpdateResult::Applied(ref applied) if applied.effect == LeadEffect::Unchanged
    ));
    match apply(&store, NOW + 10, "CA-ok", CallStatus::Answered) {
        StatusUpdateResult::Applied(applied) => {
            assert_eq!(applied.lead.status, LeadStatus::Answered);
            assert_eq!(applied.attempt.answered_at, Some(NOW + 10));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    match apply(&store, NOW + 70, "CA-ok", CallStatus::Completed) {
        StatusUpdateResult::Applied(applied) => {
            assert_eq!(applied.effect, LeadEffect::Transferred);
            assert_eq!(applied.lead.status, LeadStatus::Transferred);
            assert_eq!(applied.attempt.duration_secs, Some(60));
            assert_eq!(applied.lead.attempt_history.len(), 1);
            assert_eq!(applied.lead.attempt_history[0].outcome, CallStatus::Completed);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let agent = store.agents().get(agent.id).expect("get").expect("exists");
    assert_eq!(agent.total_calls, 1);
    assert_eq!(agent.successful_calls, 1);
    assert_eq!(agent.total_talk_secs, 60);
    assert!(!agent.on_call);

    let lead = store.leads().get(lead.id).expect("get").expect("exists");
    assert_eq!(lead.attempt_count, 0);
}

#[test]
fn duplicate_terminal_callback_changes_nothing() {
    let store = store();
    let (lead, agent) = seed(&store, "5550101051");
    start_call(&store, NOW, "CA-busy");

    assert!(matches!(
        apply(&store, NOW + 5, "CA-busy", CallStatus::Busy),
        StatusUpdateResult::Applied(_)
    ));
    assert_eq!(
        apply(&store, NOW + 6, "CA-busy", CallStatus::Busy),
        StatusUpdateResult::Rejected {
            current: CallStatus::Busy
        }
    );
    assert_eq!(
        apply(&store, NOW + 7, "CA-busy", CallStatus::Ringing),
        StatusUpdateResult::Rejected {
            current: CallStatus::Busy
        }
    );

    let lead = store.leads().get(lead.id).expect("get").expect("exists");
    assert_eq!(lead.attempt_count, 1);
    assert_eq!(lead.status, LeadStatus::Pending);
    assert_eq!(lead.next_eligible_at, Some(NOW + 5 + 15 * 60));
    assert_eq!(lead.attempt_history.len(), 1);

    let agent = store.agents().get(agent.id).expect("get").expect("exists");
    assert_eq!(agent.total_calls, 1);
    assert_eq!(agent.successful_calls, 0);
}

#[test]
fn late_duration_fills_missing_value_only() {
    let store = store();
    let (lead, agent) = seed(&store, "5550101061");
    let attempt = start_call(&store, NOW, "CA-late");
    apply(&store, NOW + 5, "CA-late", CallStatus::Completed);

    let agent_before = store.agents().get(agent.id).expect("get").expect("exists");
    assert_eq!(agent_before.total_talk_secs, 0);

    let policy = RetryPolicy::default();
    let corrected = store
        .dispatch()
        .apply_call_status(NOW + 9, attempt.id, CallStatus::Completed, Some(42), &policy)
        .expect("late duration");
    match corrected {
        StatusUpdateResult::Corrected(updated) => assert_eq!(updated.duration_secs, Some(42)),
        other => panic!("unexpected result: {other:?}"),
    }

    let lead = store.leads().get(lead.id).expect("get").expect("exists");
    assert_eq!(lead.attempt_history.len(), 1);
    assert_eq!(lead.attempt_history[0].duration_secs, Some(42));
    let agent_after = store.agents().get(agent.id).expect("get").expect("exists");
    assert_eq!(agent_after.total_talk_secs, 42);
    assert_eq!(agent_after.total_calls, 1);

    let again = store
        .dispatch()
        .apply_call_status(NOW + 10, attempt.id, CallStatus::Completed, Some(50), &policy)
        .expect("second duration");
    assert_eq!(
        again,
        StatusUpdateResult::Rejected {
            current: CallStatus::Completed
        }
    );
    let agent_final = store.agents().get(agent.id).expect("get").expect("exists");
    assert_eq!(agent_final.total_talk_secs, 42);
}

#[test]
fn history_numbers_follow_counted_attempts() {
    let store = store();
    let (lead, _agent) = seed(&store, "5550101065");

    start_call(&store, NOW, "CA-hist-1");
    apply(&store, NOW + 3, "CA-hist-1", CallStatus::Canceled);
    start_call(&store, NOW + 10, "CA-hist-2");
    apply(&store, NOW + 20, "CA-hist-2", CallStatus::Busy);
    start_call(&store, NOW + 20 + 15 * 60, "CA-hist-3");
    apply(&store, NOW + 21 + 15 * 60, "CA-hist-3", CallStatus::Completed);

    let lead = store.leads().get(lead.id).expect("get").expect("exists");
    assert_eq!(lead.attempt_count, 1);
    let numbered: Vec<(i32, CallStatus)> = lead
        .attempt_history
        .iter()
        .map(|record| (record.attempt_number, record.outcome))
        .collect();
    assert_eq!(
        numbered,
        vec![
            (1, CallStatus::Canceled),
            (1, CallStatus::Busy),
            (2, CallStatus::Completed),
        ]
    );
}

#[test]
fn third_no_answer_retires_lead() {
    let store = store();
    let (lead, _agent) = seed(&store, "5550101071");
    let mut now = NOW;

    for round in 1..=3 {
        let provider_call_id = format!("CA-na-{round}");
        start_call(&store, now, &provider_call_id);
        apply(&store, now + 30, &provider_call_id, CallStatus::NoAnswer);
        now += 31 * 60;
    }

    let lead = store.leads().get(lead.id).expect("get").expect("exists");
    assert_eq!(lead.status, LeadStatus::Failed);
    assert!(!lead.active);
    assert_eq!(lead.attempt_count, 3);
    assert_eq!(lead.attempt_history.len(), 3);
    assert_eq!(lead.attempt_history[2].attempt_number, 3);
    assert!(store
        .leads()
        .claim_next_eligible(now + 86_400)
        .expect("claim")
        .is_none());
}

#[test]
fn canceled_call_requeues_without_delay() {
    let store = store();
    let (lead, _agent) = seed(&store, "5550101081");
    start_call(&store, NOW, "CA-cancel");
    apply(&store, NOW + 3, "CA-cancel", CallStatus::Canceled);

    let lead = store.leads().get(lead.id).expect("get").expect("exists");
    assert_eq!(lead.status, LeadStatus::Pending);
    assert_eq!(lead.attempt_count, 0);
    assert!(store
        .leads()
        .claim_next_eligible(NOW + 4)
        .expect("claim")
        .is_some());
}

#[test]
fn reset_stuck_recovers_orphaned_calls() {
    let store = store();
    let (lead, agent) = seed(&store, "5550101091");
    let attempt = start_call(&store, NOW, "CA-stuck");

    let early = store
        .dispatch()
        .reset_stuck(NOW + 4 * 60, THRESHOLDS)
        .expect("early sweep");
    assert!(early.is_empty());

    let recovered = store
        .dispatch()
        .reset_stuck(NOW + 6 * 60, THRESHOLDS)
        .expect("sweep");
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].lead_id, lead.id);
    assert_eq!(recovered[0].previous_status, LeadStatus::Calling);
    assert_eq!(recovered[0].agent_id, Some(agent.id));
    assert_eq!(recovered[0].canceled_attempts, vec![attempt.id]);

    let lead = store.leads().get(lead.id).expect("get").expect("exists");
    assert_eq!(lead.status, LeadStatus::Pending);
    assert_eq!(lead.attempt_count, 0);
    assert!(lead.assigned_agent_id.is_none());

    let attempt = store
        .call_attempts()
        .get(attempt.id)
        .expect("get attempt")
        .expect("exists");
    assert_eq!(attempt.status, CallStatus::Canceled);
    assert_eq!(attempt.error_code.as_deref(), Some(ORPHANED_ERROR_CODE));

    let agent = store.agents().get(agent.id).expect("get").expect("exists");
    assert!(!agent.on_call);

    assert_eq!(
        apply(&store, NOW + 7 * 60, "CA-stuck", CallStatus::Completed),
        StatusUpdateResult::Rejected {
            current: CallStatus::Canceled
        }
    );
}

#[test]
fn reset_stuck_recovers_answered_calls_after_longer_threshold() {
    let store = store();
    let (lead, agent) = seed(&store, "5550101095");
    let attempt = start_call(&store, NOW, "CA-silent");
    apply(&store, NOW + 10, "CA-silent", CallStatus::Answered);

    let during_call = store
        .dispatch()
        .reset_stuck(NOW + 60 * 60, THRESHOLDS)
        .expect("sweep during call");
    assert!(during_call.is_empty());

    let recovered = store
        .dispatch()
        .reset_stuck(NOW + 10 + 2 * 60 * 60 + 1, THRESHOLDS)
        .expect("sweep");
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].previous_status, LeadStatus::Answered);
    assert_eq!(recovered[0].canceled_attempts, vec![attempt.id]);

    let lead = store.leads().get(lead.id).expect("get").expect("exists");
    assert_eq!(lead.status, LeadStatus::Pending);
    assert_eq!(lead.attempt_count, 0);

    let attempt = store
        .call_attempts()
        .get(attempt.id)
        .expect("get attempt")
        .expect("exists");
    assert_eq!(attempt.status, CallStatus::Canceled);
    assert_eq!(attempt.error_code.as_deref(), Some(ORPHANED_ERROR_CODE));

    let agent = store.agents().get(agent.id).expect("get").expect("exists");
    assert!(!agent.on_call);
}

#[test]
fn stats_summarize_attempts() {
    let store = store();
    seed(&store, "5550101101");
    start_call(&store, NOW, "CA-stats");
    apply(&store, NOW + 1, "CA-stats", CallStatus::Answered);
    apply(&store, NOW + 41, "CA-stats", CallStatus::Completed);

    let stats = store.call_attempts().stats().expect("stats");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_status, vec![(CallStatus::Completed, 1)]);
    assert_eq!(stats.average_talk_secs, Some(40.0));
}
