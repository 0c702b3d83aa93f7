mod common;

use chrono::Duration;

use cohort_core::{CohortMember, MemberStatus};
use cohort_engine::CohortState;
use cohort_notify::REJECTED_KEY;
use cohort_storage::CohortStore;

use common::*;

const REASON: &str = "Rejected: Field A expected \"yes\" but found \"no\"";

async fn rejected(fx: &Fixture, email: Option<&str>) -> CohortMember {
    let member = fx.add_member(MemberStatus::Rejected, &[], email).await;
    fx.store
        .update_member_status(member.membership_id, None, MemberStatus::Rejected, REASON)
        .await
        .unwrap();
    member
}

#[tokio::test]
async fn sends_once_and_flips_flag() {
    let fx = Fixture::new().await;
    let member = rejected(&fx, Some("r@example.org")).await;
    let engine = fx.engine();

    let report = engine.send_rejection_emails_on(today()).await.unwrap();

    assert_eq!(report.totals.sent, 1);
    assert_eq!(report.totals.failed, 0);
    assert!(report.skipped_reason.is_none());
    assert!(fx.reload(&member).await.rejection_email_sent);

    let mail = fx.notifier.sent_to("r@example.org");
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].key, REJECTED_KEY);
    assert_eq!(mail[0].context, "COHORT");
    assert_eq!(mail[0].replacements["{username}"], "Ada");
    assert!(mail[0].replacements["{statusReason}"].contains("Field A"));

    let again = engine.send_rejection_emails_on(today()).await.unwrap();
    assert_eq!(again.totals.sent, 0);
    assert_eq!(again.cohorts[0].state, CohortState::Empty);
    assert_eq!(fx.notifier.sent_to("r@example.org").len(), 1);
}

#[tokio::test]
async fn delivery_error_keeps_member_pending() {
    let fx = Fixture::new().await;
    let bounced = rejected(&fx, Some("bounce@example.org")).await;
    let delivered = rejected(&fx, Some("ok@example.org")).await;
    fx.notifier.bounce("bounce@example.org");
    let engine = fx.engine();

    let report = engine.send_rejection_emails_on(today()).await.unwrap();

    assert_eq!(report.totals.sent, 1);
    assert_eq!(report.totals.failed, 1);
    assert!(!fx.reload(&bounced).await.rejection_email_sent);
    assert!(fx.reload(&delivered).await.rejection_email_sent);

    fx.notifier.clear_bounces();
    let retry = engine.send_rejection_emails_on(today()).await.unwrap();
    assert_eq!(retry.totals.sent, 1);
    assert!(fx.reload(&bounced).await.rejection_email_sent);
    assert_eq!(fx.notifier.sent_to("bounce@example.org").len(), 2);
}

#[tokio::test]
async fn unreachable_service_fails_members_without_flipping() {
    let notifier = FakeNotifier {
        unavailable: true,
        ..FakeNotifier::default()
    };
    let fx = Fixture::with_services(FakeLms::default(), notifier).await;
    let member = rejected(&fx, Some("r@example.org")).await;

    let report = fx.engine().send_rejection_emails_on(today()).await.unwrap();

    assert_eq!(report.totals.failed, 1);
    assert_eq!(report.totals.sent, 0);
    assert!(!fx.reload(&member).await.rejection_email_sent);
}

#[tokio::test]
async fn member_without_email_is_a_failure() {
    let fx = Fixture::new().await;
    let member = rejected(&fx, None).await;

    let report = fx.engine().send_rejection_emails_on(today()).await.unwrap();

    assert_eq!(report.totals.failed, 1);
    assert!(fx.notifier.sent().is_empty());
    assert!(!fx.reload(&member).await.rejection_email_sent);
}

#[tokio::test]
async fn disabled_email_skips_sweep() {
    let fx = Fixture::new().await;
    let member = rejected(&fx, Some("r@example.org")).await;
    let mut settings = fx.settings.clone();
    settings.email_notifications_enabled = false;

    let report = fx
        .engine_with(settings)
        .send_rejection_emails_on(today())
        .await
        .unwrap();

    assert_eq!(report.skipped_reason.as_deref(), Some("email notifications disabled"));
    assert!(report.cohorts.is_empty());
    assert!(fx.notifier.sent().is_empty());
    assert!(!fx.reload(&member).await.rejection_email_sent);
}

#[tokio::test]
async fn waits_for_notification_date() {
    let fx = Fixture::new().await;
    let member = rejected(&fx, Some("r@example.org")).await;

    let report = fx
        .engine()
        .send_rejection_emails_on(today() - Duration::days(2))
        .await
        .unwrap();

    assert!(report.cohorts.is_empty());
    assert!(!fx.reload(&member).await.rejection_email_sent);
}

#[tokio::test]
async fn only_rejected_members_are_swept() {
    let fx = Fixture::new().await;
    fx.add_member(MemberStatus::Shortlisted, &[], Some("s@example.org"))
        .await;
    fx.add_member(MemberStatus::Submitted, &[], Some("p@example.org"))
        .await;

    let report = fx.engine().send_rejection_emails_on(today()).await.unwrap();

    assert_eq!(report.totals.processed, 0);
    assert!(fx.notifier.sent().is_empty());
}
