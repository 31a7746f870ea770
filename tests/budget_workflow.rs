use chrono::{TimeZone, Utc};
use std::sync::Arc;

use chatflow::channels::ChannelNaming;
use chatflow::gateway::RecordingGateway;
use chatflow::store::{MemoryStore, SqliteStore};
use chatflow::workflow::{NewBudgetRequest, PaymentInput};
use chatflow::{BudgetEngine, BudgetRequest, BudgetStep, Error, FixedClock, Repository};

struct Desk {
    engine: BudgetEngine,
    chat: Arc<RecordingGateway>,
    origin: String,
    partner: String,
    review: String,
    approval: String,
    finance: String,
}

fn desk_with(store: Arc<dyn Repository<BudgetRequest>>, with_finance: bool) -> Desk {
    let chat = Arc::new(RecordingGateway::new());
    let origin = chat.add_channel("team-1", "budget-sale-dev");
    let partner = chat.add_channel("team-1", "budget-partner-acme-corp-dev");
    let review = chat.add_channel("team-1", "budget-tlqc-dev");
    let approval = chat.add_channel("team-1", "budget-approval-dev");
    let finance = if with_finance {
        chat.add_channel("team-1", "budget-finance-dev")
    } else {
        String::new()
    };
    chat.add_user("u-sale", "sally");
    chat.add_user("u-partner", "pat");
    chat.add_user("u-review", "rita");

    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 3, 2, 0, 0).unwrap(),
    ));
    let engine = BudgetEngine::new(
        store,
        chat.clone(),
        chat.clone(),
        ChannelNaming::default(),
        "http://bot.test",
    )
    .with_clock(clock);

    Desk {
        engine,
        chat,
        origin,
        partner,
        review,
        approval,
        finance,
    }
}

fn desk() -> Desk {
    desk_with(Arc::new(MemoryStore::new()), true)
}

fn new_request(desk: &Desk) -> NewBudgetRequest {
    NewBudgetRequest {
        origin_channel: desk.origin.clone(),
        name: "Spring launch".to_string(),
        partner: "Acme Corp".to_string(),
        amount: "5,000,000".to_string(),
        purpose: "Sponsored post".to_string(),
        deadline: "2025-04-01".to_string(),
    }
}

fn payment() -> PaymentInput {
    PaymentInput {
        recipient: "Acme Corp".to_string(),
        account: "0123456789".to_string(),
        bank: "First Bank".to_string(),
        amount: "5000000".to_string(),
    }
}

fn action_names(chat: &RecordingGateway, post: &str) -> Vec<String> {
    chat.message(post)
        .unwrap()
        .actions
        .into_iter()
        .map(|a| a.name)
        .collect()
}

#[tokio::test]
async fn test_happy_path_completes_every_view() {
    let desk = desk();
    let engine = &desk.engine;

    let created = engine
        .create_request("u-sale", new_request(&desk))
        .await
        .unwrap();
    assert!(created.is_clean());
    let req = created.value;
    assert_eq!(req.current_step, BudgetStep::Created);
    assert!(req.check_payloads().is_ok());
    assert_eq!(req.amount, 5_000_000);
    assert_eq!(req.channels.partner, desk.partner);
    assert_eq!(req.channels.finance, desk.finance);
    assert_eq!(desk.chat.posts_in(&desk.origin).len(), 1);
    let partner_post = req.posts.partner.clone().unwrap();
    assert_eq!(
        action_names(&desk.chat, &partner_post),
        vec!["Fill post content"]
    );

    let stored = engine.get(&req.id).await.unwrap();
    assert_eq!(stored.posts, req.posts);

    let out = engine
        .submit_content(&req.id, "u-partner", "Launch copy", "https://post", "")
        .await
        .unwrap();
    assert!(out.is_clean());
    assert_eq!(out.value.current_step, BudgetStep::ContentSubmitted);
    assert!(out.value.check_payloads().is_ok());
    let review_post = out.value.posts.review.clone().unwrap();
    assert_eq!(
        action_names(&desk.chat, &review_post),
        vec!["Confirm", "Return"]
    );
    assert!(desk
        .chat
        .message(&review_post)
        .unwrap()
        .text
        .starts_with("@all\n#### Budget request"));
    assert!(action_names(&desk.chat, &partner_post).is_empty());

    let out = engine.confirm_review(&req.id, "u-review").await.unwrap();
    assert!(out.is_clean());
    assert!(out.value.check_payloads().is_ok());
    assert!(action_names(&desk.chat, &review_post).is_empty());
    assert_eq!(
        action_names(&desk.chat, &partner_post),
        vec!["Fill payment info"]
    );
    let replies = desk.chat.replies_to(&partner_post);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].text.starts_with("@pat "));

    let out = engine
        .submit_payment(&req.id, "u-partner", payment())
        .await
        .unwrap();
    assert_eq!(out.value.current_step, BudgetStep::PaymentSubmitted);
    assert!(out.value.check_payloads().is_ok());
    let approval_post = out.value.posts.approval.clone().unwrap();
    assert_eq!(
        action_names(&desk.chat, &approval_post),
        vec!["Approve", "Reject"]
    );

    let out = engine.approve(&req.id, "u-boss").await.unwrap();
    assert!(out.value.check_payloads().is_ok());
    let finance_post = out.value.posts.finance.clone().unwrap();
    assert_eq!(action_names(&desk.chat, &finance_post), vec!["Complete"]);

    let out = engine
        .complete(&req.id, "u-finance", "TX-991", "")
        .await
        .unwrap();
    assert!(out.is_clean());
    assert_eq!(out.value.current_step, BudgetStep::Completed);
    assert!(out.value.check_payloads().is_ok());
    let completion = out.value.completion.clone().unwrap();
    assert_eq!(completion.transaction_ref, "TX-991");
    assert_eq!(completion.bill_ref, None);

    for channel in [
        &desk.origin,
        &desk.partner,
        &desk.review,
        &desk.approval,
        &desk.finance,
    ] {
        let posts = desk.chat.posts_in(channel);
        assert_eq!(posts.len(), 1, "one post in {}", channel);
        assert!(posts[0].text.contains("| Status | completed |"));
        assert!(posts[0].text.contains("| Transaction | TX-991 |"));
        assert!(posts[0].actions.is_empty());
    }

    let stored = engine.get(&req.id).await.unwrap();
    assert_eq!(stored, out.value);
}

#[tokio::test]
async fn test_rework_reuses_review_message() {
    let desk = desk();
    let engine = &desk.engine;
    let req = engine
        .create_request("u-sale", new_request(&desk))
        .await
        .unwrap()
        .value;

    let first = engine
        .submit_content(&req.id, "u-partner", "Draft copy", "", "")
        .await
        .unwrap()
        .value;
    assert!(first.check_payloads().is_ok());
    let review_post = first.posts.review.clone().unwrap();
    let partner_post = first.posts.partner.clone().unwrap();

    let returned = engine
        .return_for_rework(&req.id, "u-review", "fix the headline")
        .await
        .unwrap()
        .value;
    assert_eq!(returned.current_step, BudgetStep::Created);
    assert!(returned.content.is_none());
    assert!(returned.check_payloads().is_ok());
    assert_eq!(returned.rework.as_ref().unwrap().returned_by, "u-review");
    assert!(action_names(&desk.chat, &review_post).is_empty());
    assert_eq!(
        action_names(&desk.chat, &partner_post),
        vec!["Fill post content"]
    );
    let partner_replies = desk.chat.replies_to(&partner_post);
    assert_eq!(partner_replies.len(), 1);
    assert!(partner_replies[0].text.contains("fix the headline"));
    assert!(partner_replies[0].text.starts_with("@pat "));

    let second = engine
        .submit_content(&req.id, "u-partner", "Final copy", "", "")
        .await
        .unwrap();
    assert!(second.is_clean());
    assert!(second.value.check_payloads().is_ok());
    assert_eq!(second.value.posts.review.as_deref(), Some(review_post.as_str()));
    assert_eq!(desk.chat.posts_in(&desk.review).len(), 1);
    assert_eq!(
        action_names(&desk.chat, &review_post),
        vec!["Confirm", "Return"]
    );
    assert!(desk
        .chat
        .message(&review_post)
        .unwrap()
        .text
        .contains("Final copy"));

    let review_replies = desk.chat.replies_to(&review_post);
    assert_eq!(review_replies.len(), 1);
    assert!(review_replies[0].text.starts_with("@rita "));
}

#[tokio::test]
async fn test_reject_freezes_request() {
    let desk = desk();
    let engine = &desk.engine;
    let req = engine
        .create_request("u-sale", new_request(&desk))
        .await
        .unwrap()
        .value;
    engine
        .submit_content(&req.id, "u-partner", "Copy", "", "")
        .await
        .unwrap();
    engine.confirm_review(&req.id, "u-review").await.unwrap();

    let rejected = engine.reject(&req.id, "u-boss").await.unwrap();
    assert!(rejected.is_clean());
    assert!(rejected.value.is_rejected());
    assert_eq!(rejected.value.current_step, BudgetStep::Confirmed);
    assert_eq!(rejected.value.rejected_by.as_deref(), Some("u-boss"));

    for channel in [&desk.origin, &desk.partner, &desk.review] {
        let posts = desk.chat.posts_in(channel);
        assert_eq!(posts.len(), 1);
        assert!(posts[0].text.contains("rejected at step 3"));
        assert!(posts[0].actions.is_empty());
    }
    assert!(desk.chat.posts_in(&desk.approval).is_empty());

    let err = engine
        .submit_payment(&req.id, "u-partner", payment())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyRejected { .. }));
    let err = engine.reject(&req.id, "u-boss").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRejected { .. }));
}

#[tokio::test]
async fn test_wrong_step_leaves_request_untouched() {
    let desk = desk();
    let engine = &desk.engine;
    let req = engine
        .create_request("u-sale", new_request(&desk))
        .await
        .unwrap()
        .value;

    let err = engine.approve(&req.id, "u-boss").await.unwrap_err();
    match err {
        Error::WrongStep { current, expected } => {
            assert_eq!(current, BudgetStep::Created);
            assert_eq!(expected, BudgetStep::PaymentSubmitted);
        }
        other => panic!("expected WrongStep, got {:?}", other),
    }
    assert_eq!(engine.get(&req.id).await.unwrap(), req);

    let err = engine.confirm_review(&req.id, "u-review").await.unwrap_err();
    assert!(matches!(err, Error::WrongStep { .. }));
    assert_eq!(engine.get(&req.id).await.unwrap(), req);
}

#[tokio::test]
async fn test_reject_after_completion_fails() {
    let desk = desk();
    let engine = &desk.engine;
    let id = engine
        .create_request("u-sale", new_request(&desk))
        .await
        .unwrap()
        .value
        .id;
    engine
        .submit_content(&id, "u-partner", "Copy", "", "")
        .await
        .unwrap();
    engine.confirm_review(&id, "u-review").await.unwrap();
    engine
        .submit_payment(&id, "u-partner", payment())
        .await
        .unwrap();
    engine.approve(&id, "u-boss").await.unwrap();
    engine
        .complete(&id, "u-finance", "TX-1", "BILL-1")
        .await
        .unwrap();

    let err = engine.reject(&id, "u-boss").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyCompleted { .. }));
}

#[tokio::test]
async fn test_failed_notification_keeps_transition() {
    let desk = desk();
    let engine = &desk.engine;
    let id = engine
        .create_request("u-sale", new_request(&desk))
        .await
        .unwrap()
        .value
        .id;
    engine
        .submit_content(&id, "u-partner", "Copy", "", "")
        .await
        .unwrap();

    desk.chat.fail_channel(&desk.review);
    let out = engine.confirm_review(&id, "u-review").await.unwrap();
    assert!(!out.is_clean());
    assert_eq!(out.warnings.len(), 1);
    assert_eq!(out.warnings[0].effect, "edit review message");
    assert_eq!(out.value.current_step, BudgetStep::Confirmed);

    let stored = engine.get(&id).await.unwrap();
    assert_eq!(stored.current_step, BudgetStep::Confirmed);
    assert!(stored.confirmation.is_some());
}

#[tokio::test]
async fn test_missed_partner_post_is_recreated_later() {
    let desk = desk();
    let engine = &desk.engine;

    desk.chat.fail_channel(&desk.partner);
    let created = engine
        .create_request("u-sale", new_request(&desk))
        .await
        .unwrap();
    assert_eq!(created.warnings.len(), 1);
    assert_eq!(created.warnings[0].effect, "post partner message");
    assert!(created.value.posts.partner.is_none());
    desk.chat.heal_channel(&desk.partner);

    let id = created.value.id;
    let out = engine
        .submit_content(&id, "u-partner", "Copy", "", "")
        .await
        .unwrap();
    assert!(out.is_clean());
    let partner_post = out.value.posts.partner.clone().unwrap();

    let out = engine.confirm_review(&id, "u-review").await.unwrap();
    assert!(out.is_clean());
    assert_eq!(out.value.posts.partner.as_deref(), Some(partner_post.as_str()));

    let posts = desk.chat.posts_in(&desk.partner);
    assert_eq!(posts.len(), 1);
    assert_eq!(
        action_names(&desk.chat, &partner_post),
        vec!["Fill payment info"]
    );
    assert_eq!(desk.chat.replies_to(&partner_post).len(), 1);

    let stored = engine.get(&id).await.unwrap();
    assert_eq!(stored.posts.partner, Some(partner_post));
}

#[tokio::test]
async fn test_reply_without_thread_is_reported() {
    let desk = desk();
    let engine = &desk.engine;

    desk.chat.fail_channel(&desk.partner);
    let id = engine
        .create_request("u-sale", new_request(&desk))
        .await
        .unwrap()
        .value
        .id;
    engine
        .submit_content(&id, "u-partner", "Copy", "", "")
        .await
        .unwrap();

    let out = engine.confirm_review(&id, "u-review").await.unwrap();
    let effects: Vec<&str> = out.warnings.iter().map(|w| w.effect.as_str()).collect();
    assert_eq!(
        effects,
        vec!["post partner message", "reply in partner thread"]
    );
    assert_eq!(out.warnings[1].error, "no partner message");
    assert_eq!(out.value.current_step, BudgetStep::Confirmed);
}

#[tokio::test]
async fn test_missing_sibling_channel_stores_nothing() {
    let store = Arc::new(MemoryStore::<BudgetRequest>::new());
    let desk = desk_with(store.clone(), false);

    let err = desk
        .engine
        .create_request("u-sale", new_request(&desk))
        .await
        .unwrap_err();
    match err {
        Error::ChannelResolution(msg) => assert!(msg.contains("budget-finance-dev")),
        other => panic!("expected ChannelResolution, got {:?}", other),
    }
    assert!(store.is_empty().await);
    assert!(desk.chat.posts_in(&desk.origin).is_empty());
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let desk = desk();
    let err = desk.engine.get("not-a-uuid").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    let err = desk
        .engine
        .approve("1f0c9a3e-8d6b-4a57-9b0e-3f1d2c4b5a69", "u-boss")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_resolution() {
    let desk = desk();
    let mut input = new_request(&desk);
    input.amount = "five million".to_string();
    let err = desk
        .engine
        .create_request("u-sale", input)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let mut input = new_request(&desk);
    input.deadline = "01/04/2025".to_string();
    let err = desk
        .engine
        .create_request("u-sale", input)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(desk.chat.posts_in(&desk.origin).is_empty());
}

#[tokio::test]
async fn test_workflow_on_sqlite() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let desk = desk_with(store, true);
    let engine = &desk.engine;

    let id = engine
        .create_request("u-sale", new_request(&desk))
        .await
        .unwrap()
        .value
        .id;
    engine
        .submit_content(&id, "u-partner", "Copy", "https://post", "https://page")
        .await
        .unwrap();
    engine
        .return_for_rework(&id, "u-review", "too long")
        .await
        .unwrap();
    engine
        .submit_content(&id, "u-partner", "Shorter copy", "", "")
        .await
        .unwrap();
    engine.confirm_review(&id, "u-review").await.unwrap();

    let stored = engine.get(&id).await.unwrap();
    assert_eq!(stored.current_step, BudgetStep::Confirmed);
    assert_eq!(stored.content.as_ref().unwrap().text, "Shorter copy");
    assert_eq!(stored.rework.as_ref().unwrap().reason, "too long");
    assert_eq!(desk.chat.posts_in(&desk.review).len(), 1);
}
