use chrono::{Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Arc;

use chatflow::config::{AttendanceConfig, LeaveNotify};
use chatflow::gateway::RecordingGateway;
use chatflow::store::MemoryStore;
use chatflow::workflow::LeaveInput;
use chatflow::{
    AttendanceRecord, AttendanceService, AttendanceStatus, Error, FixedClock, LeaveKind,
    LeaveRequest, LeaveService, LeaveStatus,
};

struct Office {
    attendance: AttendanceService,
    leave: LeaveService,
    chat: Arc<RecordingGateway>,
    clock: Arc<FixedClock>,
    channel: String,
    approval: String,
}

fn office(notify: LeaveNotify) -> Office {
    let chat = Arc::new(RecordingGateway::new());
    let channel = chat.add_channel("team-1", "attendance");
    let approval = chat.add_channel("team-1", "attendance-approval");
    chat.add_channel("team-1", "attendance-dev");
    chat.add_channel("team-1", "attendance-approval-dev");
    chat.add_user("u-alice", "alice");
    chat.add_user("u-bob", "bob");
    chat.add_user("u-mia", "mia");

    // 08:00 local on 2025-03-03
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 3, 1, 0, 0).unwrap(),
    ));
    let offset = FixedOffset::east_opt(7 * 3600).unwrap();
    let records = Arc::new(MemoryStore::<AttendanceRecord>::new());
    let leaves = Arc::new(MemoryStore::<LeaveRequest>::new());

    let attendance = AttendanceService::new(
        records,
        leaves.clone(),
        chat.clone(),
        chat.clone(),
        offset,
    )
    .with_clock(clock.clone());

    let settings = AttendanceConfig {
        leave_notify: notify,
        ..AttendanceConfig::default()
    };
    let leave = LeaveService::new(
        leaves,
        chat.clone(),
        chat.clone(),
        settings,
        offset,
        "http://bot.test",
    )
    .with_clock(clock.clone());

    Office {
        attendance,
        leave,
        chat,
        clock,
        channel,
        approval,
    }
}

fn annual(dates: &[&str]) -> LeaveInput {
    LeaveInput {
        kind: LeaveKind::Annual,
        dates: dates.iter().map(|d| d.to_string()).collect(),
        expected_time: None,
        reason: "family trip".to_string(),
    }
}

#[tokio::test]
async fn test_check_in_once_per_day() {
    let office = office(LeaveNotify::Thread);
    let out = office
        .attendance
        .check_in("u-alice", "alice", &office.channel, Some("file-1"))
        .await
        .unwrap();
    assert!(out.is_clean());
    assert_eq!(out.value.status(), AttendanceStatus::Working);
    assert_eq!(out.value.date, NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());

    let posts = office.chat.posts_in(&office.channel);
    assert_eq!(posts.len(), 1);
    assert!(posts[0].text.starts_with("@alice checked in at 08:00:00"));
    assert!(posts[0].text.contains("/api/v4/files/file-1/preview"));

    office.clock.advance(Duration::hours(1));
    let err = office
        .attendance
        .check_in("u-alice", "alice", &office.channel, None)
        .await
        .unwrap_err();
    match err {
        Error::AlreadyCheckedIn { at, .. } => assert_eq!(at, "08:00:00"),
        other => panic!("expected AlreadyCheckedIn, got {:?}", other),
    }
    assert_eq!(office.chat.posts_in(&office.channel).len(), 1);
}

#[tokio::test]
async fn test_break_and_check_out_thread() {
    let office = office(LeaveNotify::Thread);
    let service = &office.attendance;

    let err = service.break_start("u-alice", "alice", "").await.unwrap_err();
    assert!(matches!(err, Error::NotCheckedIn { .. }));

    let record = service
        .check_in("u-alice", "alice", &office.channel, None)
        .await
        .unwrap()
        .value;
    let root = record.post_id.clone().unwrap();

    let err = service.break_end("u-alice", "alice").await.unwrap_err();
    assert!(matches!(err, Error::NotOnBreak { .. }));

    office.clock.advance(Duration::hours(3));
    let out = service.break_start("u-alice", "alice", "lunch").await.unwrap();
    assert_eq!(out.value.status(), AttendanceStatus::OnBreak);

    let err = service.break_start("u-alice", "alice", "again").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyOnBreak { .. }));
    let err = service.check_out("u-alice", "alice").await.unwrap_err();
    assert!(matches!(err, Error::BreakOpen { .. }));

    office.clock.advance(Duration::minutes(75));
    let out = service.break_end("u-alice", "alice").await.unwrap();
    assert_eq!(out.value.status(), AttendanceStatus::Working);

    office.clock.advance(Duration::hours(5));
    let out = service.check_out("u-alice", "alice").await.unwrap();
    let record = out.value;
    assert_eq!(record.status(), AttendanceStatus::Completed);
    let end = record.check_out.unwrap();
    assert_eq!(record.break_time(end), Duration::minutes(75));
    assert_eq!(record.worked_time(end), Duration::hours(8));

    let replies = office.chat.replies_to(&root);
    assert_eq!(replies.len(), 3);
    assert!(replies[0].text.contains("started a break at 11:00:00: lunch"));
    assert!(replies[1].text.contains("after 1h 15m"));
    assert!(replies[2].text.contains("worked 8h"));
    assert!(replies[2].text.contains("breaks 1h 15m"));

    let err = service.check_out("u-alice", "alice").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyCheckedOut { .. }));
    let err = service.break_start("u-alice", "alice", "").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyCheckedOut { .. }));
}

#[tokio::test]
async fn test_day_report_lists_check_ins_and_leave() {
    let office = office(LeaveNotify::Thread);
    office
        .attendance
        .check_in("u-alice", "alice", &office.channel, None)
        .await
        .unwrap();
    office
        .leave
        .request("u-bob", Some("bob"), &office.channel, annual(&["2025-03-03"]))
        .await
        .unwrap();

    let today = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
    let report = office.attendance.day_report(today).await.unwrap();
    assert_eq!(report.lines.len(), 1);
    assert_eq!(report.lines[0].username, "alice");
    assert_eq!(report.leaves.len(), 1);
    assert_eq!(report.leaves[0].username, "bob");

    let text = report.to_string();
    assert!(text.contains("Attendance for 2025-03-03"));
    assert!(text.contains("@bob"));

    let tomorrow = today.succ_opt().unwrap();
    let err = office
        .attendance
        .user_report("u-alice", tomorrow, today)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    let lines = office
        .attendance
        .user_report("u-alice", today, tomorrow)
        .await
        .unwrap();
    assert_eq!(lines.len(), 1);
}

#[tokio::test]
async fn test_leave_cannot_be_self_approved() {
    let office = office(LeaveNotify::Thread);
    let req = office
        .leave
        .request("u-bob", None, &office.channel, annual(&["2025-03-05", "2025-03-04"]))
        .await
        .unwrap()
        .value;
    assert_eq!(req.username, "bob");
    assert_eq!(req.status, LeaveStatus::Pending);
    assert_eq!(req.approval_channel_id, office.approval);
    assert_eq!(
        req.dates,
        vec![
            NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
        ]
    );
    let approval_post = req.approval_post_id.clone().unwrap();
    let posted = office.chat.message(&approval_post).unwrap();
    assert!(posted.text.starts_with("@all\n"));
    let actions: Vec<String> = posted.actions.into_iter().map(|a| a.name).collect();
    assert_eq!(actions, vec!["Approve", "Reject"]);

    let err = office.leave.approve(&req.id, "u-bob", "bob").await.unwrap_err();
    assert!(matches!(err, Error::SelfAction));
    let err = office
        .leave
        .reject(&req.id, "u-bob", "bob", "")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SelfAction));
    assert_eq!(
        office.leave.get(&req.id).await.unwrap().status,
        LeaveStatus::Pending
    );

    let out = office.leave.approve(&req.id, "u-mia", "").await.unwrap();
    assert!(out.is_clean());
    assert_eq!(out.value.status, LeaveStatus::Approved);
    assert_eq!(out.value.decided_by_name.as_deref(), Some("mia"));

    let approval = office.chat.message(&approval_post).unwrap();
    assert!(approval.actions.is_empty());
    assert!(approval.text.contains("approved by @mia"));

    let info_post = out.value.post_id.clone().unwrap();
    let replies = office.chat.replies_to(&info_post);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].text.starts_with("@bob your request was approved"));
    assert!(office.chat.direct_messages("u-bob").is_empty());

    let err = office
        .leave
        .reject(&req.id, "u-mia", "mia", "changed my mind")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::AlreadyProcessed {
            status: LeaveStatus::Approved
        }
    ));
}

#[tokio::test]
async fn test_leave_decision_by_direct_message() {
    let office = office(LeaveNotify::Direct);
    let req = office
        .leave
        .request("u-bob", Some("bob"), &office.channel, annual(&["2025-03-10"]))
        .await
        .unwrap()
        .value;

    let out = office
        .leave
        .reject(&req.id, "u-mia", "mia", "short staffed")
        .await
        .unwrap();
    assert_eq!(out.value.status, LeaveStatus::Rejected);
    assert_eq!(out.value.reject_reason.as_deref(), Some("short staffed"));

    let dms = office.chat.direct_messages("u-bob");
    assert_eq!(dms.len(), 1);
    assert!(dms[0].contains("rejected by @mia: short staffed"));
    let info_post = req.post_id.unwrap();
    assert!(office.chat.replies_to(&info_post).is_empty());
}

#[tokio::test]
async fn test_partial_day_leave_validation() {
    let office = office(LeaveNotify::Thread);
    let late = |dates: &[&str], time: Option<&str>| LeaveInput {
        kind: LeaveKind::LateArrival,
        dates: dates.iter().map(|d| d.to_string()).collect(),
        expected_time: time.map(str::to_string),
        reason: "doctor".to_string(),
    };

    for input in [
        late(&["2025-03-04", "2025-03-05"], Some("10:00")),
        late(&["2025-03-04"], None),
        late(&["2025-03-04"], Some("10am")),
        late(&["2025-03-01"], Some("10:00")),
        late(&[], Some("10:00")),
    ] {
        let err = office
            .leave
            .request("u-bob", Some("bob"), &office.channel, input)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "got {:?}", err);
    }
    assert!(office.chat.posts_in(&office.channel).is_empty());

    let req = office
        .leave
        .request(
            "u-bob",
            Some("bob"),
            &office.channel,
            late(&["2025-03-04"], Some("10:30")),
        )
        .await
        .unwrap()
        .value;
    assert_eq!(req.expected_time, NaiveTime::from_hms_opt(10, 30, 0));
    let info = office.chat.message(req.post_id.as_deref().unwrap()).unwrap();
    assert!(info.text.contains("| Arrival | 10:30 |"));
}

#[tokio::test]
async fn test_leave_approval_channel_follows_environment() {
    let office = office(LeaveNotify::Thread);
    let req = office
        .leave
        .request("u-bob", Some("bob"), "ch-attendance-dev", annual(&["2025-03-04"]))
        .await
        .unwrap()
        .value;
    assert_eq!(req.approval_channel_id, "ch-attendance-approval-dev");
    assert_eq!(
        office.chat.posts_in("ch-attendance-approval-dev").len(),
        1
    );
    assert!(office.chat.posts_in(&office.approval).is_empty());
}

#[tokio::test]
async fn test_leave_from_unrelated_channel_fails() {
    let office = office(LeaveNotify::Thread);
    let other = office.chat.add_channel("team-1", "random");
    let err = office
        .leave
        .request("u-bob", Some("bob"), &other, annual(&["2025-03-04"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ChannelResolution(_)));
}
