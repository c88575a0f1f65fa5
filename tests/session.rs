//! Session engine tests against real child processes
//!
//! Every test drives a short `sh -c` script through the expectation
//! API, covering pattern waits, deferred outcomes, requirement gating
//! and termination checks.

use std::time::Duration;

use ribcheck::common::config::Timeouts;
use ribcheck::common::Error;
use ribcheck::session::{
    Console, InteractiveSession, Outcome, Requirement, FINISH_IDENTIFIER,
};
use ribcheck::zserv::AddressFamily;

fn timeouts() -> Timeouts {
    Timeouts {
        expect_secs: 5,
        finish_secs: 2,
        settle_ms: 10,
    }
}

fn spawn_script(script: &str) -> InteractiveSession {
    InteractiveSession::spawn("sh", &["-c".to_string(), script.to_string()], &timeouts())
        .unwrap()
}

#[tokio::test]
async fn test_expect_advances_through_the_stream() {
    let mut session = spawn_script("echo alpha; echo beta; echo gamma");

    session.expect("alpha").await.unwrap();
    session.expect("gamma").await.unwrap();
    // Everything between the two matches was skipped into `before`
    assert_eq!(session.before(), "\nbeta\n");
}

#[tokio::test]
async fn test_stderr_is_merged_into_the_stream() {
    // No stdout at all; the pattern can only come from stderr
    let mut session = spawn_script("echo err >&2; sleep 1");

    session.expect("err").await.unwrap();
    session.terminate().await;
}

#[tokio::test]
async fn test_send_line_reaches_the_child() {
    let mut session = spawn_script("read line; echo \"got $line\"");

    session.send_line("ping").await.unwrap();
    session.expect("got ping").await.unwrap();
}

#[tokio::test]
async fn test_named_check_records_a_pass() {
    let mut session = spawn_script("echo ready");

    let outcome = session.test_expect("startup", "ready", &[]).await.unwrap();
    assert_eq!(outcome, Outcome::Passed);
    assert!(session.outcomes().get("startup").unwrap().is_passed());
}

#[tokio::test]
async fn test_anonymous_wait_times_out() {
    let mut session = spawn_script("sleep 30");

    let err = session
        .expect_timeout("never", Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(..)));
}

#[tokio::test]
async fn test_named_check_timeout_is_recorded_and_raised() {
    let mut tight = timeouts();
    tight.expect_secs = 1;
    let mut session =
        InteractiveSession::spawn("sh", &["-c".to_string(), "sleep 30".to_string()], &tight)
            .unwrap();

    let err = session.test_expect("slow", "never", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(..)));
    assert!(!session.outcomes().get("slow").unwrap().is_passed());
}

#[tokio::test]
async fn test_end_of_stream_is_a_connection_error() {
    let mut session = spawn_script("echo short");

    let err = session.expect("never").await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
}

#[tokio::test]
async fn test_unmet_requirement_skips_the_stream_entirely() {
    let mut session = spawn_script("sleep 30");

    let unmet = Requirement::new(false, "Test requires frobnication");
    let outcome = session
        .test_expect("gated", "never", &[unmet])
        .await
        .unwrap();

    match outcome {
        Outcome::Failed(cause) => assert!(cause.contains("frobnication"), "cause: {}", cause),
        Outcome::Passed => panic!("expected a failure"),
    }
    // The requirement gate must decide without a single stream read
    assert_eq!(session.stream_reads(), 0);
    session.terminate().await;
}

#[tokio::test]
async fn test_session_level_requirements_gate_every_check() {
    let mut session = spawn_script("echo ready");
    session.add_requirement(Requirement::new(false, "Test requires root privileges"));

    let outcome = session.test_expect("startup", "ready", &[]).await.unwrap();
    assert!(!outcome.is_passed());
    session.terminate().await;
}

#[tokio::test]
async fn test_repeated_check_replays_the_recorded_outcome() {
    let mut session = spawn_script("echo one; sleep 1");

    let first = session.test_expect("check", "one", &[]).await.unwrap();
    assert_eq!(first, Outcome::Passed);

    // A repeat of the same identifier must replay the stored outcome
    // without consuming anything further from the stream
    let reads = session.stream_reads();
    let second = session
        .test_expect("check", "never-printed", &[])
        .await
        .unwrap();
    assert_eq!(second, Outcome::Passed);
    assert_eq!(session.stream_reads(), reads);
    session.terminate().await;
}

#[tokio::test]
async fn test_multiline_report_passes_on_ok_tail() {
    let mut session =
        spawn_script("printf 'REPORT\\nfirst check\\n\\033[32mOK\\033[0m\\n\\n'; sleep 1");

    let outcome = session.multiline_test("report", "REPORT", &[]).await.unwrap();
    assert_eq!(outcome, Outcome::Passed);
    session.terminate().await;
}

#[tokio::test]
async fn test_multiline_report_fails_without_ok_tail() {
    let mut session = spawn_script("printf 'REPORT\\nfirst check\\nFAILED\\n\\n'; sleep 1");

    let outcome = session.multiline_test("report", "REPORT", &[]).await.unwrap();
    match outcome {
        Outcome::Failed(cause) => assert!(cause.contains("FAILED"), "cause: {}", cause),
        Outcome::Passed => panic!("expected a failure"),
    }
    session.terminate().await;
}

#[tokio::test]
async fn test_finish_passes_on_clean_exit() {
    let mut session = spawn_script("echo done");

    session.expect("done").await.unwrap();
    let outcome = session.finish().await.unwrap();
    assert_eq!(outcome, Outcome::Passed);
    assert!(session
        .outcomes()
        .get(FINISH_IDENTIFIER)
        .unwrap()
        .is_passed());
}

#[tokio::test]
async fn test_finish_records_a_nonzero_exit_status() {
    let mut session = spawn_script("exit 3");

    let outcome = session.finish().await.unwrap();
    match outcome {
        Outcome::Failed(cause) => assert!(cause.contains('3'), "cause: {}", cause),
        Outcome::Passed => panic!("expected a failure"),
    }
}

#[tokio::test]
async fn test_finish_records_a_hanging_program() {
    let mut tight = timeouts();
    tight.finish_secs = 1;
    let mut session =
        InteractiveSession::spawn("sh", &["-c".to_string(), "sleep 30".to_string()], &tight)
            .unwrap();

    let outcome = session.finish().await.unwrap();
    assert!(!outcome.is_passed());
    assert!(session.outcomes().get(FINISH_IDENTIFIER).is_some());
}

// A stand-in daemon console: prompts, echoes each command, and answers
// the route dump query
const FAKE_CONSOLE: &str = r#"
printf '# '
while read cmd; do
  printf '%s\n' "$cmd"
  if [ "$cmd" = "show ip route" ]; then
    printf 'Codes: S - static, C - connected\n'
    printf '\n'
    printf 'S> 198.51.100.0/25 [1/0]\n'
    printf '  * via 192.0.2.1, eth0\n'
  fi
  printf '# '
done
"#;

#[tokio::test]
async fn test_console_command_cycle_captures_output() {
    let mut console = Console::start(
        "sh",
        &["-c".to_string(), FAKE_CONSOLE.to_string()],
        "# ",
        &timeouts(),
    )
    .await
    .unwrap();

    let output = console.command("show ip route").await.unwrap();
    assert!(output.starts_with("Codes:"));
    assert!(output.contains("198.51.100.0/25"));

    let rib = console.rib(AddressFamily::Ipv4).await.unwrap();
    let table = &rib[&'S'];
    let entry = &table["198.51.100.0/25"];
    assert!(entry.selected);
    assert_eq!(entry.distance, Some(1));
    assert_eq!(entry.nexthops[0].iface.as_deref(), Some("eth0"));

    console.terminate().await;
}
