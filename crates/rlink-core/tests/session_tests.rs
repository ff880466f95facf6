//! Integration tests driving a full Session against a scripted interpreter.
//!
//! The fake interpreter speaks the command templates and calls back over the
//! session's loopback endpoint, so every exchange crosses real HTTP.

mod common;

use common::FakeR;
use rlink::plot::{self, GraphConfig};
use rlink::{values, RlinkError, Session, Table};
use std::sync::{Arc, Mutex};

type CommandLog = Arc<Mutex<Vec<String>>>;

async fn connect() -> (Session, CommandLog) {
    let fake = FakeR::start();
    let commands = fake.commands();
    let session = Session::with_interpreter(fake).await.unwrap();
    (session, commands)
}

fn last_command(commands: &CommandLog) -> String {
    commands.lock().unwrap().last().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_push_run_pull() {
    let (mut session, commands) = connect().await;

    session
        .push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], "mydata")
        .await
        .unwrap();
    let push_command = last_command(&commands);
    assert!(push_command.starts_with("mydata <- fromJSON(getURL(\"http://127.0.0.1:"));
    assert!(push_command.contains("/host.data.0\""));

    session.run("mydata = mydata + 1").await.unwrap();

    let bumped: Vec<f64> = session.pull("mydata").await.unwrap();
    assert_eq!(bumped, vec![5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
    assert!(last_command(&commands).contains("/r.data.1\""));

    assert!(session.error().is_none());
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_pushed_blob_removed_after_push() {
    let (mut session, commands) = connect().await;
    let url = format!("http://127.0.0.1:{}/host.data.0", session.port());

    session.push("hello", "greeting").await.unwrap();
    assert!(last_command(&commands).contains(&url));

    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    let greeting: String = session.pull("greeting").await.unwrap();
    assert_eq!(greeting, "hello");
}

#[tokio::test]
async fn test_escalated_warning_is_error() {
    let (mut session, _) = connect().await;

    session.run("options(warn = 2)").await.unwrap();
    let err = session.run("warning('hi')").await.unwrap_err();
    match &err {
        RlinkError::Interpreter(message) => assert_eq!(message, "(converted from warning) hi"),
        other => panic!("Expected Interpreter error, got: {:?}", other),
    }
    assert!(!err.is_warning());
    assert!(session.error().is_some());
}

#[tokio::test]
async fn test_warning_does_not_latch() {
    let (mut session, _) = connect().await;

    let err = session.run("warning('hi')").await.unwrap_err();
    assert!(matches!(err, RlinkError::InterpreterWarning(ref m) if m == "hi"));
    assert!(session.error().is_none());

    session.run("invisible(NULL)").await.unwrap();
}

#[tokio::test]
async fn test_error_latches_until_taken() {
    let (mut session, commands) = connect().await;

    let err = session.run("stop('boom')").await.unwrap_err();
    assert!(matches!(err, RlinkError::Interpreter(ref m) if m == "boom"));
    let sent = commands.lock().unwrap().len();

    // Every operation short-circuits without reaching the interpreter.
    for _ in 0..2 {
        let again = session.run("invisible(NULL)").await.unwrap_err();
        assert!(matches!(again, RlinkError::Interpreter(ref m) if m == "boom"));
    }
    assert!(session.push(&[1, 2, 3], "x").await.is_err());
    assert!(session.pull::<Vec<i32>>("x").await.is_err());
    assert!(session.push_table(&Table::new(["a"]), "df").await.is_err());
    assert_eq!(commands.lock().unwrap().len(), sent);

    let taken = session.take_error().unwrap();
    assert!(taken.is_interpreter_error());
    session.run("invisible(NULL)").await.unwrap();
    assert_eq!(commands.lock().unwrap().len(), sent + 1);
}

#[tokio::test]
async fn test_pull_missing_variable_reports_command_error() {
    let (mut session, _) = connect().await;

    let err = session.pull::<Vec<f64>>("nope").await.unwrap_err();
    assert!(matches!(err, RlinkError::Interpreter(ref m) if m == "object 'nope' not found"));
    assert!(session.error().unwrap().is_interpreter_error());
}

#[tokio::test]
async fn test_pull_decode_failure_latches() {
    let (mut session, _) = connect().await;

    session.push("not numbers", "x").await.unwrap();
    let err = session.pull::<Vec<f64>>("x").await.unwrap_err();
    assert!(matches!(err, RlinkError::Decode { .. }));
    assert!(matches!(session.error(), Some(RlinkError::Decode { .. })));
}

#[tokio::test]
async fn test_pair_shaped_result_is_decode_error() {
    let (mut session, _) = connect().await;

    let err = session.run("emit_pair_result()").await.unwrap_err();
    assert!(matches!(err, RlinkError::Decode { .. }));
    assert!(err.is_sticky());
    assert!(session.error().is_some());
}

#[tokio::test]
async fn test_table_push_pull_roundtrip() {
    let (mut session, commands) = connect().await;

    let mut table = Table::new(["score", "label", "ok"]);
    table.append_named_row("first", values![1.5, "x", true]);
    table.append_named_row("second", values![-2.25, "y", false]);

    session.push_table(&table, "df").await.unwrap();
    assert!(last_command(&commands).contains("df <- as.data.frame(setNames("));

    let pulled = session.pull_table("df").await.unwrap();
    assert_eq!(pulled, table);
    assert_eq!(pulled.column("score").get::<f64>("second").unwrap(), -2.25);
    assert_eq!(pulled.row("first").get::<String>("label").unwrap(), "x");
}

#[tokio::test]
async fn test_plot_helpers_push_series() {
    let (mut session, commands) = connect().await;

    let config = GraphConfig::new().with_color("red").with_type("l");
    plot::plot_x(&mut session, &[3.0, 1.0, 2.0], &config)
        .await
        .unwrap();
    assert_eq!(
        last_command(&commands),
        r#"plot(rlink.x, rlink.y, col="red", type="l")"#
    );

    let x: Vec<f64> = session.pull("rlink.x").await.unwrap();
    assert_eq!(x, vec![1.0, 2.0, 3.0]);

    plot::lines(&mut session, &[0.0, 1.0], &[1.0, 0.0], &GraphConfig::new())
        .await
        .unwrap();
    assert_eq!(last_command(&commands), "lines(rlink.x, rlink.y)");
}

#[tokio::test]
async fn test_close_stops_endpoint() {
    let (session, _) = connect().await;
    let url = format!("http://127.0.0.1:{}/anything", session.port());

    session.close().await.unwrap();
    assert!(reqwest::get(&url).await.is_err());
}
