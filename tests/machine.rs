use std::time::Duration;

use cnc_keel::{
    config::Protocol,
    error::Error,
    machine::{EngineOptions, COMMAND_QUEUE},
    message::{MachineState, Message},
};
use color_eyre::Result;
use pretty_assertions::assert_eq;
use tokio::time::Instant;

mod common;

use common::{receive, receive_raw, session_result};

const ACK: &str = r#"{"r":{},"f":[1,0,8]}"#;

#[tokio::test]
async fn commands_wait_for_acknowledgement() -> Result<()> {
    let mut session = common::connect_json();

    session.machine.send(r#"{"gc":"G0X1"}"#).await?;
    session.machine.send(r#"{"gc":"G0X2"}"#).await?;

    assert_eq!(session.controller.expect_line().await?, r#"{"gc":"G0X1"}"#);
    session
        .controller
        .expect_silence(Duration::from_millis(200))
        .await?;

    session.controller.reply(ACK).await?;
    assert_eq!(session.controller.expect_line().await?, r#"{"gc":"G0X2"}"#);

    Ok(())
}

#[tokio::test]
async fn status_reports_do_not_acknowledge() -> Result<()> {
    let mut session = common::connect_json();
    let mut subscription = session.machine.subscribe();

    session.machine.send("A").await?;
    session.machine.send("B").await?;
    assert_eq!(session.controller.expect_line().await?, "A");

    session
        .controller
        .reply(r#"{"sr":{"mpox":1.5,"mpoy":2.0}}"#)
        .await?;

    assert_eq!(
        receive_raw(&mut subscription).await?,
        "{\"sr\":{\"mpox\":1.5,\"mpoy\":2.0}}\nmpox: 1.500  mpoy: 2.000"
    );
    assert_eq!(
        receive(&mut subscription).await?,
        Message::State(MachineState {
            x: Some(1.5),
            y: Some(2.0),
            z: None,
        })
    );

    session
        .controller
        .expect_silence(Duration::from_millis(100))
        .await?;

    session.controller.reply(ACK).await?;
    assert_eq!(session.controller.expect_line().await?, "B");

    Ok(())
}

#[tokio::test]
async fn raw_then_state_for_every_response() -> Result<()> {
    let mut session = common::connect_json();
    let mut subscription = session.machine.subscribe();

    session
        .controller
        .reply(r#"{"r":{"sr":{"mpoz":-3.25}},"f":[1,0,10]}"#)
        .await?;
    session.controller.reply(ACK).await?;

    assert_eq!(
        receive_raw(&mut subscription).await?,
        "{\"r\":{\"sr\":{\"mpoz\":-3.25}},\"f\":[1,0,10]}\nmpoz: -3.250"
    );
    let expected = MachineState {
        x: None,
        y: None,
        z: Some(-3.25),
    };
    assert_eq!(receive(&mut subscription).await?, Message::State(expected));

    // No report, so the state is republished unchanged.
    assert_eq!(receive_raw(&mut subscription).await?, ACK);
    assert_eq!(receive(&mut subscription).await?, Message::State(expected));

    Ok(())
}

#[tokio::test]
async fn replies_split_across_reads() -> Result<()> {
    let mut session = common::connect_json();
    let mut subscription = session.machine.subscribe();

    session.controller.reply(r#"{"sr":{"mp"#).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.controller.reply("ox\":7}}\n{\"sr\":{\"mpoy\":8}}").await?;

    assert_eq!(
        receive_raw(&mut subscription).await?,
        "{\"sr\":{\"mpox\":7}}\nmpox: 7.000"
    );
    receive(&mut subscription).await?;

    assert_eq!(
        receive_raw(&mut subscription).await?,
        "{\"sr\":{\"mpoy\":8}}\nmpoy: 8.000"
    );
    assert_eq!(
        receive(&mut subscription).await?,
        Message::State(MachineState {
            x: Some(7.0),
            y: Some(8.0),
            z: None,
        })
    );

    Ok(())
}

#[tokio::test]
async fn blank_commands_are_not_sent() -> Result<()> {
    let mut session = common::connect_json();

    session.machine.send("").await?;
    session.machine.send(" \r\n").await?;
    session.machine.send("G0X1\r\n").await?;

    assert_eq!(session.controller.expect_line().await?, "G0X1");

    Ok(())
}

#[tokio::test]
async fn passthrough_does_not_wait() -> Result<()> {
    let mut session = common::connect_passthrough();
    let mut subscription = session.machine.subscribe();

    session.machine.send("G0 X1").await?;
    session.machine.send("G0 X2").await?;

    assert_eq!(session.controller.expect_line().await?, "G0 X1");
    assert_eq!(session.controller.expect_line().await?, "G0 X2");

    session.controller.reply("ok\r\nnot json {\n").await?;

    assert_eq!(receive_raw(&mut subscription).await?, "ok");
    assert_eq!(receive_raw(&mut subscription).await?, "not json {");

    Ok(())
}

#[tokio::test]
async fn malformed_reply_ends_the_session() -> Result<()> {
    let mut session = common::connect_json();
    let mut subscription = session.machine.subscribe();

    session.controller.reply(r#"{"sr":"nope"}"#).await?;

    let result = session_result(session.handle).await?;
    assert!(matches!(result, Err(Error::BadResponse { .. })), "{result:?}");

    assert_eq!(subscription.recv().await, None);
    assert!(matches!(
        session.machine.send("G0X1").await,
        Err(Error::SessionEnded)
    ));
    assert!(matches!(
        session.machine.try_send("G0X1"),
        Err(Error::SessionEnded)
    ));

    Ok(())
}

#[tokio::test]
async fn stray_brace_ends_the_session() -> Result<()> {
    let mut session = common::connect_json();

    session.controller.reply("}").await?;

    let result = session_result(session.handle).await?;
    assert!(matches!(result, Err(Error::Framing(_))), "{result:?}");

    Ok(())
}

#[tokio::test]
async fn hang_up_while_waiting() -> Result<()> {
    let mut session = common::connect_json();
    let mut subscription = session.machine.subscribe();

    session.machine.send("G0X1").await?;
    session.controller.expect_line().await?;
    session.controller.hang_up().await?;

    let result = session_result(session.handle).await?;
    assert!(matches!(result, Err(Error::ConnectionClosed)), "{result:?}");
    assert_eq!(subscription.recv().await, None);

    Ok(())
}

#[tokio::test]
async fn hang_up_mid_object() -> Result<()> {
    let mut session = common::connect_json();

    session.controller.reply(r#"{"r":{"#).await?;
    session.controller.hang_up().await?;

    let result = session_result(session.handle).await?;
    assert!(matches!(result, Err(Error::Framing(_))), "{result:?}");

    Ok(())
}

#[tokio::test]
async fn dropping_every_handle_stops_cleanly() -> Result<()> {
    let session = common::connect_json();
    let mut subscription = session.machine.subscribe();

    drop(session.machine);

    assert!(session_result(session.handle).await?.is_ok());
    assert_eq!(subscription.recv().await, None);

    Ok(())
}

#[tokio::test]
async fn unacknowledged_command_times_out() -> Result<()> {
    let mut session = common::connect(EngineOptions {
        ack_timeout: Some(Duration::from_millis(100)),
        ..EngineOptions::with_protocol(Protocol::Json)
    });

    session.machine.send("G0X1").await?;
    session.controller.expect_line().await?;

    let result = session_result(session.handle).await?;
    assert!(matches!(result, Err(Error::AckTimeout(_))), "{result:?}");

    Ok(())
}

#[tokio::test]
async fn every_subscriber_sees_everything() -> Result<()> {
    let mut session = common::connect_passthrough();
    let mut first = session.machine.subscribe();
    let mut second = session.machine.clone().subscribe();

    session.controller.reply("one\ntwo\n").await?;

    for subscription in [&mut first, &mut second] {
        assert_eq!(receive_raw(subscription).await?, "one");
        assert_eq!(receive_raw(subscription).await?, "two");
    }

    Ok(())
}

#[tokio::test]
async fn status_reports_do_not_extend_the_deadline() -> Result<()> {
    let limit = Duration::from_millis(400);
    let mut session = common::connect(EngineOptions {
        ack_timeout: Some(limit),
        ..EngineOptions::with_protocol(Protocol::Json)
    });

    let started = Instant::now();
    session.machine.send("G0X1").await?;
    session.controller.expect_line().await?;

    tokio::time::sleep(Duration::from_millis(300)).await;
    session.controller.reply(r#"{"sr":{"mpox":0.5}}"#).await?;

    let result = session_result(session.handle).await?;
    assert!(matches!(result, Err(Error::AckTimeout(_))), "{result:?}");

    // Had the report restarted the clock, the session would have lasted 700ms.
    assert!(started.elapsed() < Duration::from_millis(650));

    Ok(())
}

#[tokio::test]
async fn footer_while_idle_changes_nothing() -> Result<()> {
    let mut session = common::connect_json();
    let mut subscription = session.machine.subscribe();

    session.controller.reply(ACK).await?;
    assert_eq!(receive_raw(&mut subscription).await?, ACK);
    receive(&mut subscription).await?;

    session.machine.send("A").await?;
    session.machine.send("B").await?;

    // The earlier footer does not count for A, so B is held back.
    assert_eq!(session.controller.expect_line().await?, "A");
    session
        .controller
        .expect_silence(Duration::from_millis(200))
        .await?;

    session.controller.reply(ACK).await?;
    assert_eq!(session.controller.expect_line().await?, "B");

    Ok(())
}

#[tokio::test]
async fn command_queue_is_bounded() -> Result<()> {
    let mut session = common::connect_json();

    session.machine.send("first").await?;
    assert_eq!(session.controller.expect_line().await?, "first");

    // Nothing more is taken from the queue until "first" is acknowledged.
    for n in 0..COMMAND_QUEUE {
        session.machine.try_send(format!("queued {n}"))?;
    }
    assert!(matches!(
        session.machine.try_send("one too many"),
        Err(Error::CommandQueueFull(COMMAND_QUEUE))
    ));

    session.controller.reply(ACK).await?;
    assert_eq!(session.controller.expect_line().await?, "queued 0");

    Ok(())
}
