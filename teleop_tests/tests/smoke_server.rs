use futures_util::{SinkExt, StreamExt};
use teleop_server::{handler::FollowHandler, server::bind_ephemeral};
use teleop_shared::net::decode_poses;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Smoke test: a raw socket client gets one pose map per frame, and garbage
/// is skipped without dropping the connection.
#[tokio::test]
async fn server_answers_raw_frames() -> anyhow::Result<()> {
    teleop_tests::init_tracing();

    let (server, cfg) = bind_ephemeral(FollowHandler::new(["Base", "Jaw"])).await?;
    let server_handle = tokio::spawn(async move { server.accept_one().await });

    let (mut ws, _) = connect_async(cfg.ws_url.as_str()).await?;

    let identity = "[1,0,0,0,0,1,0,0,0,0,1,0,0,0,0,1]";
    let frame = format!(
        r#"{{"leftController": {{"pose": {identity}, "buttons": [], "axes": []}},
            "rightController": {{"pose": {identity}, "buttons": [{{"pressed": false, "value": 0}}], "axes": [0, 0]}}}}"#
    );

    ws.send(Message::text("not a frame")).await?;
    ws.send(Message::text(frame)).await?;

    let reply = loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => break text.as_str().to_owned(),
            Some(Ok(_)) => continue,
            other => anyhow::bail!("unexpected {other:?}"),
        }
    };
    let poses = decode_poses(&reply)?;
    assert_eq!(poses.len(), 2);
    assert_eq!(poses.0["Jaw"].to_matrix(), teleop_shared::math::Mat4::identity());

    ws.close(None).await?;
    server_handle.await??.await?;
    Ok(())
}
