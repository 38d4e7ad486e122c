//! Socket-based integration tests: a scripted server drives a real client.

use std::time::Duration;

use realm_client::GameClient;
use realm_shared::event::{PresentationEvent, SessionEndReason};
use realm_shared::net::{CharacterSelection, Keys, Outbound};
use realm_tests::{
    bind_ephemeral, drive_until, enemy, init_tracing, player, unix_ms, welcome, zone, zone_set,
    ScriptedServer,
};

const LIMIT: Duration = Duration::from_secs(3);

async fn connected_pair() -> anyhow::Result<(ScriptedServer, GameClient)> {
    let (mut server, cfg) = bind_ephemeral().await?;
    let (client, accepted) = tokio::join!(GameClient::connect(&cfg), server.accept_one());
    accepted?;
    Ok((server, client?))
}

/// Full session: handshake, sync, input stream, then the server hangs up.
#[tokio::test]
async fn session_syncs_streams_input_and_ends_on_hangup() -> anyhow::Result<()> {
    init_tracing();
    let (mut server, mut client) = connected_pair().await?;

    let t0 = unix_ms();
    server
        .send(&[
            welcome(
                "p1",
                vec![
                    zone(0, "default", 0.0, 0.0),
                    zone(1, "yield_fields_1", 0.0, 0.0),
                    zone(2, "mmorpg", 8192.0, 0.0),
                ],
            ),
            zone_set(1, 2, 3, 4),
            player("p1", 100.0, 100.0, 1, t0, 100),
            enemy("e1", 300.0, 300.0, 1, t0, 100),
            enemy("e_far", 300.0, 300.0, 9, t0, 100),
        ])
        .await?;

    drive_until(&mut client, LIMIT, |c| c.session.players().local().is_some()).await?;
    assert_eq!(client.session.local_id(), Some("p1"));
    assert_eq!(client.session.enemies().len(), 1, "zone 9 is not active");
    assert_eq!(client.session.registry().len(), 2);
    assert_eq!(client.session.world_bounds().right(), 16384.0);

    // Input flows on the cadence now that the local player is tracked.
    client.set_keys(Keys::RIGHT | Keys::ACTION);
    let reader = tokio::spawn(async move {
        let msg = server.recv().await;
        (server, msg)
    });
    drive_until(&mut client, LIMIT, |_| reader.is_finished()).await?;
    let (mut server, msg) = reader.await?;
    match msg? {
        Outbound::Input { keys } => {
            assert!(keys.right && keys.action);
            assert!(!keys.up && !keys.left && !keys.down);
        }
        other => panic!("expected input, got {other:?}"),
    }

    server.hang_up();
    drive_until(&mut client, LIMIT, |c| !c.is_connected()).await?;

    assert_eq!(client.session.local_id(), None);
    let ended: Vec<_> = client
        .session
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, PresentationEvent::SessionEnded { .. }))
        .collect();
    assert_eq!(
        ended,
        vec![PresentationEvent::SessionEnded {
            reason: SessionEndReason::Disconnected
        }]
    );
    Ok(())
}

#[tokio::test]
async fn spawn_intent_reaches_server_once() -> anyhow::Result<()> {
    init_tracing();
    let (mut server, mut client) = connected_pair().await?;

    let selection = CharacterSelection {
        character_type: "gotchi".to_string(),
        character_id: 4242,
    };
    client.request_spawn(selection.clone()).await?;
    assert!(client.request_spawn(selection.clone()).await.is_err());

    let msg = server.recv().await?;
    assert_eq!(msg, Outbound::SpawnIntent(selection));
    assert!(server.recv_timeout(Duration::from_millis(50)).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn malformed_frames_do_not_end_the_session() -> anyhow::Result<()> {
    init_tracing();
    let (mut server, mut client) = connected_pair().await?;

    server.send_raw(b"not json").await?;
    server.send_raw(br#"{"kind":"welcome","data":{"localId":"p0"}}"#).await?;
    server
        .send_raw(br#"[{"kind":"weather","data":{}},{"kind":"welcome","data":{"localId":"p1"}}]"#)
        .await?;

    drive_until(&mut client, LIMIT, |c| c.session.local_id().is_some()).await?;
    assert_eq!(client.session.local_id(), Some("p1"));
    assert!(client.is_connected());
    Ok(())
}

#[tokio::test]
async fn admission_limit_applies_per_frame() -> anyhow::Result<()> {
    init_tracing();
    let (mut server, mut client) = connected_pair().await?;

    let t0 = unix_ms();
    let mut batch = vec![zone_set(1, 2, 3, 4)];
    batch.extend((0..25).map(|i| enemy(&format!("e{i}"), 10.0 * i as f32, 0.0, 1, t0, 100)));
    server.send(&batch).await?;
    drive_until(&mut client, LIMIT, |c| c.session.enemies().len() >= 20).await?;
    assert_eq!(client.session.enemies().len(), 20);
    assert!(!client.session.enemies().contains("e24"));

    // Same ids again: the first 20 update, the rest are admitted now.
    server.send(&batch[1..]).await?;
    drive_until(&mut client, LIMIT, |c| c.session.enemies().len() >= 25).await?;
    assert!(client
        .session
        .enemies()
        .get_all()
        .all(|e| e.has_render_resources()));
    Ok(())
}

#[tokio::test]
async fn leaving_zone_releases_its_entities() -> anyhow::Result<()> {
    init_tracing();
    let (mut server, mut client) = connected_pair().await?;

    let t0 = unix_ms();
    server
        .send(&[
            zone_set(5, 6, 7, 8),
            enemy("a", 0.0, 0.0, 5, t0, 100),
            enemy("b", 0.0, 0.0, 6, t0, 100),
        ])
        .await?;
    drive_until(&mut client, LIMIT, |c| c.session.enemies().len() == 2).await?;

    server.send(&[zone_set(6, 7, 8, 9)]).await?;
    drive_until(&mut client, LIMIT, |c| c.session.enemies().len() == 1).await?;
    assert!(client.session.enemies().contains("b"));

    let culled: Vec<_> = client
        .session
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            PresentationEvent::ZoneCulled { zone_id, removed } => Some((zone_id, removed)),
            _ => None,
        })
        .collect();
    assert_eq!(culled, vec![(5, 1)]);
    Ok(())
}
