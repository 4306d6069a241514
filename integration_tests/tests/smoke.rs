mod common;

use std::time::Duration;

use anyhow::Result;

use common::MockHost;
use sim_control::{commands, DualClient};
use sim_wire::{ClientReply, PlayerState, ResponseCode, Snapshot, Stage};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn state_round_trip_through_dual_client() -> Result<()> {
    let host = MockHost::spawn().await;
    host.set_snapshot(Snapshot {
        frame: 42,
        stage: Stage::Ingame,
        players: vec![PlayerState {
            handle: 10,
            index: 0,
            name: "player_0".into(),
            current: true,
            credits: 5000,
            defeated: false,
        }],
        ..Default::default()
    })
    .await;

    let client = DualClient::connect(&host.endpoint());
    let result = client
        .exec_command(&commands::get_state(), COMMAND_TIMEOUT)
        .await?;
    assert_eq!(result.code, ResponseCode::Ok);

    let reply: ClientReply = sim_wire::decode(&result.body)?;
    let ClientReply::State(snapshot) = reply else {
        panic!("expected a state reply");
    };
    assert_eq!(snapshot.frame, 42);
    assert_eq!(snapshot.stage, Stage::Ingame);
    assert_eq!(snapshot.players.len(), 1);
    assert_eq!(snapshot.players[0].name, "player_0");

    client.stop().await;
    Ok(())
}

#[tokio::test]
async fn sequential_commands_share_one_session() -> Result<()> {
    let host = MockHost::spawn().await;
    let client = DualClient::connect(&host.endpoint());

    for frame in 1..=3u64 {
        host.set_snapshot(Snapshot {
            frame,
            stage: Stage::Ingame,
            ..Default::default()
        })
        .await;
        let result = client
            .exec_command(&commands::get_state(), COMMAND_TIMEOUT)
            .await?;
        let ClientReply::State(snapshot) = sim_wire::decode(&result.body)? else {
            panic!("expected a state reply");
        };
        assert_eq!(snapshot.frame, frame);
    }

    client.stop().await;
    Ok(())
}

#[tokio::test]
async fn place_query_echoes_candidate_cells() -> Result<()> {
    let host = MockHost::spawn().await;
    let client = DualClient::connect(&host.endpoint());

    let center = sim_wire::Coordinates::from_cell(10, 10);
    let cells = commands::cell_grid(center, 3, 3);
    let result = client
        .exec_command(&commands::place_query(7, 10, cells.clone()), COMMAND_TIMEOUT)
        .await?;
    let ClientReply::PlaceLocations(locations) = sim_wire::decode(&result.body)? else {
        panic!("expected place locations");
    };
    assert_eq!(locations, cells);

    client.stop().await;
    Ok(())
}
