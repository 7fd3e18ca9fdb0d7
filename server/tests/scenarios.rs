//! End-to-end behaviour through `GroundStation::handle`

use dronepost_server::config::QueryConfig;
use dronepost_server::{GroundStation, Store};
use dronepost_shared::{
    now_ms, CommandStatus, ErrorKind, NewCommand, NewCoordinate, NewCoordinateLog, NewTelemetry,
    Reply, Request, Response,
};
use serde_json::json;

fn ok(resp: Response) -> Reply {
    match resp {
        Response::Ok(reply) => reply,
        Response::Err(e) => panic!("unexpected error: {:?} {}", e.kind, e.message),
    }
}

fn err_kind(resp: Response) -> ErrorKind {
    match resp {
        Response::Err(e) => e.kind,
        Response::Ok(reply) => panic!("expected an error, got {reply:?}"),
    }
}

async fn stations() -> Vec<(&'static str, GroundStation, Option<tempfile::TempDir>)> {
    let dir = tempfile::tempdir().unwrap();
    let redb = Store::open(&dir.path().join("scenarios.redb")).unwrap();
    vec![
        ("memory", GroundStation::in_memory(), None),
        ("redb", GroundStation::new(redb, &QueryConfig::default()), Some(dir)),
    ]
}

#[tokio::test]
async fn goto_command_round_trip() {
    for (backend, station, _dir) in stations().await {
        let Reply::Command(cmd) = ok(station
            .handle(Request::Enqueue(NewCommand {
                drone_id: "drone_01".into(),
                command: "GOTO".into(),
                parameters: Some(json!({"lat": 37.7749, "lon": -122.4194})),
            }))
            .await)
        else {
            panic!("{backend}: expected a command");
        };

        let poll = Request::PollPending {
            drone_id: "drone_01".into(),
        };
        let Reply::Commands(pending) = ok(station.handle(poll.clone()).await) else {
            panic!("{backend}: expected commands");
        };
        assert_eq!(pending.len(), 1, "{backend}");
        assert_eq!(pending[0].id, cmd.id);
        assert_eq!(pending[0].status, CommandStatus::Pending);

        let Reply::Command(done) = ok(station
            .handle(Request::UpdateStatus {
                id: cmd.id,
                status: "COMPLETED".into(),
                result: Some(json!({"reached": true})),
            })
            .await)
        else {
            panic!("{backend}: expected a command");
        };
        assert_eq!(done.status, CommandStatus::Completed);
        assert!(done.executed_at.is_some(), "{backend}");
        assert_eq!(done.result, Some(json!({"reached": true})));

        let Reply::Commands(pending) = ok(station.handle(poll).await) else {
            panic!("{backend}: expected commands");
        };
        assert!(pending.is_empty(), "{backend}");

        // Terminal status cannot change
        let resp = station
            .handle(Request::UpdateStatus {
                id: cmd.id,
                status: "FAILED".into(),
                result: None,
            })
            .await;
        assert_eq!(err_kind(resp), ErrorKind::InvalidTransition, "{backend}");
    }
}

#[tokio::test]
async fn deliver_without_visit() {
    for (backend, station, _dir) in stations().await {
        let Reply::Coordinate(c) = ok(station
            .handle(Request::RecordCoordinate(NewCoordinate::at(37.0, -122.0)))
            .await)
        else {
            panic!("{backend}: expected a coordinate");
        };

        let Reply::Coordinate(delivered) = ok(station.handle(Request::MarkDelivered { id: c.id }).await)
        else {
            panic!("{backend}: expected a coordinate");
        };
        assert!(delivered.is_visited && delivered.is_delivered, "{backend}");

        let Reply::Coordinates(pending) = ok(station.handle(Request::ListPending).await) else {
            panic!("{backend}: expected coordinates");
        };
        assert!(pending.is_empty());
        let Reply::Coordinates(unvisited) = ok(station.handle(Request::ListUnvisited).await) else {
            panic!("{backend}: expected coordinates");
        };
        assert!(unvisited.is_empty());
    }
}

#[tokio::test]
async fn correlate_trigger_to_log_sample() {
    for (backend, station, _dir) in stations().await {
        let trigger = 1_700_000_000_000;
        let Reply::Log(log) = ok(station
            .handle(Request::AppendLog(NewCoordinateLog {
                altitude: Some(42.0),
                ..NewCoordinateLog::at(37.1, -122.1, trigger + 2000)
            }))
            .await)
        else {
            panic!("{backend}: expected a log");
        };

        let Reply::Correlation(found) = ok(station
            .handle(Request::Correlate {
                trigger_timestamp: trigger,
            })
            .await)
        else {
            panic!("{backend}: expected a correlation");
        };
        assert_eq!(found.source_log_id, log.id, "{backend}");
        assert_eq!(found.coordinate.latitude, 37.1);
        assert_eq!(found.coordinate.altitude, Some(42.0));
        assert_eq!(found.coordinate.timestamp, trigger + 2000);

        let resp = station
            .handle(Request::Correlate {
                trigger_timestamp: trigger + 60_000,
            })
            .await;
        assert_eq!(err_kind(resp), ErrorKind::NoMatchingLog, "{backend}");
    }
}

#[tokio::test]
async fn battery_average_skips_missing_readings() {
    for (backend, station, _dir) in stations().await {
        let now = now_ms();
        for (i, battery) in [Some(80.0), None, Some(60.0)].into_iter().enumerate() {
            let input = NewTelemetry {
                battery_level: battery,
                timestamp: Some(now - 3000 + i as u64 * 1000),
                ..NewTelemetry::at("drone_01", 37.0, -122.0, 50.0)
            };
            ok(station.handle(Request::IngestTelemetry(input)).await);
        }

        let Reply::TelemetryStats(stats) = ok(station
            .handle(Request::TelemetryStats {
                drone_id: "drone_01".into(),
                hours: Some(1.0),
            })
            .await)
        else {
            panic!("{backend}: expected stats");
        };
        assert_eq!(stats.data_points, 3, "{backend}");
        assert_eq!(stats.average_battery_level, Some(70.0), "{backend}");
        assert_eq!(stats.min_battery_level, Some(60.0));

        let resp = station
            .handle(Request::TelemetryStats {
                drone_id: "drone_02".into(),
                hours: None,
            })
            .await;
        assert_eq!(err_kind(resp), ErrorKind::NotFound, "{backend}");
    }
}

#[tokio::test]
async fn redb_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("restart.redb");

    let id = {
        let station = GroundStation::new(Store::open(&path).unwrap(), &QueryConfig::default());
        let Reply::Coordinate(c) = ok(station
            .handle(Request::RecordCoordinate(NewCoordinate::at(10.0, 20.0)))
            .await)
        else {
            panic!("expected a coordinate");
        };
        ok(station.handle(Request::MarkVisited { id: c.id }).await);
        c.id
    };

    let station = GroundStation::new(Store::open(&path).unwrap(), &QueryConfig::default());
    let Reply::Coordinates(pending) = ok(station.handle(Request::ListPending).await) else {
        panic!("expected coordinates");
    };
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
}
