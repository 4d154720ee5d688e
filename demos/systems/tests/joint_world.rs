//! The demo plugins running inside a server.

use std::path::PathBuf;
use std::time::Duration;

use components::{JointPosition, JointVelocity, Pose};
use sim_server::{Server, ServerConfig};

fn unthrottled() -> ServerConfig {
    ServerConfig::new()
        .with_loader(demo_systems::loader())
        .with_update_period(Duration::ZERO)
}

fn joint_position(server: &Server, name: &str) -> Vec<f64> {
    let joint = server.entity_by_name(name, 0).expect("joint exists");
    server
        .runner(0)
        .and_then(|r| r.with_ecm(|ecm| ecm.get_component::<JointPosition>(joint)))
        .map(|p| p.0)
        .unwrap_or_default()
}

#[test]
fn test_demo_scene_loads() {
    let server = Server::new(unthrottled().with_description(demo_systems::demo_scene()));
    assert_eq!(server.world_names(), vec!["joint_demo"]);
    // world, arm, base_link, upper_link, shoulder, wrist, ball
    assert_eq!(server.entity_count(0), Some(7));
    assert_eq!(server.system_count(0), Some(7));
}

#[test]
fn test_joint_state_applied_then_integrated() {
    let server = Server::new(unthrottled().with_description(demo_systems::demo_scene()));
    assert!(server.run(true, 100, false));

    let start = 30f64.to_radians();
    let shoulder = joint_position(&server, "shoulder");
    assert!((shoulder[0] - (start + 0.5 * 0.1)).abs() < 1e-9, "{shoulder:?}");

    let wrist = joint_position(&server, "wrist");
    assert!((wrist[1] + 0.025).abs() < 1e-9, "{wrist:?}");

    let ball = server.entity_by_name("ball", 0).unwrap();
    let z = server
        .runner(0)
        .and_then(|r| r.with_ecm(|ecm| ecm.get_component::<Pose>(ball)))
        .map(|p| p.position.z)
        .unwrap();
    assert!((z - 9.9).abs() < 1e-3);
}

#[test]
fn test_joint_stops_at_limit() {
    let server = Server::new(unthrottled().with_description(demo_systems::demo_scene()));
    assert!(server.run(true, 2000, false));
    assert_eq!(joint_position(&server, "shoulder"), vec![1.0]);
}

#[test]
fn test_reset_restores_commanded_state() {
    let server = Server::new(unthrottled().with_description(demo_systems::demo_scene()));
    assert!(server.run(true, 500, false));
    assert!(server.reset(0));
    assert_eq!(server.iteration_count(0), Some(0));

    assert!(server.run_once(false));
    let shoulder = joint_position(&server, "shoulder");
    assert!((shoulder[0] - (30f64.to_radians() + 0.0005)).abs() < 1e-9);

    let joint = server.entity_by_name("shoulder", 0).unwrap();
    let velocity = server
        .runner(0)
        .and_then(|r| r.with_ecm(|ecm| ecm.get_component::<JointVelocity>(joint)));
    assert_eq!(velocity, Some(JointVelocity(vec![0.5])));
}

#[test]
fn test_world_file_matches_builtin_scene() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("worlds/joint_demo.json");
    let server = Server::new(unthrottled().with_file(path.to_string_lossy()));
    assert_eq!(server.world_names(), vec!["joint_demo"]);
    assert_eq!(server.entity_count(0), Some(7));
    assert_eq!(server.system_count(0), Some(7));
}
