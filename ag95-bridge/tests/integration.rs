//! Integration tests for the gripper bridge against the simulated device.

use ag95_bridge::registers::{GripState, Register};
use ag95_bridge::sim::{SimulatedConnector, SimulatedGripper};
use ag95_bridge::{
    FAULT_SENTINEL, Gripper, LinkManager, LinkSettings, LinkStatus, RoutineSettings,
};
use std::sync::Arc;
use std::time::Duration;

fn gripper(sim: &SimulatedGripper) -> Gripper<SimulatedConnector> {
    Gripper::new(LinkManager::new(
        sim.connector(),
        LinkSettings {
            warmup_delay: Duration::ZERO,
        },
    ))
    .with_routine_settings(RoutineSettings {
        poll_interval: Duration::from_millis(1),
        init_attempts: 5,
        motion_attempts: 5,
    })
}

const FORCE: u16 = Register::GripperForce.address();
const POSITION: u16 = Register::GripperPosition.address();
const IO_MODE: u16 = Register::IoModeSwitch.address();

#[tokio::test]
async fn test_force_is_clamped_before_the_wire() {
    let sim = SimulatedGripper::new();
    let gripper = gripper(&sim);

    for force in [5, 150, 55, -3, 20, 100] {
        assert!(gripper.set_force(force).await, "set_force({})", force);
    }

    assert_eq!(sim.writes_to(FORCE), vec![20, 100, 55, 20, 20, 100]);
}

#[tokio::test]
async fn test_position_is_clamped_before_the_wire() {
    let sim = SimulatedGripper::new();
    let gripper = gripper(&sim);

    for position in [-10, 2000, 500, 0, 1000] {
        assert!(gripper.set_position(position).await);
    }

    assert_eq!(sim.writes_to(POSITION), vec![0, 1000, 500, 0, 1000]);
}

#[tokio::test]
async fn test_connect_twice_warms_up_once() {
    let sim = SimulatedGripper::new();
    let gripper = gripper(&sim);

    assert!(gripper.connect().await);
    assert!(gripper.connect().await);

    assert_eq!(sim.opens(), 1);
    assert_eq!(sim.writes_to(IO_MODE), vec![0]);
}

#[tokio::test]
async fn test_reconnect_after_fault_happens_once() {
    let sim = SimulatedGripper::new();
    let gripper = gripper(&sim);
    assert!(gripper.connect().await);

    // One corrupted response: the command does not land and is not retried.
    sim.fail_next_transactions(1);
    assert!(!gripper.set_position(300).await);
    assert!(sim.writes_to(POSITION).is_empty());
    assert_eq!(gripper.link().status().await, LinkStatus::Disconnected);

    // The caller retries; the link is reopened exactly once.
    assert!(gripper.set_position(300).await);
    assert!(gripper.set_force(40).await);
    assert_eq!(sim.opens(), 2);
    assert_eq!(sim.writes_to(IO_MODE).len(), 2);
    assert_eq!(sim.writes_to(POSITION), vec![300]);
}

#[tokio::test]
async fn test_polling_a_dead_link_logs_once() {
    let sim = SimulatedGripper::new();
    let gripper = gripper(&sim);
    sim.set_offline(true);

    for _ in 0..10 {
        assert_eq!(gripper.get_grip_status().await, FAULT_SENTINEL);
    }

    let stats = gripper.link().stats().await;
    assert_eq!(stats.read_faults, 10);
    assert_eq!(stats.logged_read_faults, 1);
    assert_eq!(stats.failed_connects, 10);
}

#[tokio::test]
async fn test_reads_return_sentinel_on_fault() {
    let sim = SimulatedGripper::new();
    let gripper = gripper(&sim);

    sim.fail_next_transactions(2);
    // Warm-up of the lazy connect consumes the first failure.
    assert_eq!(gripper.get_actual_position().await, FAULT_SENTINEL);
    assert_eq!(gripper.get_actual_position().await, FAULT_SENTINEL);
    assert_eq!(gripper.get_actual_position().await, 0);
}

#[tokio::test]
async fn test_init_values() {
    let sim = SimulatedGripper::new();
    let gripper = gripper(&sim);

    assert!(gripper.init(true).await);
    assert!(gripper.init(false).await);
    assert_eq!(
        sim.writes_to(Register::Initialize.address()),
        vec![0xA5, 0x01]
    );

    sim.set_offline(true);
    assert!(!gripper.init(true).await);
}

#[tokio::test]
async fn test_is_init_only_for_exactly_one() {
    let sim = SimulatedGripper::new();
    let gripper = gripper(&sim);
    let init_state = Register::InitState.address();

    assert!(!gripper.is_init().await);

    sim.set_register(init_state, 1);
    assert!(gripper.is_init().await);

    sim.set_register(init_state, 2);
    assert!(!gripper.is_init().await);

    sim.set_register(init_state, 1);
    sim.set_offline(true);
    assert!(!gripper.is_init().await);
}

#[tokio::test]
async fn test_grip_status_codes() {
    let sim = SimulatedGripper::new();
    let gripper = gripper(&sim);
    sim.set_register(Register::ActualGripperPosition.address(), 1000);
    sim.set_object_position(Some(420));

    assert!(gripper.set_position(0).await);
    assert_eq!(gripper.get_grip_status().await, GripState::Caught as i32);
    assert_eq!(gripper.get_actual_position().await, 420);

    sim.set_object_position(None);
    assert!(gripper.set_position(1000).await);
    assert_eq!(gripper.get_grip_status().await, GripState::Arrived as i32);
}

#[tokio::test]
async fn test_open_and_close_routines() {
    let sim = SimulatedGripper::new();
    sim.set_motion_polls(2);
    let gripper = gripper(&sim);

    assert!(gripper.close(30, 0, true).await);
    assert_eq!(sim.register(Register::InitState.address()), Some(1));
    assert_eq!(sim.writes_to(FORCE), vec![30]);
    assert_eq!(gripper.get_actual_position().await, 0);

    assert!(gripper.open(100, 1000, false).await);
    assert_eq!(gripper.get_actual_position().await, 1000);
}

#[tokio::test]
async fn test_close_fails_when_link_is_down() {
    let sim = SimulatedGripper::new();
    sim.set_offline(true);
    let gripper = gripper(&sim);

    assert!(!gripper.close(20, 0, true).await);
    assert!(sim.writes().is_empty());
}

#[tokio::test]
async fn test_toggle() {
    let sim = SimulatedGripper::new();
    let gripper = gripper(&sim);

    // Initialization opens the fingers, so the first toggle closes them.
    assert!(gripper.toggle().await);
    assert_eq!(gripper.get_actual_position().await, 0);

    assert!(gripper.toggle().await);
    assert_eq!(gripper.get_actual_position().await, 1000);
}

#[tokio::test]
async fn test_link_recovers_after_unplug() {
    let sim = SimulatedGripper::new();
    let gripper = gripper(&sim);
    assert!(gripper.set_force(50).await);

    sim.set_offline(true);
    assert!(!gripper.set_force(60).await);
    assert_eq!(gripper.get_grip_status().await, FAULT_SENTINEL);

    sim.set_offline(false);
    assert!(gripper.set_force(70).await);
    assert_eq!(sim.writes_to(FORCE), vec![50, 70]);
    assert_eq!(gripper.link().stats().await.connects, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_link() {
    let sim = SimulatedGripper::new();
    let gripper = Arc::new(gripper(&sim));

    let mut tasks = Vec::new();
    for i in 0..20i64 {
        let gripper = gripper.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                gripper.set_position(i * 50).await
            } else {
                gripper.get_grip_status().await >= 0
            }
        }));
    }

    for task in tasks {
        assert!(task.await.unwrap());
    }

    assert_eq!(sim.opens(), 1);
    assert_eq!(sim.writes_to(POSITION).len(), 10);
}
