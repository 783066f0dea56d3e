//! Stage behaviour: jog edge detection over arbitrary press sequences, the
//! fixed-rate poll, emergency stop and start/goal stepping.

use async_trait::async_trait;
use lab_panel::config::StageConfig;
use lab_panel::hardware::mock::{SimulatedStage, StageCall};
use lab_panel::hardware::{DriverResult, PulseVector, SharedStage, StageDriver};
use lab_panel::panel::StagePanel;
use lab_panel::stage::{
    Direction, DirectionVector, JogCommand, StageJogController, DIRECTION_COUNT,
};
use lab_panel::status::StatusBoard;
use lab_panel::DaqError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

/// xorshift64, enough to vary press patterns between runs of the same seed.
struct PressPattern(u64);

impl PressPattern {
    fn next_frame(&mut self) -> [bool; DIRECTION_COUNT] {
        let mut frame = [false; DIRECTION_COUNT];
        for pressed in &mut frame {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            *pressed = self.0 % 3 == 0;
        }
        frame
    }
}

/// Stage whose position readback panics, taking the poll task down with it.
struct PanickingStage {
    inner: SimulatedStage,
}

#[async_trait]
impl StageDriver for PanickingStage {
    async fn jog_start(&mut self, direction: DirectionVector) -> DriverResult<()> {
        self.inner.jog_start(direction).await
    }

    async fn jog_stop(&mut self, axes: DirectionVector) -> DriverResult<()> {
        self.inner.jog_stop(axes).await
    }

    async fn emergency_stop(&mut self) -> DriverResult<()> {
        self.inner.emergency_stop().await
    }

    async fn move_linear(&mut self, target: PulseVector) -> DriverResult<()> {
        self.inner.move_linear(target).await
    }

    async fn get_position(&mut self) -> DriverResult<PulseVector> {
        panic!("position readback garbled");
    }
}

fn stage_panel(
    stage: SimulatedStage,
    config: &StageConfig,
) -> (StagePanel, StatusBoard, watch::Sender<bool>) {
    let status = StatusBoard::new();
    let (tx, rx) = watch::channel(false);
    let shared: SharedStage = Arc::new(Mutex::new(stage));
    let panel = StagePanel::new(shared, config, status.clone(), rx).unwrap();
    (panel, status, tx)
}

#[tokio::test]
async fn test_commands_match_edges_for_any_press_sequence() {
    for seed in [1_u64, 7, 42, 1234, 0xDEAD_BEEF] {
        let stage = SimulatedStage::new();
        let log = stage.call_log();
        let mut jog = StageJogController::new(Arc::new(Mutex::new(stage)));
        let mut pattern = PressPattern(seed);

        let mut previous = [false; DIRECTION_COUNT];
        let mut rising = [0_usize; DIRECTION_COUNT];
        let mut falling = [0_usize; DIRECTION_COUNT];
        let mut history: Vec<Vec<JogCommand>> = vec![Vec::new(); DIRECTION_COUNT];

        for _ in 0..200 {
            let frame = pattern.next_frame();
            for i in 0..DIRECTION_COUNT {
                match (previous[i], frame[i]) {
                    (false, true) => rising[i] += 1,
                    (true, false) => falling[i] += 1,
                    _ => {}
                }
            }
            previous = frame;

            for command in jog.tick(frame).await.unwrap() {
                let (JogCommand::Start(d) | JogCommand::Stop(d)) = command;
                history[d.index()].push(command);
            }
        }

        for direction in Direction::ALL {
            let i = direction.index();
            let commands = &history[i];
            let starts = commands
                .iter()
                .filter(|c| matches!(c, JogCommand::Start(_)))
                .count();
            assert_eq!(starts, rising[i], "{direction} starts, seed {seed}");
            assert_eq!(commands.len() - starts, falling[i], "{direction} stops, seed {seed}");

            // Strict alternation, beginning with a start.
            for (n, command) in commands.iter().enumerate() {
                let expected = if n % 2 == 0 {
                    JogCommand::Start(direction)
                } else {
                    JogCommand::Stop(direction)
                };
                assert_eq!(*command, expected, "{direction} command {n}, seed {seed}");
            }
        }

        let total_rising: usize = rising.iter().sum();
        let total_falling: usize = falling.iter().sum();
        assert_eq!(
            log.count(|c| matches!(c, StageCall::JogStart(_))),
            total_rising
        );
        assert_eq!(
            log.count(|c| matches!(c, StageCall::JogStop(_))),
            total_falling
        );
    }
}

#[tokio::test]
async fn test_held_button_starts_once_and_stops_on_release() {
    let stage = SimulatedStage::new();
    let log = stage.call_log();
    let mut jog = StageJogController::new(Arc::new(Mutex::new(stage)));

    let mut frame = [false; DIRECTION_COUNT];
    frame[Direction::Up.index()] = true;
    for _ in 0..10 {
        jog.tick(frame).await.unwrap();
    }
    assert_eq!(jog.held(), vec![Direction::Up]);

    jog.tick([false; DIRECTION_COUNT]).await.unwrap();
    assert_eq!(
        log.calls(),
        vec![
            StageCall::JogStart(Direction::Up.vector()),
            StageCall::JogStop(Direction::Up.vector().magnitude()),
        ]
    );
    assert!(jog.held().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_poll_jogs_and_tracks_position() {
    let stage = SimulatedStage::new().with_jog_speed(100);
    let log = stage.call_log();
    let (mut panel, status, tx) = stage_panel(stage, &StageConfig::default());
    let buttons = panel.buttons();

    buttons.press(Direction::East);
    // Ticks at 0, 100, 200 and 300 ms.
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(log.count(|c| matches!(c, StageCall::JogStart(_))), 1);
    let (_, current, _) = panel.positions().await;
    assert!((current.x - 4.0).abs() < 1e-9, "x = {}", current.x);
    assert_eq!(status.snapshot().current, current);

    buttons.release(Direction::East);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        log.count(|c| *c == StageCall::JogStop(Direction::East.vector().magnitude())),
        1
    );

    tx.send_replace(true);
    panel.shutdown().await.unwrap();
    assert!(!panel.is_polling());
    assert_eq!(log.calls().last(), Some(&StageCall::EmergencyStop));
}

#[tokio::test(start_paused = true)]
async fn test_emergency_stop_mid_jog_is_immediate() {
    let stage = SimulatedStage::new();
    let log = stage.call_log();
    let (panel, status, _tx) = stage_panel(stage, &StageConfig::default());

    panel.buttons().press(Direction::North);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        log.count(|c| *c == StageCall::JogStart(Direction::North.vector())),
        1
    );

    let before = Instant::now();
    panel.emergency_stop().await.unwrap();
    assert_eq!(Instant::now(), before);
    assert_eq!(log.calls().last(), Some(&StageCall::EmergencyStop));
    assert_eq!(status.snapshot().message, "emergency stop");
}

#[tokio::test(start_paused = true)]
async fn test_emergency_stop_waits_only_for_command_in_flight() {
    let latency = Duration::from_millis(30);
    let stage = SimulatedStage::new().with_command_latency(latency);
    let log = stage.call_log();
    let (panel, _status, _tx) = stage_panel(stage, &StageConfig::default());
    let estop = panel.emergency_stop_handle();

    panel.buttons().press(Direction::SouthWest);
    // Tick at 100 ms: the position read is in flight from 100 to 130 ms.
    tokio::time::sleep(Duration::from_millis(110)).await;

    let before = Instant::now();
    estop.trigger().await.unwrap();
    let waited = Instant::now() - before;

    assert!(waited <= latency * 2, "waited {waited:?}");
    assert!(log.calls().contains(&StageCall::EmergencyStop));
}

#[tokio::test(start_paused = true)]
async fn test_failed_jog_is_reported_and_polling_continues() {
    let stage = SimulatedStage::new();
    let log = stage.call_log();
    let faults = stage.fault_switch();
    let (panel, status, _tx) = stage_panel(stage, &StageConfig::default());

    faults.fail_next(1);
    panel.buttons().press(Direction::West);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(status.snapshot().message.starts_with("stage error"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(panel.is_polling());
    // Not retried while the button stays down.
    assert_eq!(log.count(|c| matches!(c, StageCall::JogStart(_))), 1);
    assert!(log.count(|c| *c == StageCall::GetPosition) >= 5);
}

#[tokio::test(start_paused = true)]
async fn test_start_goal_and_steps() {
    let stage = SimulatedStage::with_position([1_000, 0, 0]);
    let log = stage.call_log();
    let (panel, status, _tx) = stage_panel(stage, &StageConfig::default());

    tokio::time::sleep(Duration::from_millis(10)).await;
    let start = panel.set_start().await;
    assert!((start.x - 10.0).abs() < 1e-9);
    assert_eq!(status.snapshot().start, start);

    panel.move_to_input("30", " 20 ", "-5").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let goal = panel.set_goal().await;
    assert!((goal.x - 30.0).abs() < 1e-9);
    assert!((goal.z + 5.0).abs() < 1e-9);

    assert_eq!(panel.step(1, 2).await.unwrap(), [2_000, 1_000, -250]);
    assert_eq!(panel.move_to_start().await.unwrap(), [1_000, 0, 0]);
    assert_eq!(panel.move_to_goal().await.unwrap(), [3_000, 2_000, -500]);
    assert!(log.calls().contains(&StageCall::MoveLinear([2_000, 1_000, -250])));

    assert!(matches!(
        panel.step(3, 2).await,
        Err(DaqError::InvalidInput(_))
    ));
    assert!(matches!(
        panel.step(0, 0).await,
        Err(DaqError::InvalidInput(_))
    ));
    assert!(matches!(
        panel.move_to_input("abc", "0", "0").await,
        Err(DaqError::InvalidInput(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_without_stop_leaves_stage_alone() {
    let stage = SimulatedStage::new();
    let log = stage.call_log();
    let config = StageConfig {
        stop_on_shutdown: false,
        ..StageConfig::default()
    };
    let (mut panel, _status, tx) = stage_panel(stage, &config);

    tokio::time::sleep(Duration::from_millis(250)).await;
    tx.send_replace(true);
    panel.shutdown().await.unwrap();

    assert!(!log.calls().contains(&StageCall::EmergencyStop));
    let reads = log.count(|c| *c == StageCall::GetPosition);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(log.count(|c| *c == StageCall::GetPosition), reads);
}

#[tokio::test(start_paused = true)]
async fn test_final_stop_sent_after_poll_task_panics() {
    let inner = SimulatedStage::new();
    let log = inner.call_log();
    let (tx, rx) = watch::channel(false);
    let shared: SharedStage = Arc::new(Mutex::new(PanickingStage { inner }));
    let mut panel =
        StagePanel::new(shared, &StageConfig::default(), StatusBoard::new(), rx).unwrap();

    panel.buttons().press(Direction::North);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!panel.is_polling());
    assert_eq!(log.calls(), vec![StageCall::JogStart(Direction::North.vector())]);

    tx.send_replace(true);
    assert!(matches!(panel.shutdown().await, Err(DaqError::TaskJoin(_))));
    assert_eq!(log.calls().last(), Some(&StageCall::EmergencyStop));
}
