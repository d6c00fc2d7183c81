//! Mode switching through the engine: gates, events and parameter-driven requests.

mod helpers;

use helpers::*;
use std::time::{Duration, Instant};
use voxtune::mode::SWITCH_COOLDOWN;
use voxtune::prelude::*;
use voxtune::{ModeError, ModeEvent, ModeSelector, ModeTransition};

fn silent_block() -> Vec<f32> {
    generate_silence(TEST_BLOCK_SIZE)
}

#[test]
fn test_parameter_mode_change_switches_engine() {
    init_tracing();
    let mut engine = test_engine(Mode::Classic);
    let events = engine.subscribe(8);

    let mut block = silent_block();
    let report = engine.process_block(&mut [&mut block[..]], &ParameterSet::for_mode(Mode::Hard));

    assert_eq!(report.mode, Mode::Hard);
    assert_eq!(
        report.transition,
        Some(ModeTransition {
            from: Mode::Classic,
            to: Mode::Hard
        })
    );
    assert_eq!(
        events.try_recv().unwrap(),
        ModeEvent::Changed {
            from: Mode::Classic,
            to: Mode::Hard
        }
    );
    assert_eq!(engine.mode(), Mode::Hard);
}

#[test]
fn test_ai_rejected_under_cpu_load() {
    let mut engine = test_engine(Mode::Classic);
    engine
        .mode_selector_mut()
        .update_performance_metrics(80.0, 1.0, 0.9);
    let events = engine.subscribe(8);

    let params = ParameterSet::for_mode(Mode::Ai);
    let mut block = silent_block();
    let report = engine.process_block(&mut [&mut block[..]], &params);

    assert_eq!(report.mode, Mode::Classic);
    assert!(matches!(
        report.mode_error,
        Some(ModeError::CpuTooHigh { mode: Mode::Ai, .. })
    ));
    assert!(matches!(
        events.try_recv().unwrap(),
        ModeEvent::Rejected {
            requested: Mode::Ai,
            ..
        }
    ));

    // The same request is not retried on later blocks
    let report = engine.process_block(&mut [&mut block[..]], &params);
    assert_eq!(report.mode_error, None);
    assert_eq!(report.mode, Mode::Classic);
    assert!(events.try_recv().is_err());
}

#[test]
fn test_hard_rejected_over_latency_budget() {
    let mut engine = test_engine(Mode::Classic);
    engine
        .mode_selector_mut()
        .update_performance_metrics(10.0, 25.0, 0.9);

    let mut block = silent_block();
    let report = engine.process_block(&mut [&mut block[..]], &ParameterSet::for_mode(Mode::Hard));

    assert_eq!(report.mode, Mode::Classic);
    assert!(matches!(
        report.mode_error,
        Some(ModeError::LatencyTooHigh { mode: Mode::Hard, latency_ms }) if latency_ms == 25.0
    ));

    // Classic has no resource gate
    assert!(engine.mode_selector().can_switch_to_mode(Mode::Classic).is_ok());
}

#[test]
fn test_cooldown_between_switches() {
    let mut selector = ModeSelector::new();
    let t0 = Instant::now();

    selector.switch_to_mode_at(Mode::Hard, t0).unwrap();
    let early = selector.switch_to_mode_at(Mode::Ai, t0 + Duration::from_millis(40));
    match early {
        Err(ModeError::Cooldown { remaining }) => {
            assert_eq!(remaining, SWITCH_COOLDOWN - Duration::from_millis(40))
        }
        other => panic!("expected cooldown, got {:?}", other),
    }
    assert_eq!(selector.current_mode(), Mode::Hard);

    let later = selector
        .switch_to_mode_at(Mode::Ai, t0 + SWITCH_COOLDOWN)
        .unwrap();
    assert_eq!(later.map(|t| t.to), Some(Mode::Ai));
}

#[test]
fn test_engine_feeds_performance_metrics() {
    let mut engine = test_engine(Mode::Classic);
    let mut signal = generate_sine(440.0, TEST_SAMPLE_RATE, TEST_BLOCK_SIZE * 8);
    let reports = process_signal(&mut engine, &mut signal, &ParameterSet::default());

    let metrics = engine.mode_selector().metrics();
    assert!(metrics.latency_ms >= 0.0);
    assert!(metrics.accuracy > 0.0);
    assert_eq!(reports.last().unwrap().cpu_percent, engine.cpu_meter().average_percent());
}

#[test]
fn test_quality_change_applies_next_block() {
    let mut engine = test_engine(Mode::Hard);
    engine.set_quality(QualityLevel::Draft);

    let params = engine.mode_selector().processing_params();
    assert_eq!(params.window_size, 512);
    assert_eq!(params.hop_size, 128);
    assert!(!params.enable_formant_correction);

    let mut block = silent_block();
    let report = engine.process_block(&mut [&mut block[..]], &ParameterSet::for_mode(Mode::Hard));
    assert_eq!(report.mode, Mode::Hard);
    assert!(report.transition.is_none());
}
