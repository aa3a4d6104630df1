use super::*;
use crate::audio::context::OfflineContext;
use crate::audio::voice::ClickVoice;

const SAMPLE_RATE: u32 = 48000;

fn times(clicks: &[ClickSchedule]) -> Vec<f64> {
    clicks.iter().map(|c| c.at_ms).collect()
}

fn tempo(bpm: f64) -> Tempo {
    Tempo::new(bpm).unwrap()
}

fn scheduler() -> LookaheadScheduler {
    LookaheadScheduler::new(&AppConfig::default())
}

/// Frames where a click starts sounding (first non-zero sample after silence)
fn onsets(samples: &[f32]) -> Vec<usize> {
    let mut found = Vec::new();
    let mut last_sound: Option<usize> = None;
    for (i, &s) in samples.iter().enumerate() {
        if s != 0.0 {
            if last_sound.map_or(true, |prev| i - prev > 480) {
                found.push(i);
            }
            last_sound = Some(i);
        }
    }
    found
}

struct RefusingContext;

impl AudioContext for RefusingContext {
    fn current_time_ms(&self) -> f64 {
        0.0
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn connect(&self, _voice: ClickVoice) -> Result<(), MetronomeError> {
        Err(MetronomeError::StreamFailure {
            reason: "refused".to_string(),
        })
    }
}

#[test]
fn test_plan_at_60_bpm() {
    let plan = plan_clicks(0.0, 0.0, 1000.0, 1024.0);
    assert_eq!(plan.offset_ms, 0.0);
    assert_eq!(times(&plan.clicks), vec![1000.0, 2000.0]);

    let plan = plan_clicks(1024.0, 0.0, 1000.0, 1024.0);
    assert_eq!(plan.offset_ms, 24.0);
    assert_eq!(times(&plan.clicks), vec![2000.0, 3000.0]);
}

#[test]
fn test_plan_at_240_bpm_fills_window() {
    let plan = plan_clicks(0.0, 0.0, 250.0, 1024.0);
    assert_eq!(
        times(&plan.clicks),
        vec![250.0, 500.0, 750.0, 1000.0, 1250.0]
    );
}

#[test]
fn test_plan_skips_window_without_boundary() {
    // 30 BPM: the beat interval is longer than the window
    let plan = plan_clicks(0.0, 0.0, 2000.0, 1024.0);
    assert!(plan.clicks.is_empty());

    let plan = plan_clicks(1024.0, 0.0, 2000.0, 1024.0);
    assert_eq!(times(&plan.clicks), vec![2000.0]);

    let plan = plan_clicks(2048.0, 0.0, 2000.0, 1024.0);
    assert!(plan.clicks.is_empty());
}

#[test]
fn test_plan_respects_origin() {
    let plan = plan_clicks(1124.0, 100.0, 1000.0, 1024.0);
    assert_eq!(plan.offset_ms, 24.0);
    assert_eq!(times(&plan.clicks), vec![2100.0, 3100.0]);
}

#[test]
fn test_start_clicks_now_and_runs_first_pass() {
    let ctx = OfflineContext::new(SAMPLE_RATE);
    let mut sched = scheduler();
    assert!(!sched.is_playing());

    let report = sched.start(&ctx, tempo(60.0)).unwrap().unwrap();
    assert!(sched.is_playing());
    assert_eq!(sched.origin_ms(), Some(0.0));
    assert_eq!(times(&report.scheduled), vec![1000.0, 2000.0]);
    assert_eq!(report.tempo_applied, None);
}

#[test]
fn test_second_start_is_noop() {
    let ctx = OfflineContext::new(SAMPLE_RATE);
    let mut sched = scheduler();
    sched.start(&ctx, tempo(60.0)).unwrap();
    ctx.render_ms(300.0).unwrap();

    assert!(sched.start(&ctx, tempo(200.0)).unwrap().is_none());
    assert_eq!(sched.tempo(), Some(tempo(60.0)));
    assert_eq!(sched.origin_ms(), Some(0.0));
}

#[test]
fn test_pass_without_tempo_fails_fast() {
    let mut sched = scheduler();
    assert_eq!(sched.run_pass(0.0), Err(MetronomeError::TempoUnset));
}

#[test]
fn test_update_and_stop_are_noops_when_stopped() {
    let mut sched = scheduler();
    assert!(!sched.update_tempo(tempo(90.0)).unwrap());
    assert!(!sched.stop());
    assert_eq!(sched.tempo(), None);
}

#[test]
fn test_stop_clears_state() {
    let ctx = OfflineContext::new(SAMPLE_RATE);
    let mut sched = scheduler();
    sched.start(&ctx, tempo(60.0)).unwrap();
    assert!(sched.stop());
    assert!(!sched.is_playing());
    assert_eq!(sched.tempo(), None);
    assert_eq!(sched.origin_ms(), None);
    assert_eq!(sched.run_pass(1024.0), Err(MetronomeError::TempoUnset));
}

#[test]
fn test_failed_connect_leaves_scheduler_stopped() {
    let mut sched = scheduler();
    let err = sched.start(&RefusingContext, tempo(60.0)).unwrap_err();
    assert!(matches!(err, MetronomeError::StreamFailure { .. }));
    assert!(!sched.is_playing());
}

#[test]
fn test_overlapping_passes_do_not_resubmit() {
    let ctx = OfflineContext::new(SAMPLE_RATE);
    let mut sched = scheduler();
    sched.start(&ctx, tempo(60.0)).unwrap();

    let report = sched.run_pass(1024.0).unwrap();
    assert_eq!(times(&report.plan.clicks), vec![2000.0, 3000.0]);
    assert_eq!(times(&report.scheduled), vec![3000.0]);

    let report = sched.run_pass(2048.0).unwrap();
    assert_eq!(times(&report.scheduled), vec![4000.0]);
}

#[test]
fn test_tempo_increase_applies_on_next_pass() {
    let ctx = OfflineContext::new(SAMPLE_RATE);
    let mut sched = scheduler();
    sched.start(&ctx, tempo(60.0)).unwrap();
    sched.run_pass(1024.0).unwrap();
    sched.run_pass(2048.0).unwrap();

    // Issued at 2500ms, picked up by the pass at 3072ms
    assert!(sched.update_tempo(tempo(120.0)).unwrap());

    let report = sched.run_pass(3072.0).unwrap();
    assert_eq!(report.tempo_applied, Some(tempo(120.0)));
    // 4000 was already submitted and stays; the new grid starts from it
    assert_eq!(sched.origin_ms(), Some(4000.0));
    assert_eq!(times(&report.scheduled), vec![4500.0]);

    let report = sched.run_pass(4096.0).unwrap();
    assert_eq!(report.tempo_applied, None);
    assert_eq!(times(&report.scheduled), vec![5000.0, 5500.0]);
}

#[test]
fn test_tempo_decrease_keeps_submitted_clicks() {
    let ctx = OfflineContext::new(SAMPLE_RATE);
    let mut sched = scheduler();
    let first = sched.start(&ctx, tempo(120.0)).unwrap().unwrap();
    assert_eq!(times(&first.scheduled), vec![500.0, 1000.0, 1500.0]);

    let report = sched.run_pass(1024.0).unwrap();
    assert_eq!(times(&report.scheduled), vec![2000.0, 2500.0]);

    sched.update_tempo(tempo(60.0)).unwrap();
    let report = sched.run_pass(2048.0).unwrap();
    assert_eq!(sched.origin_ms(), Some(2500.0));
    assert_eq!(times(&report.scheduled), vec![3500.0]);

    let report = sched.run_pass(3072.0).unwrap();
    assert_eq!(times(&report.scheduled), vec![4500.0]);
}

#[test]
fn test_tempo_change_plays_every_submitted_click() {
    let ctx = OfflineContext::new(SAMPLE_RATE);
    let mut sched = scheduler();
    let render_until = |ms: f64| ctx.render_ms(ms - ctx.current_time_ms()).unwrap();

    sched.start(&ctx, tempo(120.0)).unwrap();
    let mut rendered = render_until(1024.0);
    sched.run_pass(1024.0).unwrap();
    rendered.extend(render_until(1124.0));
    sched.update_tempo(tempo(60.0)).unwrap();
    for pass_ms in [2048.0, 3072.0, 4096.0] {
        rendered.extend(render_until(pass_ms));
        sched.run_pass(pass_ms).unwrap();
    }
    rendered.extend(render_until(5120.0));

    let expected: Vec<usize> = [0.0, 500.0, 1000.0, 1500.0, 2000.0, 2500.0, 3500.0, 4500.0]
        .iter()
        .map(|ms| (ms * 48.0) as usize + 1)
        .collect();
    assert_eq!(onsets(&rendered), expected);
}

#[test]
fn test_rejects_tempo_faster_than_voice_queue() {
    let ctx = OfflineContext::new(SAMPLE_RATE);
    let mut sched = scheduler();

    let err = sched.start(&ctx, tempo(6.0e7)).unwrap_err();
    assert_eq!(err, MetronomeError::TempoInvalid { bpm: 6.0e7 });
    assert!(!sched.is_playing());

    // 255 clicks per 1024ms window is the most a 256-slot queue takes
    assert_eq!(sched.max_clicks_per_pass(), 255);
    assert!(clicks_per_pass(tempo(14_900.0).interval_ms(), 1024.0) <= 255);
    sched.start(&ctx, tempo(60.0)).unwrap();
    assert!(matches!(
        sched.update_tempo(tempo(20_000.0)),
        Err(MetronomeError::TempoInvalid { .. })
    ));
    assert_eq!(sched.tempo(), Some(tempo(60.0)));
    assert!(sched.update_tempo(tempo(14_900.0)).unwrap());
}

#[test]
fn test_rejects_interval_shorter_than_a_frame() {
    let mut config = AppConfig::default();
    config.audio.voice_queue_capacity = 1 << 20;
    let mut sched = LookaheadScheduler::new(&config);
    let ctx = OfflineContext::new(SAMPLE_RATE);

    // One frame at 48kHz is 1/48 ms, i.e. 2.88e6 BPM
    let err = sched.start(&ctx, tempo(3.0e6)).unwrap_err();
    assert!(matches!(err, MetronomeError::TempoInvalid { .. }));
}

#[test]
fn test_out_of_range_window_falls_back_to_default() {
    for lookahead_ms in [0.0, -5.0, f64::NAN, f64::INFINITY, MAX_LOOKAHEAD_MS * 2.0] {
        let mut config = AppConfig::default();
        config.metronome.lookahead_ms = lookahead_ms;
        let sched = LookaheadScheduler::new(&config);
        assert_eq!(sched.window_ms(), DEFAULT_LOOKAHEAD_MS, "{}", lookahead_ms);
    }

    let mut config = AppConfig::default();
    config.metronome.lookahead_ms = 250.0;
    assert_eq!(LookaheadScheduler::new(&config).window_ms(), 250.0);
}

#[test]
fn test_same_tempo_update_does_not_rebase() {
    let ctx = OfflineContext::new(SAMPLE_RATE);
    let mut sched = scheduler();
    sched.start(&ctx, tempo(90.0)).unwrap();
    sched.update_tempo(tempo(90.0)).unwrap();
    let report = sched.run_pass(1024.0).unwrap();
    assert_eq!(report.tempo_applied, None);
    assert_eq!(sched.origin_ms(), Some(0.0));
}

#[test]
fn test_rendered_clicks_are_sample_accurate() {
    let ctx = OfflineContext::new(SAMPLE_RATE);
    let mut sched = scheduler();
    sched.start(&ctx, tempo(120.0)).unwrap();

    let mut rendered = Vec::new();
    for _ in 0..4 {
        rendered.extend(ctx.render_ms(sched.window_ms()).unwrap());
        sched.run_pass(ctx.current_time_ms()).unwrap();
    }

    let found = onsets(&rendered);
    assert!(found.len() >= 8, "expected at least 8 clicks, got {:?}", found);
    // Click at t=0 sounds from frame 1 (the envelope starts at zero gain)
    assert_eq!(found[0], 1);
    for pair in found.windows(2) {
        assert_eq!(pair[1] - pair[0], 24000, "onsets {:?}", found);
    }
}

#[test]
fn test_stop_silences_output() {
    let ctx = OfflineContext::new(SAMPLE_RATE);
    let mut sched = scheduler();
    sched.start(&ctx, tempo(240.0)).unwrap();
    let before = ctx.render_ms(600.0).unwrap();
    assert!(!onsets(&before).is_empty());

    sched.stop();
    let after = ctx.render_ms(3000.0).unwrap();
    assert!(after.iter().all(|&s| s == 0.0));
}

#[test]
fn test_restart_resets_phase() {
    let ctx = OfflineContext::new(SAMPLE_RATE);
    let mut sched = scheduler();
    sched.start(&ctx, tempo(60.0)).unwrap();
    ctx.render_ms(1300.0).unwrap();
    sched.stop();

    let restart_at = ctx.current_time_ms();
    let report = sched.start(&ctx, tempo(60.0)).unwrap().unwrap();
    assert_eq!(sched.origin_ms(), Some(restart_at));
    assert_eq!(
        times(&report.scheduled),
        vec![restart_at + 1000.0, restart_at + 2000.0]
    );
}
