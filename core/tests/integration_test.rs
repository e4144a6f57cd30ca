// End-to-end tests: plan -> synthesized audio -> sliding-window analysis -> decode.
//
// Each rendered chime is ~2.4 s of audio analyzed every 10 ms with a
// 4096-point FFT; run with --release if the suite feels slow.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chimeshare_core::{
    build_plan, BufferSink, ChannelSink, ChannelSource, ChimeError, Listener, MemorySource, Peak,
    Phase, Progress, Receiver, ReceiverConfig, SamplingStrategy, ShareCode, ToneEvent,
    Transmitter, DEFAULT_HOP_SAMPLES, FFT_SIZE, NOISE_GATE, SAMPLE_RATE,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn render(code: &str, sample_rate: u32) -> Vec<f32> {
    let plan = build_plan(code).expect("valid code");
    let mut sink = BufferSink::new(sample_rate);
    Transmitter::new()
        .play(&plan, &mut sink)
        .expect("Failed to render plan");
    sink.into_samples()
}

fn pad(samples: &[f32], lead: usize, trail: usize) -> Vec<f32> {
    let mut out = vec![0.0; lead];
    out.extend_from_slice(samples);
    out.extend(std::iter::repeat(0.0).take(trail));
    out
}

fn decode_with(samples: &[f32], sample_rate: u32, config: ReceiverConfig) -> Result<Progress, ChimeError> {
    let hop = sample_rate as usize / 100;
    let mut listener = Listener::new(config);
    listener.start_listening(MemorySource::new(samples, sample_rate, FFT_SIZE, hop))?;
    listener.poll_available()
}

fn decode(samples: &[f32], sample_rate: u32) -> Result<Progress, ChimeError> {
    decode_with(samples, sample_rate, ReceiverConfig::default())
}

fn decoded(code: &str) -> Progress {
    Progress::Decoded(ShareCode::parse(code).unwrap())
}

#[test]
fn test_reference_code_round_trip() {
    init_logging();
    let samples = pad(&render("DS-3F9KQ2", SAMPLE_RATE), 24000, 24000);
    assert_eq!(decode(&samples, SAMPLE_RATE).unwrap(), decoded("DS-3F9KQ2"));
}

#[test]
fn test_round_trip_various_codes() {
    for code in ["DS-0Z1Y2X", "DS-ABCDEF", "DS-987654", "DS-Q1W2E3", "DS-0A0A0A"] {
        let samples = pad(&render(code, SAMPLE_RATE), 12345, 20000);
        assert_eq!(
            decode(&samples, SAMPLE_RATE).unwrap(),
            decoded(code),
            "Round trip failed for {}",
            code
        );
    }
}

#[test]
fn test_round_trip_adjacent_band_symbols() {
    // Neighbouring symbols are only 20 Hz apart
    let samples = pad(&render("DS-010101", SAMPLE_RATE), 4800, 4800);
    assert_eq!(decode(&samples, SAMPLE_RATE).unwrap(), decoded("DS-010101"));
}

#[test]
fn test_round_trip_at_44100() {
    let samples = pad(&render("DS-K3Y5Z7", 44100), 10000, 10000);
    assert_eq!(decode(&samples, 44100).unwrap(), decoded("DS-K3Y5Z7"));
}

#[test]
fn test_round_trip_lowercase_input() {
    let samples = pad(&render("ds-abcdef", SAMPLE_RATE), 4800, 4800);
    assert_eq!(decode(&samples, SAMPLE_RATE).unwrap(), decoded("DS-ABCDEF"));
}

#[test]
fn test_round_trip_with_noise() {
    let mut rng = StdRng::seed_from_u64(54321);
    // Quiet enough that pure-noise frames stay under the gate
    let noise = Normal::new(0.0f32, 0.003).unwrap();

    let mut samples = pad(&render("DS-N0I5E1", SAMPLE_RATE), 24000, 24000);
    for sample in samples.iter_mut() {
        *sample += noise.sample(&mut rng);
    }

    assert_eq!(decode(&samples, SAMPLE_RATE).unwrap(), decoded("DS-N0I5E1"));
}

#[test]
fn test_round_trip_with_attenuation() {
    let samples: Vec<f32> = pad(&render("DS-QUIET1", SAMPLE_RATE), 4800, 4800)
        .into_iter()
        .map(|s| s * 0.5)
        .collect();
    assert_eq!(decode(&samples, SAMPLE_RATE).unwrap(), decoded("DS-QUIET1"));
}

#[test]
fn test_repeated_symbols_need_slot_timing() {
    let samples = pad(&render("DS-AAB111", SAMPLE_RATE), 24000, 24000);

    let result = decode(&samples, SAMPLE_RATE);
    assert!(
        matches!(result, Err(ChimeError::IncompleteDecode { .. })),
        "Expected incomplete decode, got {:?}",
        result
    );

    let slot_timed = ReceiverConfig {
        sampling: SamplingStrategy::SlotTimed,
        ..Default::default()
    };
    assert_eq!(
        decode_with(&samples, SAMPLE_RATE, slot_timed).unwrap(),
        decoded("DS-AAB111")
    );
}

#[test]
fn test_slot_timing_decodes_distinct_symbols_too() {
    let samples = pad(&render("DS-3F9KQ2", SAMPLE_RATE), 7000, 7000);
    let slot_timed = ReceiverConfig {
        sampling: SamplingStrategy::SlotTimed,
        ..Default::default()
    };
    assert_eq!(
        decode_with(&samples, SAMPLE_RATE, slot_timed).unwrap(),
        decoded("DS-3F9KQ2")
    );
}

#[test]
fn test_truncated_transmission_reports_incomplete() {
    // Drop the audio of symbols 3..6 but keep the end marker
    let plan = build_plan("DS-3F9KQ2").unwrap();
    let mut sink = BufferSink::new(SAMPLE_RATE);
    let mut short = plan.clone();
    short.events.drain(8..14);
    Transmitter::new().play(&short, &mut sink).unwrap();

    let samples = pad(sink.samples(), 4800, 4800);
    let result = decode(&samples, SAMPLE_RATE);
    assert!(matches!(result, Err(ChimeError::IncompleteDecode { received: 3 })));
}

#[test]
fn test_missing_end_marker_runs_out_of_input() {
    let mut plan = build_plan("DS-3F9KQ2").unwrap();
    plan.events.pop();
    let mut sink = BufferSink::new(SAMPLE_RATE);
    Transmitter::new().play(&plan, &mut sink).unwrap();

    let samples = pad(sink.samples(), 4800, 4800);
    assert_eq!(decode(&samples, SAMPLE_RATE).unwrap(), Progress::SourceEnded);
}

#[test]
fn test_start_timeout_on_silence() {
    let samples = vec![0.0; SAMPLE_RATE as usize * 3];
    let config = ReceiverConfig {
        start_timeout: Some(Duration::from_secs(1)),
        ..Default::default()
    };
    assert!(matches!(
        decode_with(&samples, SAMPLE_RATE, config),
        Err(ChimeError::Timeout)
    ));
}

#[test]
fn test_back_to_back_sessions() {
    let first = pad(&render("DS-F1R5T0", SAMPLE_RATE), 4800, 4800);
    let second = pad(&render("DS-5EC0ND", SAMPLE_RATE), 4800, 4800);

    let mut listener = Listener::default();
    listener
        .start_listening(MemorySource::new(&first, SAMPLE_RATE, FFT_SIZE, DEFAULT_HOP_SAMPLES))
        .unwrap();
    assert_eq!(listener.poll_available().unwrap(), decoded("DS-F1R5T0"));
    assert_eq!(listener.phase(), Phase::Idle);

    listener
        .start_listening(MemorySource::new(&second, SAMPLE_RATE, FFT_SIZE, DEFAULT_HOP_SAMPLES))
        .unwrap();
    assert_eq!(listener.phase(), Phase::AwaitingStart);
    assert_eq!(listener.poll_available().unwrap(), decoded("DS-5EC0ND"));
}

#[test]
fn test_threaded_loopback() {
    init_logging();
    let (sender, receiver) = mpsc::channel();
    let plan = build_plan("DS-L00PBK").unwrap();

    let transmit = thread::spawn(move || {
        let mut sink = ChannelSink::new(SAMPLE_RATE, sender.clone());
        // Lead-in so the analysis window starts on silence
        sender.send(vec![0.0; 4800]).unwrap();
        let outcome = Transmitter::new().play(&plan, &mut sink);
        // The listener may already have hung up after the end marker
        let _ = sender.send(vec![0.0; 4800]);
        outcome
    });

    let mut listener = Listener::default();
    listener
        .start_listening(ChannelSource::new(receiver, SAMPLE_RATE, FFT_SIZE, DEFAULT_HOP_SAMPLES))
        .unwrap();

    let result = loop {
        match listener.poll_available() {
            Ok(Progress::Waiting) => thread::sleep(Duration::from_millis(1)),
            other => break other,
        }
    };

    transmit.join().unwrap().unwrap();
    // "L00PBK" repeats 0 back to back, which deduplication cannot recover
    assert!(matches!(result, Err(ChimeError::IncompleteDecode { received: 5 })));
    assert!(!listener.is_listening());
}

#[test]
fn test_threaded_loopback_slot_timed() {
    let (sender, receiver) = mpsc::channel();
    let plan = build_plan("DS-L00PBK").unwrap();

    let transmit = thread::spawn(move || {
        sender.send(vec![0.0; 4800]).unwrap();
        let mut sink = ChannelSink::new(SAMPLE_RATE, sender);
        Transmitter::new().play(&plan, &mut sink)
    });

    let mut listener = Listener::new(ReceiverConfig {
        sampling: SamplingStrategy::SlotTimed,
        ..Default::default()
    });
    listener
        .start_listening(ChannelSource::new(receiver, SAMPLE_RATE, FFT_SIZE, DEFAULT_HOP_SAMPLES))
        .unwrap();

    let result = loop {
        match listener.poll_available().unwrap() {
            Progress::Waiting => thread::sleep(Duration::from_millis(1)),
            other => break other,
        }
    };

    transmit.join().unwrap().unwrap();
    assert_eq!(result, decoded("DS-L00PBK"));
}

#[test]
fn test_noiseless_peak_channel_round_trip() {
    // Feed each planned tone's frequency straight into the state machine
    let mut rng = StdRng::seed_from_u64(7);
    let alphabet: Vec<char> = chimeshare_core::ALPHABET.chars().collect();

    for _ in 0..200 {
        // Draw codes without adjacent repeats
        let mut payload = String::new();
        let mut prev = None;
        while payload.len() < 6 {
            let c = alphabet[rng.gen_range(0..alphabet.len())];
            if Some(c) != prev {
                payload.push(c);
                prev = Some(c);
            }
        }
        let code = format!("DS-{}", payload);
        let plan = build_plan(&code).unwrap();

        let mut rx = Receiver::default();
        rx.start();
        let mut t = 0u64;
        let mut result = None;
        for event in &plan.events {
            if let ToneEvent::Tone { frequency_hz, .. } = event {
                if let Some(code_out) = rx
                    .feed(Duration::from_millis(t), Peak::new(*frequency_hz, 200))
                    .unwrap()
                {
                    result = Some(code_out);
                }
            }
            t += event.duration_ms() as u64;
        }
        assert_eq!(result.map(|c| c.to_string()), Some(code));
    }
}

#[test]
fn test_gated_peaks_never_touch_buffer() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut rx = Receiver::default();
    rx.start();
    rx.feed(Duration::ZERO, Peak::new(900.0, 200)).unwrap();
    rx.feed(Duration::from_millis(300), Peak::new(1000.0, 200)).unwrap();
    assert_eq!(rx.symbols(), "0");

    for i in 0..5000u64 {
        let freq = rng.gen_range(0.0f32..24000.0);
        let strength = rng.gen_range(0..=NOISE_GATE);
        let result = rx.feed(Duration::from_millis(600 + i * 50), Peak::new(freq, strength));
        assert!(matches!(result, Ok(None)));
    }
    assert_eq!(rx.symbols(), "0");
    assert_eq!(rx.phase(), Phase::Decoding);
}
