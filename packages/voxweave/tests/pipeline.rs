mod common;

use std::time::Duration;

use futures::StreamExt;
use voxweave::audio::{self, HEADER_LEN, SAMPLE_RATE};
use voxweave::domain::{
    AmbiguousVoice, Language, NarrationRequest, PitchMode, PitchShift, ResidencyPolicy,
    SynthesisRequest, TextFiltering, VoiceError, VoiceId, VoiceIdentity,
};

use common::{
    FakeEngine, SAMPLES_PER_CHAR, STREAM_CHUNK_LEN, STREAM_CHUNKS, Trace, harness, harness_with,
};

fn hero(text: &str) -> SynthesisRequest {
    SynthesisRequest::new(text, VoiceIdentity::single("hero.wav"))
}

fn story(text: &str) -> NarrationRequest {
    NarrationRequest {
        text: text.to_string(),
        text_filtering: TextFiltering::Standard,
        character_voice: VoiceId::new("hero.wav"),
        narrator_enabled: true,
        narrator_voice: VoiceId::new("narrator.wav"),
        ambiguous_voice: AmbiguousVoice::Character,
        language: Language::ENGLISH,
        output_file_name: "story".into(),
        output_file_timestamp: false,
    }
}

fn visible_files(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().unwrap().is_file())
        .map(|e| e.file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn generate_writes_pcm16_artifact() {
    let h = harness().await;
    let artifact = h.service.generate(hero("Hello there"), "hello.wav").await.unwrap();

    assert_eq!(artifact.path, h.output_dir().join("hello.wav"));
    let decoded = audio::read_wav(&artifact.path).unwrap();
    assert_eq!(decoded.sample_rate, SAMPLE_RATE);
    assert_eq!(decoded.spec.bits_per_sample, 16);
    assert_eq!(decoded.samples.len(), "Hello there".len() * SAMPLES_PER_CHAR);
    assert_eq!(
        artifact.size_bytes,
        std::fs::metadata(&artifact.path).unwrap().len()
    );

    let log = h.log.lock();
    assert_eq!(log.conditioned, vec!["hero.wav".to_string()]);
    assert_eq!(log.spoken, vec![("Hello there".to_string(), 200.0)]);
}

#[tokio::test]
async fn generate_applies_pitch_drift() {
    let h = harness().await;
    let request = hero("Octave").with_pitch(PitchShift::new(12, PitchMode::Drift));
    let artifact = h.service.generate(request, "up.wav").await.unwrap();

    let decoded = audio::read_wav(&artifact.path).unwrap();
    let original = "Octave".len() * SAMPLES_PER_CHAR;
    assert_eq!(decoded.samples.len(), original / 2);
}

#[tokio::test]
async fn configured_knobs_apply_unless_request_sets_them() {
    let (engine, log) = FakeEngine::new(false);
    let h = harness_with(engine, log, ResidencyPolicy::Standard, |c| {
        c.synthesis.temperature = 0.3;
        c.synthesis.repetition_penalty = 4.0;
    })
    .await;

    h.service.generate(hero("Plain"), "plain.wav").await.unwrap();
    h.service
        .generate(hero("Warmer").with_temperature(0.9), "warmer.wav")
        .await
        .unwrap();

    assert_eq!(h.log.lock().knobs, vec![(0.3, 4.0), (0.9, 4.0)]);
}

#[tokio::test]
async fn out_of_range_pitch_is_rejected() {
    let h = harness().await;
    let request = hero("Deep").with_pitch(PitchShift::new(-170, PitchMode::Drift));
    let err = h.service.generate(request, "deep.wav").await.unwrap_err();

    assert!(matches!(err, VoiceError::InvalidRequest(_)));
    assert!(h.log.lock().spoken.is_empty());
    assert!(!h.output_dir().join("deep.wav").exists());
}

#[tokio::test]
async fn unknown_voice_never_reaches_engine() {
    let h = harness().await;
    let request = SynthesisRequest::new("Hi", VoiceIdentity::single("ghost.wav"));
    let err = h.service.generate(request, "ghost.wav").await.unwrap_err();

    assert!(matches!(err, VoiceError::VoiceNotFound(_)));
    assert!(h.log.lock().spoken.is_empty());
    assert!(!h.output_dir().join("ghost.wav").exists());
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_synthesis() {
    let h = harness().await;

    let err = h.service.generate(hero("   "), "blank.wav").await.unwrap_err();
    assert!(matches!(err, VoiceError::InvalidRequest(_)));

    let err = h.service.generate(hero("Hi"), "../escape.wav").await.unwrap_err();
    assert!(matches!(err, VoiceError::InvalidRequest(_)));

    let identity = VoiceIdentity::from_parts(vec!["warm".into()], vec![1.0, 2.0]);
    assert!(matches!(identity, Err(VoiceError::ArityMismatch { .. })));

    assert!(h.log.lock().spoken.is_empty());
}

#[tokio::test]
async fn blended_voice_is_mean_of_scaled_embeddings() {
    let h = harness().await;
    let identity =
        VoiceIdentity::from_parts(vec!["warm".into(), "bright".into()], vec![1.0, 1.0]).unwrap();
    let request = SynthesisRequest::new("Blend", identity);
    h.service.generate(request, "blend.wav").await.unwrap();

    let log = h.log.lock();
    assert!(log.conditioned.is_empty(), "library voices need no conditioning");
    assert_eq!(log.spoken, vec![("Blend".to_string(), 3.0)]);
}

#[tokio::test]
async fn engine_failure_leaves_no_artifact() {
    let h = harness().await;
    let err = h
        .service
        .generate(hero("please explode"), "boom.wav")
        .await
        .unwrap_err();

    assert!(matches!(err, VoiceError::SynthesisFailed(_)));
    assert!(!h.output_dir().join("boom.wav").exists());
}

#[tokio::test]
async fn slow_engine_times_out() {
    let (engine, log) = FakeEngine::new(false);
    let engine = engine.slow(Duration::from_millis(2500));
    let h = harness_with(engine, log, ResidencyPolicy::Standard, |c| {
        c.synthesis.timeout_secs = 1;
    })
    .await;

    let err = h.service.generate(hero("Slow"), "slow.wav").await.unwrap_err();
    assert!(matches!(err, VoiceError::SynthesisTimeout { secs: 1 }));
}

#[tokio::test]
async fn retention_keeps_latest_artifacts() {
    let (engine, log) = FakeEngine::new(false);
    let h = harness_with(engine, log, ResidencyPolicy::Standard, |c| {
        c.retention.keep_latest = 2;
    })
    .await;

    for name in ["one.wav", "two.wav", "three.wav"] {
        h.service.generate(hero("Again"), name).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(visible_files(&h.output_dir()), vec!["three.wav", "two.wav"]);
}

#[tokio::test]
async fn narration_voices_each_role() {
    let h = harness().await;
    let text = r#"*The door creaks open.* "Who is there?" she whispered softly."#;
    let artifact = h.service.narrate(story(text)).await.unwrap();

    assert_eq!(artifact.path, h.output_dir().join("story_combined.wav"));
    let spoken = h.log.lock().spoken.clone();
    assert_eq!(
        spoken,
        vec![
            ("The door creaks open.".to_string(), 100.0),
            ("Who is there?".to_string(), 200.0),
            ("she whispered softly.".to_string(), 200.0),
        ]
    );

    let total_chars: usize = spoken.iter().map(|(t, _)| t.chars().count()).sum();
    let decoded = audio::read_wav(&artifact.path).unwrap();
    assert_eq!(decoded.samples.len(), total_chars * SAMPLES_PER_CHAR);

    // one conditioning per role, not per segment
    assert_eq!(h.log.lock().conditioned.len(), 2);
    let staging = h.output_dir().join(".staging");
    assert!(visible_files(&staging).is_empty());
}

#[tokio::test]
async fn ambiguous_text_can_go_to_narrator() {
    let h = harness().await;
    let mut request = story(r#""Run now," she said."#);
    request.ambiguous_voice = AmbiguousVoice::Narrator;
    h.service.narrate(request).await.unwrap();

    let spoken = h.log.lock().spoken.clone();
    assert_eq!(
        spoken,
        vec![
            ("Run now,".to_string(), 200.0),
            ("she said.".to_string(), 100.0),
        ]
    );
}

#[tokio::test]
async fn narration_without_speakable_text_fails() {
    let h = harness().await;
    let err = h.service.narrate(story(r#"*a* "b" c"#)).await.unwrap_err();

    assert!(matches!(err, VoiceError::InvalidRequest(_)));
    assert!(h.log.lock().spoken.is_empty());
}

#[tokio::test]
async fn narration_failure_cleans_up_segments() {
    let h = harness().await;
    let text = r#"*It began quietly.* "Then it would explode.""#;
    let err = h.service.narrate(story(text)).await.unwrap_err();

    assert!(matches!(err, VoiceError::SynthesisFailed(_)));
    assert!(!h.output_dir().join("story_combined.wav").exists());
    assert!(visible_files(&h.output_dir().join(".staging")).is_empty());
}

#[tokio::test]
async fn stitch_failure_keeps_segments() {
    let (engine, log) = FakeEngine::new(false);
    let engine = engine.with_rates(vec![SAMPLE_RATE, 22_050]);
    let h = harness_with(engine, log, ResidencyPolicy::Standard, |_| {}).await;

    let text = r#"*It began quietly.* "Then it ended.""#;
    let err = h.service.narrate(story(text)).await.unwrap_err();

    match err {
        VoiceError::SampleRateMismatch { expected, found, .. } => {
            assert_eq!((expected, found), (SAMPLE_RATE, 22_050));
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(!h.output_dir().join("story_combined.wav").exists());
    let staging = h.output_dir().join(".staging");
    let kept = visible_files(&staging);
    assert_eq!(kept.len(), 2, "{kept:?}");
    assert!(kept.iter().all(|name| name.starts_with("story_")));
    assert!(!staging.join(".staging").exists());
}

#[tokio::test]
async fn disabled_narrator_voices_whole_text() {
    let h = harness().await;
    let mut request = story("*Bold* words!!! here");
    request.narrator_enabled = false;
    let artifact = h.service.narrate(request).await.unwrap();

    assert_eq!(artifact.path, h.output_dir().join("story.wav"));
    let spoken = h.log.lock().spoken.clone();
    assert_eq!(spoken.len(), 1);
    assert_eq!(spoken[0].1, 200.0);
}

#[tokio::test]
async fn stream_yields_header_then_frames() {
    let h = harness().await;
    let mut frames = h.service.stream(hero("Streaming").streaming(true)).await.unwrap();

    let header = frames.next().await.unwrap().unwrap();
    assert_eq!(header.len(), HEADER_LEN);
    assert_eq!(&header[..4], b"RIFF");

    let mut body = 0;
    while let Some(frame) = frames.next().await {
        body += frame.unwrap().len();
    }
    assert_eq!(body, STREAM_CHUNKS * STREAM_CHUNK_LEN * 2);
}

#[tokio::test]
async fn dropped_stream_stops_generation() {
    let (engine, log) = FakeEngine::new(false);
    let engine = engine.slow(Duration::from_millis(100));
    let h = harness_with(engine, log, ResidencyPolicy::Standard, |c| {
        c.stream.buffer_frames = 1;
    })
    .await;

    let mut frames = h.service.stream(hero("Abandon")).await.unwrap();
    frames.next().await.unwrap().unwrap();
    drop(frames);
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(h.log.lock().chunks_pulled < STREAM_CHUNKS);

    // the lease was released, so the engine is usable again
    h.service.generate(hero("Next"), "next.wav").await.unwrap();
}

#[tokio::test]
async fn low_resource_moves_model_per_request() {
    let (engine, log) = FakeEngine::new(true);
    let h = harness_with(engine, log, ResidencyPolicy::LowResource, |_| {}).await;
    assert_eq!(h.service.residency().status().residency, voxweave::domain::Residency::Cpu);

    h.service.generate(hero("Round trip"), "trip.wav").await.unwrap();

    use voxweave::domain::Residency::{Cpu, Gpu};
    assert_eq!(h.log.lock().relocations, vec![Cpu, Gpu, Cpu]);
    assert_eq!(h.service.residency().status().residency, Cpu);
}

#[tokio::test]
async fn concurrent_requests_take_turns_on_the_engine() {
    let (engine, log) = FakeEngine::new(true);
    let engine = engine.slow(Duration::from_millis(200));
    let h = harness_with(engine, log, ResidencyPolicy::LowResource, |_| {}).await;

    let (a, b) = tokio::join!(
        h.service.generate(hero("First caller"), "first.wav"),
        h.service.generate(hero("Second caller"), "second.wav"),
    );
    a.unwrap();
    b.unwrap();

    use voxweave::domain::Residency::{Cpu, Gpu};
    let trace = h.log.lock().trace.clone();
    let first = trace
        .iter()
        .find_map(|t| match t {
            Trace::Enter(text) => Some(text.clone()),
            _ => None,
        })
        .unwrap();
    let second = if first == "First caller" {
        "Second caller".to_string()
    } else {
        "First caller".to_string()
    };
    // startup placement, then each request's full round trip in turn
    assert_eq!(
        trace,
        vec![
            Trace::Moved(Cpu),
            Trace::Moved(Gpu),
            Trace::Enter(first.clone()),
            Trace::Exit(first),
            Trace::Moved(Cpu),
            Trace::Moved(Gpu),
            Trace::Enter(second.clone()),
            Trace::Exit(second),
            Trace::Moved(Cpu),
        ]
    );
}

#[tokio::test]
async fn toggling_low_resource_relocates_once() {
    let (engine, log) = FakeEngine::new(true);
    let h = harness_with(engine, log, ResidencyPolicy::Standard, |_| {}).await;

    use voxweave::PolicyChange;
    use voxweave::domain::Residency::{Cpu, Gpu};
    assert_eq!(
        h.service.set_low_resource(true).await.unwrap(),
        PolicyChange::Applied { residency: Cpu }
    );
    assert_eq!(
        h.service.set_low_resource(true).await.unwrap(),
        PolicyChange::AlreadySet
    );
    assert_eq!(h.log.lock().relocations, vec![Gpu, Cpu]);
}

#[tokio::test]
async fn low_resource_refused_without_gpu() {
    let h = harness().await;
    let err = h.service.set_low_resource(true).await.unwrap_err();
    assert!(matches!(err, VoiceError::ResidencyTransitionUnavailable(_)));
}
