use criterion::{black_box, criterion_group, criterion_main, Criterion};
use naptick_wakeword::model::runtime::{Backend, Interpreter};
use naptick_wakeword::model::schema::header_only_model;
use naptick_wakeword::{
    FeatureExtractor, ModelRuntime, ModelSlot, WakeWordConfig, WakeWordDetector, N_MELS,
};

/// 80ms of a 440 Hz tone at 16kHz
fn tone_frame() -> Vec<i16> {
    (0..1280)
        .map(|i| {
            let t = i as f32 / 16000.0;
            ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 8000.0) as i16
        })
        .collect()
}

fn benchmark_extraction(c: &mut Criterion) {
    let mut extractor = FeatureExtractor::new(16000).unwrap();
    let frame = tone_frame();
    let mut out = [0.0f32; N_MELS];

    c.bench_function("extract_80ms_frame", |b| {
        b.iter(|| extractor.extract(black_box(&frame), &mut out).unwrap())
    });
}

struct ConstantInterpreter;

impl Interpreter for ConstantInterpreter {
    fn input_len(&self) -> usize {
        N_MELS
    }

    fn output_len(&self) -> usize {
        2
    }

    fn invoke(&mut self, _input: &[f32], output: &mut [f32]) -> naptick_wakeword::Result<()> {
        output[0] = 0.9;
        output[1] = 0.1;
        Ok(())
    }
}

struct ConstantBackend;

impl Backend for ConstantBackend {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn build(&self, _model: &[u8]) -> naptick_wakeword::Result<Box<dyn Interpreter>> {
        Ok(Box::new(ConstantInterpreter))
    }
}

fn benchmark_detector_frame(c: &mut Criterion) {
    let runtime = ModelRuntime::create(header_only_model(3), 4096, &ConstantBackend).unwrap();
    let mut detector = WakeWordDetector::new(
        WakeWordConfig::default(),
        ModelSlot::Loaded(runtime),
        |_: &naptick_wakeword::Detection| {},
    )
    .unwrap();
    let frame = tone_frame();

    c.bench_function("detector_80ms_frame", |b| {
        b.iter(|| detector.process_audio(black_box(&frame)).unwrap())
    });
}

criterion_group!(benches, benchmark_extraction, benchmark_detector_frame);
criterion_main!(benches);
