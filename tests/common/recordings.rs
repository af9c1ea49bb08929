// Gemeinsame Test-Aufnahmen für die Integrationstests.
//
// Wird per `include!` eingebunden. Benötigte Imports:
//   use tracefilter::builder::{ChunkBuilder, RecordingBuilder};
//   use tracefilter::metadata::{FieldKind, TypeCatalog, TypeDescriptor};
//   use tracefilter::value::{Reference, Value};

const STRING: u64 = 10;
const THREAD: u64 = 20;
const STACK_TRACE: u64 = 30;
const FRAME: u64 = 40;
const SAMPLE: u64 = 100;
const NOISE: u64 = 101;

/// Sample -> StackTrace -> Frame -> String, Sample/Noise -> Thread -> String.
fn demo_catalog() -> TypeCatalog {
    TypeCatalog::new()
        .with(TypeDescriptor::new(STRING, "java.lang.String").with_field("value", FieldKind::String))
        .with(TypeDescriptor::new(THREAD, "demo.Thread").with_field("name", FieldKind::String))
        .with(TypeDescriptor::new(STACK_TRACE, "demo.StackTrace").with_array_field("frames", FieldKind::Reference(FRAME)))
        .with(TypeDescriptor::new(FRAME, "demo.Frame").with_field("method", FieldKind::String))
        .with(
            TypeDescriptor::new(SAMPLE, "demo.Sample")
                .with_field("thread", FieldKind::Reference(THREAD))
                .with_field("stackTrace", FieldKind::Reference(STACK_TRACE)),
        )
        .with(TypeDescriptor::new(NOISE, "demo.Noise").with_field("thread", FieldKind::Reference(THREAD)))
}

fn text(s: &str) -> Vec<Value> {
    vec![Value::Text(s.into())]
}

fn pooled(type_id: u64, key: i64) -> Value {
    Value::Ref(Reference::new(type_id, key))
}

/// Two checkpoints, two samples and two noise events. The stack traces are
/// defined after the first sample that uses them.
fn demo_chunk() -> ChunkBuilder {
    let mut chunk = ChunkBuilder::new(demo_catalog()).with_time(1_000, 500);
    chunk
        .checkpoint(&[
            (STRING, vec![(1, text("main")), (2, text("gc")), (3, text("run")), (4, text("idle"))]),
            (THREAD, vec![(1, vec![pooled(STRING, 1)]), (2, vec![pooled(STRING, 2)])]),
        ])
        .unwrap();
    chunk.event(SAMPLE, &[pooled(THREAD, 1), pooled(STACK_TRACE, 1)]).unwrap();
    chunk.event(NOISE, &[pooled(THREAD, 2)]).unwrap();
    chunk
        .checkpoint(&[
            (
                STACK_TRACE,
                vec![
                    (1, vec![Value::Array(vec![pooled(FRAME, 1)])]),
                    (2, vec![Value::Array(vec![pooled(FRAME, 2)])]),
                ],
            ),
            (FRAME, vec![(1, vec![pooled(STRING, 3)]), (2, vec![pooled(STRING, 4)])]),
        ])
        .unwrap();
    chunk.event(SAMPLE, &[pooled(THREAD, 1), pooled(STACK_TRACE, 1)]).unwrap();
    chunk.event(NOISE, &[pooled(THREAD, 2)]).unwrap();
    chunk
}

fn demo_recording() -> Vec<u8> {
    RecordingBuilder::new().chunk(demo_chunk()).build()
}
